//! Dual-write change projector.
//!
//! # Responsibility
//! - Turn one committed entity write into field-level provenance records.
//! - Scope every record to the write's timeline coordinate.
//!
//! # Invariants
//! - `project` never returns an error and never panics on sink failures.
//! - Each field append is isolated: one failure does not stop the others.
//! - The written entity and payload are only read, never modified.
//! - Must run after the primary write commits, outside its transaction.
//! - Logs carry paths and counts only, never field values.

use crate::model::state_change::{ChangeType, TimelineStateChange};
use crate::model::write_context::{TimelineWriteContext, WriteMode};
use crate::repo::now_epoch_ms;
use crate::repo::state_change_repo::StateChangeSink;
use crate::service::field_paths::select_tracked_fields;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Why a projection produced no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    #[serde(rename = "dual-write-disabled")]
    Disabled,
    #[serde(rename = "missing-db-name")]
    MissingDbName,
    #[serde(rename = "missing-timeline-context-headers")]
    MissingTimelineContext,
    #[serde(rename = "no-trackable-fields")]
    NoTrackableFields,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "dual-write-disabled",
            Self::MissingDbName => "missing-db-name",
            Self::MissingTimelineContext => "missing-timeline-context-headers",
            Self::NoTrackableFields => "no-trackable-fields",
        }
    }
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field whose record could not be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldWriteFailure {
    pub field_path: String,
    pub error: String,
}

/// Aggregate result of one projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DualWriteOutcome {
    pub written: usize,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FieldWriteFailure>,
}

impl DualWriteOutcome {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            written: 0,
            skipped: true,
            reason: Some(reason),
            failures: Vec::new(),
        }
    }
}

/// Notification an entity module sends after its own write committed.
#[derive(Debug, Clone, Copy)]
pub struct EntityWrite<'a> {
    /// Target database; `None` or blank skips the projection.
    pub database: Option<&'a str>,
    pub subject_type: &'a str,
    pub subject_id: &'a str,
    /// Entity as persisted by the primary write.
    pub entity: &'a Value,
    pub mode: WriteMode,
    /// Original request payload; consulted for updates only.
    pub payload: Option<&'a Value>,
    /// Free-form label used in logs only.
    pub action: &'a str,
}

/// Best-effort projector from entity writes to the provenance log.
pub struct DualWriteProjector<S: StateChangeSink> {
    sink: S,
    enabled: bool,
}

impl<S: StateChangeSink> DualWriteProjector<S> {
    pub fn new(sink: S, enabled: bool) -> Self {
        Self { sink, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Projects one committed write into per-field provenance records.
    ///
    /// `context` is the write's timeline coordinate; `None` means the caller
    /// supplied no usable coordinate.
    pub fn project(
        &self,
        context: Option<&TimelineWriteContext>,
        write: &EntityWrite<'_>,
    ) -> DualWriteOutcome {
        if !self.enabled {
            return log_skip(write, SkipReason::Disabled);
        }
        let Some(database) = write
            .database
            .map(str::trim)
            .filter(|name| !name.is_empty())
        else {
            return log_skip(write, SkipReason::MissingDbName);
        };
        let Some(context) = context else {
            return log_skip(write, SkipReason::MissingTimelineContext);
        };

        let fields = select_tracked_fields(write.entity, write.mode, write.payload);
        if fields.is_empty() {
            return log_skip(write, SkipReason::NoTrackableFields);
        }

        let created_at = now_epoch_ms();
        let mut written = 0;
        let mut failures = Vec::new();
        for field in fields {
            let record = TimelineStateChange {
                axis_id: context.axis_id.clone(),
                era_id: context.era_id.clone(),
                segment_id: context.segment_id.clone(),
                marker_id: context.marker_id.clone(),
                event_id: context.event_id.clone(),
                subject_type: write.subject_type.to_string(),
                subject_id: write.subject_id.to_string(),
                field_path: field.path,
                change_type: ChangeType::Set,
                new_value: serialize_field_value(field.value),
                effective_tick: context.tick,
                notes: None,
                tags: Vec::new(),
                created_at,
            };

            match self.sink.create(&record, database) {
                Ok(_) => written += 1,
                Err(err) => {
                    warn!(
                        "event=dual_write_field module=provenance status=error action={} subject_type={} field_path={} error={}",
                        write.action, write.subject_type, record.field_path, err
                    );
                    failures.push(FieldWriteFailure {
                        field_path: record.field_path,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            "event=dual_write module=provenance status=ok action={} mode={} subject_type={} written={} failed={} tick={}",
            write.action,
            write.mode.as_str(),
            write.subject_type,
            written,
            failures.len(),
            context.tick
        );

        DualWriteOutcome {
            written,
            skipped: false,
            reason: None,
            failures,
        }
    }

    /// Parses the coordinate from header pairs, then projects.
    pub fn project_with_headers<'h, I>(
        &self,
        headers: I,
        write: &EntityWrite<'_>,
    ) -> DualWriteOutcome
    where
        I: IntoIterator<Item = (&'h str, &'h str)>,
    {
        let context = TimelineWriteContext::from_headers(headers);
        self.project(context.as_ref(), write)
    }
}

/// JSON text of the leaf, or its display form when serialization fails.
fn serialize_field_value(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

fn log_skip(write: &EntityWrite<'_>, reason: SkipReason) -> DualWriteOutcome {
    debug!(
        "event=dual_write module=provenance status=skipped action={} subject_type={} reason={}",
        write.action, write.subject_type, reason
    );
    DualWriteOutcome::skipped(reason)
}
