//! Append-only field-level provenance record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of field mutation recorded in the provenance log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Field was assigned a new value.
    Set,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "set" => Some(Self::Set),
            _ => None,
        }
    }
}

/// One provenance fact: `field_path` of a subject changed at `effective_tick`.
///
/// The record schema matches the external sink contract exactly; storage
/// identity (`id`, sequence) is assigned by the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStateChange {
    pub axis_id: String,
    pub era_id: Option<String>,
    pub segment_id: Option<String>,
    pub marker_id: Option<String>,
    pub event_id: Option<String>,
    pub subject_type: String,
    pub subject_id: String,
    /// Dot-separated leaf address, e.g. `stats.strength`.
    pub field_path: String,
    pub change_type: ChangeType,
    /// Serialized JSON text of the new leaf value.
    pub new_value: String,
    pub effective_tick: i64,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Persisted provenance row as read back from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredStateChange {
    pub id: Uuid,
    /// Monotonic append sequence within one database.
    pub seq: i64,
    #[serde(flatten)]
    pub change: TimelineStateChange,
}
