use serde_json::{json, Value};
use std::cell::RefCell;
use uuid::Uuid;
use worldline_core::db::DatabaseRegistry;
use worldline_core::{
    list_state_changes, ChangeType, DualWriteProjector, EntityWrite, SinkError, SkipReason,
    SqliteStateChangeSink, StateChangeSink, TimelineStateChange, TimelineWriteContext, WriteMode,
};

/// In-memory sink that can be told to reject one field path.
#[derive(Default)]
struct RecordingSink {
    records: RefCell<Vec<(String, TimelineStateChange)>>,
    reject_field: Option<&'static str>,
}

impl RecordingSink {
    fn rejecting(field_path: &'static str) -> Self {
        Self {
            reject_field: Some(field_path),
            ..Self::default()
        }
    }

    fn field_values(&self) -> Vec<(String, String)> {
        self.records
            .borrow()
            .iter()
            .map(|(_, record)| (record.field_path.clone(), record.new_value.clone()))
            .collect()
    }
}

impl StateChangeSink for RecordingSink {
    fn create(&self, record: &TimelineStateChange, database: &str) -> Result<Uuid, SinkError> {
        if self.reject_field == Some(record.field_path.as_str()) {
            return Err(SinkError::Rejected("store unavailable".to_string()));
        }
        self.records
            .borrow_mut()
            .push((database.to_string(), record.clone()));
        Ok(Uuid::new_v4())
    }
}

fn character() -> Value {
    json!({
        "id": "c-1",
        "name": "A",
        "nested": { "x": 1 },
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": "2024-01-01T00:00:00Z"
    })
}

fn write<'a>(entity: &'a Value, mode: WriteMode, payload: Option<&'a Value>) -> EntityWrite<'a> {
    EntityWrite {
        database: Some("saga"),
        subject_type: "character",
        subject_id: "c-1",
        entity,
        mode,
        payload,
        action: "character.save",
    }
}

fn context() -> TimelineWriteContext {
    TimelineWriteContext {
        era_id: Some("era-1".to_string()),
        segment_id: Some("seg-1".to_string()),
        ..TimelineWriteContext::new("axis-1", 5)
    }
}

#[test]
fn create_records_every_tracked_leaf() {
    let sink = RecordingSink::default();
    let projector = DualWriteProjector::new(&sink, true);
    let entity = character();

    let outcome = projector.project(Some(&context()), &write(&entity, WriteMode::Create, None));
    assert_eq!(outcome.written, 2);
    assert!(!outcome.skipped);
    assert!(outcome.failures.is_empty());

    assert_eq!(
        sink.field_values(),
        vec![
            ("name".to_string(), "\"A\"".to_string()),
            ("nested.x".to_string(), "1".to_string()),
        ]
    );

    let records = sink.records.borrow();
    let (database, record) = &records[0];
    assert_eq!(database, "saga");
    assert_eq!(record.axis_id, "axis-1");
    assert_eq!(record.era_id.as_deref(), Some("era-1"));
    assert_eq!(record.segment_id.as_deref(), Some("seg-1"));
    assert_eq!(record.marker_id, None);
    assert_eq!(record.event_id, None);
    assert_eq!(record.subject_type, "character");
    assert_eq!(record.subject_id, "c-1");
    assert_eq!(record.change_type, ChangeType::Set);
    assert_eq!(record.effective_tick, 5);
    assert_eq!(record.notes, None);
    assert!(record.tags.is_empty());
}

#[test]
fn update_records_only_requested_paths() {
    let sink = RecordingSink::default();
    let projector = DualWriteProjector::new(&sink, true);
    let entity = character();
    let payload = json!({ "nested": { "x": 1 } });

    let outcome = projector.project(
        Some(&context()),
        &write(&entity, WriteMode::Update, Some(&payload)),
    );
    assert_eq!(outcome.written, 1);
    assert_eq!(
        sink.field_values(),
        vec![("nested.x".to_string(), "1".to_string())]
    );
}

#[test]
fn update_without_payload_has_nothing_to_track() {
    let sink = RecordingSink::default();
    let projector = DualWriteProjector::new(&sink, true);
    let entity = character();

    let outcome = projector.project(Some(&context()), &write(&entity, WriteMode::Update, None));
    assert!(outcome.skipped);
    assert_eq!(outcome.reason, Some(SkipReason::NoTrackableFields));
    assert!(sink.records.borrow().is_empty());
}

#[test]
fn missing_or_invalid_tick_header_skips_projection() {
    let sink = RecordingSink::default();
    let projector = DualWriteProjector::new(&sink, true);
    let entity = character();
    let entity_write = write(&entity, WriteMode::Create, None);

    let missing = projector.project_with_headers([("x-timeline-axis-id", "axis-1")], &entity_write);
    assert!(missing.skipped);
    assert_eq!(missing.reason, Some(SkipReason::MissingTimelineContext));

    let non_numeric = projector.project_with_headers(
        [("x-timeline-axis-id", "axis-1"), ("x-timeline-tick", "soon")],
        &entity_write,
    );
    assert_eq!(non_numeric.reason, Some(SkipReason::MissingTimelineContext));
    assert_eq!(non_numeric.written, 0);
    assert!(sink.records.borrow().is_empty());
}

#[test]
fn header_context_scopes_records() {
    let sink = RecordingSink::default();
    let projector = DualWriteProjector::new(&sink, true);
    let entity = json!({ "title": "Oath" });

    let outcome = projector.project_with_headers(
        [
            ("X-Timeline-Axis-Id", "axis-9"),
            ("X-Timeline-Tick", " -3 "),
            ("X-Timeline-Marker-Id", "marker-2"),
        ],
        &write(&entity, WriteMode::Create, None),
    );
    assert_eq!(outcome.written, 1);

    let records = sink.records.borrow();
    let (_, record) = &records[0];
    assert_eq!(record.axis_id, "axis-9");
    assert_eq!(record.effective_tick, -3);
    assert_eq!(record.marker_id.as_deref(), Some("marker-2"));
    assert_eq!(record.era_id, None);
}

#[test]
fn disabled_projector_never_touches_the_sink() {
    let sink = RecordingSink::default();
    let projector = DualWriteProjector::new(&sink, false);
    let entity = character();

    let outcome = projector.project(Some(&context()), &write(&entity, WriteMode::Create, None));
    assert!(!projector.is_enabled());
    assert_eq!(outcome.reason, Some(SkipReason::Disabled));
    assert!(sink.records.borrow().is_empty());
}

#[test]
fn blank_database_name_skips_projection() {
    let sink = RecordingSink::default();
    let projector = DualWriteProjector::new(&sink, true);
    let entity = character();

    for database in [None, Some("   ")] {
        let entity_write = EntityWrite {
            database,
            ..write(&entity, WriteMode::Create, None)
        };
        let outcome = projector.project(Some(&context()), &entity_write);
        assert_eq!(outcome.reason, Some(SkipReason::MissingDbName));
    }
    assert!(sink.records.borrow().is_empty());
}

#[test]
fn entity_with_only_bookkeeping_fields_is_skipped() {
    let sink = RecordingSink::default();
    let projector = DualWriteProjector::new(&sink, true);
    let entity = json!({ "id": "c-1", "createdAt": 1, "updatedAt": 2 });

    let outcome = projector.project(Some(&context()), &write(&entity, WriteMode::Create, None));
    assert_eq!(outcome.reason, Some(SkipReason::NoTrackableFields));
}

#[test]
fn one_failing_field_does_not_stop_the_others() {
    let sink = RecordingSink::rejecting("name");
    let projector = DualWriteProjector::new(&sink, true);
    let entity = character();

    let outcome = projector.project(Some(&context()), &write(&entity, WriteMode::Create, None));
    assert!(!outcome.skipped);
    assert_eq!(outcome.written, 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].field_path, "name");
    assert!(outcome.failures[0].error.contains("store unavailable"));
    assert_eq!(
        sink.field_values(),
        vec![("nested.x".to_string(), "1".to_string())]
    );
}

#[test]
fn projection_leaves_entity_and_payload_untouched() {
    let sink = RecordingSink::default();
    let projector = DualWriteProjector::new(&sink, true);
    let entity = character();
    let payload = json!({ "name": "A" });

    projector.project(
        Some(&context()),
        &write(&entity, WriteMode::Update, Some(&payload)),
    );
    assert_eq!(entity, character());
    assert_eq!(payload, json!({ "name": "A" }));
}

#[test]
fn sqlite_sink_appends_to_the_named_database() {
    let dir = tempfile::tempdir().unwrap();
    let registry = DatabaseRegistry::new(dir.path());
    let projector = DualWriteProjector::new(SqliteStateChangeSink::new(registry.clone()), true);
    let entity = character();

    let first = projector.project(Some(&context()), &write(&entity, WriteMode::Create, None));
    assert_eq!(first.written, 2);

    let renamed = json!({ "id": "c-1", "name": "B", "nested": { "x": 1 } });
    let payload = json!({ "name": "B" });
    let later = TimelineWriteContext::new("axis-1", 9);
    let second = projector.project(
        Some(&later),
        &write(&renamed, WriteMode::Update, Some(&payload)),
    );
    assert_eq!(second.written, 1);

    let conn = registry.open("saga").unwrap();
    let changes = list_state_changes(&conn, "character", "c-1").unwrap();
    let summary = changes
        .iter()
        .map(|stored| {
            (
                stored.change.field_path.as_str(),
                stored.change.new_value.as_str(),
                stored.change.effective_tick,
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![("name", "\"A\"", 5), ("nested.x", "1", 5), ("name", "\"B\"", 9)]
    );
    assert!(changes.windows(2).all(|pair| pair[0].seq < pair[1].seq));
    assert!(list_state_changes(&conn, "character", "c-2")
        .unwrap()
        .is_empty());
}

#[test]
fn sqlite_sink_reports_invalid_database_names_per_field() {
    let dir = tempfile::tempdir().unwrap();
    let projector = DualWriteProjector::new(
        SqliteStateChangeSink::new(DatabaseRegistry::new(dir.path())),
        true,
    );
    let entity = character();
    let entity_write = EntityWrite {
        database: Some("../outside"),
        ..write(&entity, WriteMode::Create, None)
    };

    let outcome = projector.project(Some(&context()), &entity_write);
    assert_eq!(outcome.written, 0);
    assert!(!outcome.skipped);
    assert_eq!(outcome.failures.len(), 2);
}
