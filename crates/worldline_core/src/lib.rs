//! Core timeline schema evolution and provenance for Worldline.
//! This crate owns the axis/era/segment/marker invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, WorldlineConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::state_change::{ChangeType, StoredStateChange, TimelineStateChange};
pub use model::timeline::{
    TimelineAxis, TimelineEra, TimelineMarker, TimelineNodeId, TimelineSegment,
};
pub use model::write_context::{TimelineWriteContext, WriteMode};
pub use repo::state_change_repo::{
    insert_state_change, list_state_changes, SinkError, SqliteStateChangeSink, StateChangeSink,
};
pub use repo::timeline_repo::{
    RepoError, RepoResult, SqliteTimelineRepository, TimelineRepository,
};
pub use service::dual_write::{
    DualWriteOutcome, DualWriteProjector, EntityWrite, FieldWriteFailure, SkipReason,
};
pub use service::field_paths::{flatten_fields, select_tracked_fields, FieldLeaf};
pub use service::legacy_migration::{
    inspect_legacy, migrate_database, migrate_legacy_timelines, LegacyInventory, MigrationError,
    MigrationOptions, MigrationReport, MigrationResult,
};

/// Minimal health-check API for linkage probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
