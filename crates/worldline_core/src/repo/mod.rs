//! Repository layer over the world graph tables.
//!
//! # Responsibility
//! - Keep SQL and row decoding inside the persistence boundary.
//! - Expose read models for the timeline hierarchy and the provenance log.
//!
//! # Invariants
//! - Read paths reject invalid persisted state instead of masking it.
//! - The provenance log has an insert path and read paths only.

pub mod state_change_repo;
pub mod timeline_repo;

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use self::timeline_repo::{RepoError, RepoResult};

/// Current wall clock as unix epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_tags(value: &str, column: &'static str) -> RepoResult<Vec<String>> {
    serde_json::from_str(value)
        .map_err(|err| RepoError::InvalidData(format!("invalid tag list in {column}: {err}")))
}

pub(crate) fn encode_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}
