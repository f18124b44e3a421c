//! Provenance log persistence.
//!
//! # Responsibility
//! - Define the `create(record, database)` sink contract used by dual-write.
//! - Append `TimelineStateChange` rows and read them back in append order.
//!
//! # Invariants
//! - Rows are never updated or deleted; the schema rejects both.
//! - Each append opens and releases its own session.

use crate::db::{DatabaseRegistry, DbError};
use crate::model::state_change::{ChangeType, StoredStateChange, TimelineStateChange};
use crate::repo::timeline_repo::{RepoError, RepoResult};
use crate::repo::{encode_tags, parse_tags, parse_uuid};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Failure appending one provenance record.
#[derive(Debug)]
pub enum SinkError {
    /// Target database could not be opened.
    Db(DbError),
    /// Insert failed inside the provenance store.
    Repo(RepoError),
    /// Sink refused the record without touching storage.
    Rejected(String),
}

impl Display for SinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Rejected(message) => write!(f, "state change rejected: {message}"),
        }
    }
}

impl Error for SinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Rejected(_) => None,
        }
    }
}

impl From<DbError> for SinkError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for SinkError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Append-only provenance store.
pub trait StateChangeSink {
    /// Appends one record to `database` and returns its storage id.
    fn create(&self, record: &TimelineStateChange, database: &str) -> Result<Uuid, SinkError>;
}

impl<S: StateChangeSink + ?Sized> StateChangeSink for &S {
    fn create(&self, record: &TimelineStateChange, database: &str) -> Result<Uuid, SinkError> {
        (**self).create(record, database)
    }
}

/// Sink writing into the `timeline_state_changes` table of each named database.
#[derive(Debug, Clone)]
pub struct SqliteStateChangeSink {
    registry: DatabaseRegistry,
}

impl SqliteStateChangeSink {
    pub fn new(registry: DatabaseRegistry) -> Self {
        Self { registry }
    }
}

impl StateChangeSink for SqliteStateChangeSink {
    fn create(&self, record: &TimelineStateChange, database: &str) -> Result<Uuid, SinkError> {
        let conn = self.registry.open(database)?;
        Ok(insert_state_change(&conn, record)?)
    }
}

/// Appends one record on an open connection.
pub fn insert_state_change(conn: &Connection, record: &TimelineStateChange) -> RepoResult<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO timeline_state_changes (
            id,
            axis_id,
            era_id,
            segment_id,
            marker_id,
            event_id,
            subject_type,
            subject_id,
            field_path,
            change_type,
            new_value,
            effective_tick,
            notes,
            tags,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15);",
        params![
            id.to_string(),
            record.axis_id.as_str(),
            record.era_id.as_deref(),
            record.segment_id.as_deref(),
            record.marker_id.as_deref(),
            record.event_id.as_deref(),
            record.subject_type.as_str(),
            record.subject_id.as_str(),
            record.field_path.as_str(),
            record.change_type.as_str(),
            record.new_value.as_str(),
            record.effective_tick,
            record.notes.as_deref(),
            encode_tags(&record.tags),
            record.created_at,
        ],
    )?;
    Ok(id)
}

/// Lists provenance rows for one subject in append order.
pub fn list_state_changes(
    conn: &Connection,
    subject_type: &str,
    subject_id: &str,
) -> RepoResult<Vec<StoredStateChange>> {
    let mut stmt = conn.prepare(
        "SELECT
            seq,
            id,
            axis_id,
            era_id,
            segment_id,
            marker_id,
            event_id,
            subject_type,
            subject_id,
            field_path,
            change_type,
            new_value,
            effective_tick,
            notes,
            tags,
            created_at
         FROM timeline_state_changes
         WHERE subject_type = ?1
           AND subject_id = ?2
         ORDER BY seq ASC;",
    )?;
    let mut rows = stmt.query(params![subject_type, subject_id])?;
    let mut changes = Vec::new();
    while let Some(row) = rows.next()? {
        changes.push(parse_state_change_row(row)?);
    }
    Ok(changes)
}

fn parse_state_change_row(row: &Row<'_>) -> RepoResult<StoredStateChange> {
    let id: String = row.get("id")?;
    let change_type_text: String = row.get("change_type")?;
    let change_type = ChangeType::parse(&change_type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid change type `{change_type_text}` in timeline_state_changes.change_type"
        ))
    })?;
    let tags: String = row.get("tags")?;

    Ok(StoredStateChange {
        id: parse_uuid(&id, "timeline_state_changes.id")?,
        seq: row.get("seq")?,
        change: TimelineStateChange {
            axis_id: row.get("axis_id")?,
            era_id: row.get("era_id")?,
            segment_id: row.get("segment_id")?,
            marker_id: row.get("marker_id")?,
            event_id: row.get("event_id")?,
            subject_type: row.get("subject_type")?,
            subject_id: row.get("subject_id")?,
            field_path: row.get("field_path")?,
            change_type,
            new_value: row.get("new_value")?,
            effective_tick: row.get("effective_tick")?,
            notes: row.get("notes")?,
            tags: parse_tags(&tags, "timeline_state_changes.tags")?,
            created_at: row.get("created_at")?,
        },
    })
}
