//! Timeline hierarchy read repository.
//!
//! # Responsibility
//! - Provide read access to axes, eras, segments and markers.
//! - Resolve nodes by their natural/provenance keys.
//!
//! # Invariants
//! - Listing order is deterministic: eras and segments by `sort_order ASC,
//!   id ASC`; markers by `tick ASC, id ASC`.
//! - Repositories are only built over fully migrated connections.

use crate::db::migrations::{latest_version, schema_version};
use crate::db::DbError;
use crate::model::timeline::{
    TimelineAxis, TimelineEra, TimelineMarker, TimelineNodeId, TimelineSegment,
};
use crate::repo::{parse_tags, parse_uuid};
use rusqlite::{Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for graph reads and provenance appends.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Connection schema is not at the version this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "timeline repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid timeline data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::UninitializedConnection { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Read interface over the timeline hierarchy.
pub trait TimelineRepository {
    /// Loads one axis by its unique natural code.
    fn get_axis_by_code(&self, code: &str) -> RepoResult<Option<TimelineAxis>>;
    /// Lists eras owned by one axis.
    fn list_eras(&self, axis_id: TimelineNodeId) -> RepoResult<Vec<TimelineEra>>;
    /// Lists segments inside one era.
    fn list_segments(&self, era_id: TimelineNodeId) -> RepoResult<Vec<TimelineSegment>>;
    /// Loads the segment migrated from one legacy timeline.
    fn get_segment_by_legacy_id(
        &self,
        legacy_timeline_id: &str,
    ) -> RepoResult<Option<TimelineSegment>>;
    /// Lists markers owned by one segment through the ownership edge.
    fn list_markers(&self, segment_id: TimelineNodeId) -> RepoResult<Vec<TimelineMarker>>;
    /// Loads the marker migrated from one legacy event link.
    fn get_marker_by_legacy_event_id(
        &self,
        legacy_event_id: &str,
    ) -> RepoResult<Option<TimelineMarker>>;
    /// Lists every segment holding an ownership edge to `marker_id`.
    fn list_marker_owners(&self, marker_id: TimelineNodeId) -> RepoResult<Vec<TimelineNodeId>>;
}

/// SQLite-backed timeline repository.
pub struct SqliteTimelineRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTimelineRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

const SEGMENT_COLUMNS: &str = "id, axis_id, era_id, name, code, summary, description, sort_order,
    start_tick, end_tick, notes, tags, legacy_timeline_id, created_at, updated_at";

const MARKER_COLUMNS: &str = "m.id AS id, m.axis_id AS axis_id, m.era_id AS era_id,
    m.segment_id AS segment_id, m.label AS label, m.tick AS tick, m.marker_type AS marker_type,
    m.description AS description, m.event_ref_id AS event_ref_id,
    m.legacy_event_id AS legacy_event_id, m.created_at AS created_at, m.updated_at AS updated_at";

impl TimelineRepository for SqliteTimelineRepository<'_> {
    fn get_axis_by_code(&self, code: &str) -> RepoResult<Option<TimelineAxis>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, code, name, axis_type, description, status, created_at, updated_at
             FROM timeline_axes
             WHERE code = ?1;",
        )?;
        let mut rows = stmt.query([code])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_axis_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_eras(&self, axis_id: TimelineNodeId) -> RepoResult<Vec<TimelineEra>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, axis_id, code, name, summary, sort_order, status, created_at, updated_at
             FROM timeline_eras
             WHERE axis_id = ?1
             ORDER BY sort_order ASC, id ASC;",
        )?;
        let mut rows = stmt.query([axis_id.to_string()])?;
        let mut eras = Vec::new();
        while let Some(row) = rows.next()? {
            eras.push(parse_era_row(row)?);
        }
        Ok(eras)
    }

    fn list_segments(&self, era_id: TimelineNodeId) -> RepoResult<Vec<TimelineSegment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SEGMENT_COLUMNS}
             FROM timeline_segments
             WHERE era_id = ?1
             ORDER BY sort_order ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([era_id.to_string()])?;
        let mut segments = Vec::new();
        while let Some(row) = rows.next()? {
            segments.push(parse_segment_row(row)?);
        }
        Ok(segments)
    }

    fn get_segment_by_legacy_id(
        &self,
        legacy_timeline_id: &str,
    ) -> RepoResult<Option<TimelineSegment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SEGMENT_COLUMNS}
             FROM timeline_segments
             WHERE legacy_timeline_id = ?1;"
        ))?;
        let mut rows = stmt.query([legacy_timeline_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_segment_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_markers(&self, segment_id: TimelineNodeId) -> RepoResult<Vec<TimelineMarker>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MARKER_COLUMNS}
             FROM timeline_markers m
             INNER JOIN timeline_segment_markers sm ON sm.marker_id = m.id
             WHERE sm.segment_id = ?1
             ORDER BY m.tick ASC, m.id ASC;"
        ))?;
        let mut rows = stmt.query([segment_id.to_string()])?;
        let mut markers = Vec::new();
        while let Some(row) = rows.next()? {
            markers.push(parse_marker_row(row)?);
        }
        Ok(markers)
    }

    fn get_marker_by_legacy_event_id(
        &self,
        legacy_event_id: &str,
    ) -> RepoResult<Option<TimelineMarker>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MARKER_COLUMNS}
             FROM timeline_markers m
             WHERE m.legacy_event_id = ?1;"
        ))?;
        let mut rows = stmt.query([legacy_event_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_marker_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_marker_owners(&self, marker_id: TimelineNodeId) -> RepoResult<Vec<TimelineNodeId>> {
        let mut stmt = self.conn.prepare(
            "SELECT segment_id
             FROM timeline_segment_markers
             WHERE marker_id = ?1
             ORDER BY segment_id ASC;",
        )?;
        let mut rows = stmt.query([marker_id.to_string()])?;
        let mut owners = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            owners.push(parse_uuid(&value, "timeline_segment_markers.segment_id")?);
        }
        Ok(owners)
    }
}

fn parse_axis_row(row: &Row<'_>) -> RepoResult<TimelineAxis> {
    let id: String = row.get("id")?;
    Ok(TimelineAxis {
        id: parse_uuid(&id, "timeline_axes.id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        axis_type: row.get("axis_type")?,
        description: row.get("description")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_era_row(row: &Row<'_>) -> RepoResult<TimelineEra> {
    let id: String = row.get("id")?;
    let axis_id: String = row.get("axis_id")?;
    Ok(TimelineEra {
        id: parse_uuid(&id, "timeline_eras.id")?,
        axis_id: parse_uuid(&axis_id, "timeline_eras.axis_id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        summary: row.get("summary")?,
        order: row.get("sort_order")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_segment_row(row: &Row<'_>) -> RepoResult<TimelineSegment> {
    let id: String = row.get("id")?;
    let axis_id: String = row.get("axis_id")?;
    let era_id: String = row.get("era_id")?;
    let tags: String = row.get("tags")?;
    Ok(TimelineSegment {
        id: parse_uuid(&id, "timeline_segments.id")?,
        axis_id: parse_uuid(&axis_id, "timeline_segments.axis_id")?,
        era_id: parse_uuid(&era_id, "timeline_segments.era_id")?,
        name: row.get("name")?,
        code: row.get("code")?,
        summary: row.get("summary")?,
        description: row.get("description")?,
        order: row.get("sort_order")?,
        start_tick: row.get("start_tick")?,
        end_tick: row.get("end_tick")?,
        notes: row.get("notes")?,
        tags: parse_tags(&tags, "timeline_segments.tags")?,
        legacy_timeline_id: row.get("legacy_timeline_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_marker_row(row: &Row<'_>) -> RepoResult<TimelineMarker> {
    let id: String = row.get("id")?;
    let axis_id: String = row.get("axis_id")?;
    let era_id: String = row.get("era_id")?;
    let segment_id: String = row.get("segment_id")?;
    Ok(TimelineMarker {
        id: parse_uuid(&id, "timeline_markers.id")?,
        axis_id: parse_uuid(&axis_id, "timeline_markers.axis_id")?,
        era_id: parse_uuid(&era_id, "timeline_markers.era_id")?,
        segment_id: parse_uuid(&segment_id, "timeline_markers.segment_id")?,
        label: row.get("label")?,
        tick: row.get("tick")?,
        marker_type: row.get("marker_type")?,
        description: row.get("description")?,
        event_ref_id: row.get("event_ref_id")?,
        legacy_event_id: row.get("legacy_event_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn ensure_schema_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
