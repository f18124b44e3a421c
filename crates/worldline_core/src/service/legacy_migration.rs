//! Legacy timeline to hierarchy data migration.
//!
//! # Responsibility
//! - Rewrite flat legacy timelines into segments under one legacy axis/era.
//! - Rewrite legacy occurs-on edges into markers owned by those segments.
//! - Remap `world_rules.timeline_ids` from legacy ids to segment ids.
//! - Remove legacy nodes and edges once every event link is resolved.
//!
//! # Invariants
//! - The whole run is one immediate transaction: all or nothing.
//! - Every write is keyed by a natural key (axis/era code, legacy timeline
//!   id, legacy event id), so re-running updates in place.
//! - Segment order comes from `created_at ASC, name ASC, id ASC`; the legacy
//!   previous/next chain is never walked.
//! - A marker keeps exactly one ownership edge.
//! - No locking across processes: run at most one migration per database.

use crate::db::{DatabaseRegistry, DbError};
use crate::repo::now_epoch_ms;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub const LEGACY_AXIS_CODE: &str = "legacy-timeline-axis";
pub const LEGACY_ERA_CODE: &str = "legacy-timeline-era";
pub const LEGACY_MARKER_TYPE: &str = "legacy_event";

const LEGACY_AXIS_NAME: &str = "Legacy Timeline";
const LEGACY_AXIS_TYPE: &str = "legacy";
const LEGACY_AXIS_DESCRIPTION: &str = "Landing axis for timelines migrated from the flat model.";
const LEGACY_ERA_NAME: &str = "Legacy Era";
const LEGACY_ERA_SUMMARY: &str = "Holds one segment per migrated legacy timeline.";
const ACTIVE_STATUS: &str = "active";

const MIGRATED_SEGMENTS_SQL: &str =
    "SELECT COUNT(*) FROM timeline_segments WHERE legacy_timeline_id IS NOT NULL;";
const MIGRATED_MARKERS_SQL: &str =
    "SELECT COUNT(*) FROM timeline_markers WHERE legacy_event_id IS NOT NULL;";

pub type MigrationResult<T> = Result<T, MigrationError>;

/// Fatal migration failure. The transaction has been rolled back and the
/// run can be retried as-is.
#[derive(Debug)]
pub enum MigrationError {
    Db(DbError),
    /// Legacy data could not be interpreted.
    InvalidData(String),
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid legacy data: {message}"),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for MigrationError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for MigrationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Run options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Delete legacy timelines and occurs-on edges when nothing is unresolved.
    pub delete_legacy: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            delete_legacy: true,
        }
    }
}

/// Counts describing one migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub axis_id: Uuid,
    pub era_id: Uuid,
    pub timelines_found: u64,
    pub segments_created: u64,
    pub segments_total: u64,
    pub legacy_event_links_found: u64,
    pub markers_created: u64,
    pub markers_total: u64,
    pub world_rules_updated: u64,
    pub unresolved_legacy_event_links: u64,
    pub deleted_occurs_on_relations: u64,
    pub deleted_timelines: u64,
    pub deleted_legacy_timeline_nodes: bool,
}

/// Read-only snapshot of legacy data still awaiting migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyInventory {
    pub legacy_timelines: u64,
    pub legacy_event_links: u64,
    pub migrated_segments: u64,
    pub migrated_markers: u64,
    pub unresolved_legacy_event_links: u64,
    /// Timelines whose previous/next link names a missing timeline.
    pub broken_chain_links: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Baseline {
    timelines: u64,
    event_links: u64,
    segments: u64,
    markers: u64,
}

#[derive(Debug)]
struct LegacyTimelineRow {
    id: String,
    name: String,
    code: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    notes: Option<String>,
    tags: String,
    duration_years: Option<i64>,
}

#[derive(Debug)]
struct OccursOnRow {
    event_id: String,
    timeline_id: String,
    year: Option<i64>,
    event_name: Option<String>,
}

/// Opens a session on `database`, migrates it and releases the session.
pub fn migrate_database(
    registry: &DatabaseRegistry,
    database: &str,
    options: &MigrationOptions,
) -> MigrationResult<MigrationReport> {
    let mut conn = registry.open(database)?;
    migrate_legacy_timelines(&mut conn, options)
}

/// Migrates legacy timelines on an open connection in one transaction.
///
/// # Errors
/// - Any storage or decoding failure aborts the run with no changes kept.
pub fn migrate_legacy_timelines(
    conn: &mut Connection,
    options: &MigrationOptions,
) -> MigrationResult<MigrationReport> {
    let started_at = Instant::now();
    info!(
        "event=timeline_migration module=migration status=start delete_legacy={}",
        options.delete_legacy
    );

    match run_migration(conn, options) {
        Ok(report) => {
            info!(
                "event=timeline_migration module=migration status=ok duration_ms={} timelines={} segments_created={} markers_created={} world_rules_updated={} unresolved={} deleted_legacy={}",
                started_at.elapsed().as_millis(),
                report.timelines_found,
                report.segments_created,
                report.markers_created,
                report.world_rules_updated,
                report.unresolved_legacy_event_links,
                report.deleted_legacy_timeline_nodes
            );
            Ok(report)
        }
        Err(err) => {
            error!(
                "event=timeline_migration module=migration status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn run_migration(
    conn: &mut Connection,
    options: &MigrationOptions,
) -> MigrationResult<MigrationReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = now_epoch_ms();

    let axis_id = upsert_legacy_axis(&tx, now)?;
    let era_id = upsert_legacy_era(&tx, axis_id, now)?;
    let baseline = read_baseline(&tx)?;

    let segment_by_timeline = migrate_timelines(&tx, axis_id, era_id, now)?;
    migrate_event_links(&tx, axis_id, era_id, &segment_by_timeline, now)?;
    let world_rules_updated = remap_world_rules(&tx, &segment_by_timeline, now)?;

    let unresolved = count_unresolved_event_links(&tx)?;
    let segments_total = count(&tx, MIGRATED_SEGMENTS_SQL)?;
    let markers_total = count(&tx, MIGRATED_MARKERS_SQL)?;

    let delete_legacy = options.delete_legacy && unresolved == 0;
    let (deleted_links, deleted_timelines) = if delete_legacy {
        let links = tx.execute("DELETE FROM legacy_occurs_on;", [])?;
        let timelines = tx.execute("DELETE FROM legacy_timelines;", [])?;
        (links as u64, timelines as u64)
    } else {
        (0, 0)
    };

    tx.commit()?;

    Ok(MigrationReport {
        axis_id,
        era_id,
        timelines_found: baseline.timelines,
        segments_created: segments_total.saturating_sub(baseline.segments),
        segments_total,
        legacy_event_links_found: baseline.event_links,
        markers_created: markers_total.saturating_sub(baseline.markers),
        markers_total,
        world_rules_updated,
        unresolved_legacy_event_links: unresolved,
        deleted_occurs_on_relations: deleted_links,
        deleted_timelines,
        deleted_legacy_timeline_nodes: delete_legacy,
    })
}

/// Computes the migration baseline and pending work without writing.
pub fn inspect_legacy(conn: &Connection) -> MigrationResult<LegacyInventory> {
    let baseline = read_baseline(conn)?;
    Ok(LegacyInventory {
        legacy_timelines: baseline.timelines,
        legacy_event_links: baseline.event_links,
        migrated_segments: baseline.segments,
        migrated_markers: baseline.markers,
        unresolved_legacy_event_links: count_unresolved_event_links(conn)?,
        broken_chain_links: count(
            conn,
            "SELECT COUNT(*)
             FROM legacy_timelines t
             WHERE (t.previous_id IS NOT NULL
                    AND NOT EXISTS (SELECT 1 FROM legacy_timelines p WHERE p.id = t.previous_id))
                OR (t.next_id IS NOT NULL
                    AND NOT EXISTS (SELECT 1 FROM legacy_timelines n WHERE n.id = t.next_id));",
        )?,
    })
}

fn upsert_legacy_axis(conn: &Connection, now: i64) -> MigrationResult<Uuid> {
    conn.execute(
        "INSERT INTO timeline_axes (
            id, code, name, axis_type, description, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        ON CONFLICT(code) DO UPDATE SET updated_at = excluded.updated_at;",
        params![
            Uuid::new_v4().to_string(),
            LEGACY_AXIS_CODE,
            LEGACY_AXIS_NAME,
            LEGACY_AXIS_TYPE,
            LEGACY_AXIS_DESCRIPTION,
            ACTIVE_STATUS,
            now,
        ],
    )?;
    let id: String = conn.query_row(
        "SELECT id FROM timeline_axes WHERE code = ?1;",
        [LEGACY_AXIS_CODE],
        |row| row.get(0),
    )?;
    parse_node_id(&id, "timeline_axes.id")
}

fn upsert_legacy_era(conn: &Connection, axis_id: Uuid, now: i64) -> MigrationResult<Uuid> {
    conn.execute(
        "INSERT INTO timeline_eras (
            id, axis_id, code, name, summary, sort_order, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?7)
        ON CONFLICT(code) DO UPDATE SET
            axis_id = excluded.axis_id,
            updated_at = excluded.updated_at;",
        params![
            Uuid::new_v4().to_string(),
            axis_id.to_string(),
            LEGACY_ERA_CODE,
            LEGACY_ERA_NAME,
            LEGACY_ERA_SUMMARY,
            ACTIVE_STATUS,
            now,
        ],
    )?;
    let id: String = conn.query_row(
        "SELECT id FROM timeline_eras WHERE code = ?1;",
        [LEGACY_ERA_CODE],
        |row| row.get(0),
    )?;
    parse_node_id(&id, "timeline_eras.id")
}

fn read_baseline(conn: &Connection) -> MigrationResult<Baseline> {
    Ok(Baseline {
        timelines: count(conn, "SELECT COUNT(*) FROM legacy_timelines;")?,
        event_links: count(conn, "SELECT COUNT(*) FROM legacy_occurs_on;")?,
        segments: count(conn, MIGRATED_SEGMENTS_SQL)?,
        markers: count(conn, MIGRATED_MARKERS_SQL)?,
    })
}

/// Upserts one segment per legacy timeline; returns legacy id -> segment id.
fn migrate_timelines(
    conn: &Connection,
    axis_id: Uuid,
    era_id: Uuid,
    now: i64,
) -> MigrationResult<HashMap<String, Uuid>> {
    let timelines = load_legacy_timelines(conn)?;
    let mut segment_by_timeline = HashMap::with_capacity(timelines.len());

    for (index, timeline) in timelines.iter().enumerate() {
        conn.execute(
            "INSERT INTO timeline_segments (
                id, axis_id, era_id, name, code, summary, description, sort_order,
                start_tick, end_tick, notes, tags, legacy_timeline_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11, ?12, ?13, ?13)
            ON CONFLICT(legacy_timeline_id) DO UPDATE SET
                axis_id = excluded.axis_id,
                era_id = excluded.era_id,
                name = excluded.name,
                code = excluded.code,
                summary = excluded.summary,
                description = excluded.description,
                sort_order = excluded.sort_order,
                start_tick = excluded.start_tick,
                end_tick = excluded.end_tick,
                notes = excluded.notes,
                tags = excluded.tags,
                updated_at = excluded.updated_at;",
            params![
                Uuid::new_v4().to_string(),
                axis_id.to_string(),
                era_id.to_string(),
                timeline.name.as_str(),
                timeline.code.as_deref(),
                timeline.summary.as_deref(),
                timeline.description.as_deref(),
                index as i64,
                timeline.duration_years.unwrap_or(0),
                timeline.notes.as_deref(),
                timeline.tags.as_str(),
                timeline.id.as_str(),
                now,
            ],
        )?;

        let segment_id: String = conn.query_row(
            "SELECT id FROM timeline_segments WHERE legacy_timeline_id = ?1;",
            [timeline.id.as_str()],
            |row| row.get(0),
        )?;
        segment_by_timeline.insert(
            timeline.id.clone(),
            parse_node_id(&segment_id, "timeline_segments.id")?,
        );
    }

    Ok(segment_by_timeline)
}

fn load_legacy_timelines(conn: &Connection) -> MigrationResult<Vec<LegacyTimelineRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, code, summary, description, notes, tags, duration_years
         FROM legacy_timelines
         ORDER BY created_at ASC, name ASC, id ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut timelines = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get("id")?;
        let tags: Option<String> = row.get("tags")?;
        timelines.push(LegacyTimelineRow {
            tags: normalize_legacy_tags(tags.as_deref(), &id)?,
            id,
            name: row.get("name")?,
            code: row.get("code")?,
            summary: row.get("summary")?,
            description: row.get("description")?,
            notes: row.get("notes")?,
            duration_years: row.get("duration_years")?,
        });
    }
    Ok(timelines)
}

/// Re-encodes the legacy tag list so segments always hold a JSON string array.
fn normalize_legacy_tags(raw: Option<&str>, timeline_id: &str) -> MigrationResult<String> {
    let tags = match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Vec::new(),
        Some(value) => serde_json::from_str::<Vec<String>>(value).map_err(|err| {
            MigrationError::InvalidData(format!(
                "legacy timeline `{timeline_id}` has malformed tags: {err}"
            ))
        })?,
    };
    serde_json::to_string(&tags).map_err(|err| MigrationError::InvalidData(err.to_string()))
}

/// Upserts one marker per legacy event link and moves it onto the segment of
/// the edge's timeline. Edges whose timeline has no segment are left for the
/// unresolved count.
fn migrate_event_links(
    conn: &Connection,
    axis_id: Uuid,
    era_id: Uuid,
    segment_by_timeline: &HashMap<String, Uuid>,
    now: i64,
) -> MigrationResult<()> {
    for link in load_event_links(conn)? {
        let Some(segment_id) = segment_by_timeline.get(&link.timeline_id) else {
            continue;
        };
        let tick = link.year.unwrap_or(0);
        let label = marker_label(link.event_name.as_deref(), &link.event_id, link.year);

        conn.execute(
            "INSERT INTO timeline_markers (
                id, axis_id, era_id, segment_id, label, tick, marker_type, description,
                event_ref_id, legacy_event_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?8, ?9, ?9)
            ON CONFLICT(legacy_event_id) DO UPDATE SET
                axis_id = excluded.axis_id,
                era_id = excluded.era_id,
                segment_id = excluded.segment_id,
                label = excluded.label,
                tick = excluded.tick,
                marker_type = excluded.marker_type,
                event_ref_id = excluded.event_ref_id,
                updated_at = excluded.updated_at;",
            params![
                Uuid::new_v4().to_string(),
                axis_id.to_string(),
                era_id.to_string(),
                segment_id.to_string(),
                label,
                tick,
                LEGACY_MARKER_TYPE,
                link.event_id.as_str(),
                now,
            ],
        )?;

        let marker_id: String = conn.query_row(
            "SELECT id FROM timeline_markers WHERE legacy_event_id = ?1;",
            [link.event_id.as_str()],
            |row| row.get(0),
        )?;
        attach_marker(conn, &marker_id, &segment_id.to_string())?;
    }
    Ok(())
}

fn load_event_links(conn: &Connection) -> MigrationResult<Vec<OccursOnRow>> {
    let mut stmt = conn.prepare(
        "SELECT o.event_id, o.timeline_id, o.year, e.name
         FROM legacy_occurs_on o
         LEFT JOIN events e ON e.id = o.event_id
         ORDER BY o.event_id ASC, o.timeline_id ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut links = Vec::new();
    while let Some(row) = rows.next()? {
        links.push(OccursOnRow {
            event_id: row.get(0)?,
            timeline_id: row.get(1)?,
            year: row.get(2)?,
            event_name: row.get(3)?,
        });
    }
    Ok(links)
}

/// Drops every other ownership edge of the marker, then links it to `segment_id`.
fn attach_marker(conn: &Connection, marker_id: &str, segment_id: &str) -> MigrationResult<()> {
    conn.execute(
        "DELETE FROM timeline_segment_markers
         WHERE marker_id = ?1
           AND segment_id <> ?2;",
        params![marker_id, segment_id],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO timeline_segment_markers (segment_id, marker_id)
         VALUES (?1, ?2);",
        params![segment_id, marker_id],
    )?;
    Ok(())
}

fn marker_label(event_name: Option<&str>, event_id: &str, year: Option<i64>) -> String {
    let subject = event_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(event_id);
    match year {
        Some(year) => format!("{subject} (year {year})"),
        None => subject.to_string(),
    }
}

/// Replaces legacy timeline ids in `world_rules.timeline_ids` with segment ids.
/// Returns the number of rules whose list changed.
fn remap_world_rules(
    conn: &Connection,
    segment_by_timeline: &HashMap<String, Uuid>,
    now: i64,
) -> MigrationResult<u64> {
    if segment_by_timeline.is_empty() {
        return Ok(0);
    }

    let rules = {
        let mut stmt = conn.prepare("SELECT id, timeline_ids FROM world_rules ORDER BY id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut rules = Vec::new();
        while let Some(row) = rows.next()? {
            rules.push((row.get::<_, String>(0)?, row.get::<_, String>(1)?));
        }
        rules
    };

    let mut updated = 0;
    for (rule_id, raw_ids) in rules {
        let mut ids: Vec<Value> = serde_json::from_str(&raw_ids).map_err(|err| {
            MigrationError::InvalidData(format!(
                "world rule `{rule_id}` has malformed timeline_ids: {err}"
            ))
        })?;

        let mut changed = false;
        for id in &mut ids {
            let replacement = id
                .as_str()
                .and_then(|legacy_id| segment_by_timeline.get(legacy_id));
            if let Some(segment_id) = replacement {
                *id = Value::String(segment_id.to_string());
                changed = true;
            }
        }
        if !changed {
            continue;
        }

        let encoded = serde_json::to_string(&ids)
            .map_err(|err| MigrationError::InvalidData(err.to_string()))?;
        conn.execute(
            "UPDATE world_rules SET timeline_ids = ?2, updated_at = ?3 WHERE id = ?1;",
            params![rule_id, encoded, now],
        )?;
        updated += 1;
    }
    Ok(updated)
}

/// Counts occurs-on edges whose event has no marker or whose timeline has no
/// migrated segment. An event linked to several timelines shares one marker.
fn count_unresolved_event_links(conn: &Connection) -> MigrationResult<u64> {
    count(
        conn,
        "SELECT COUNT(*)
         FROM legacy_occurs_on o
         WHERE NOT EXISTS (
                 SELECT 1 FROM timeline_markers m WHERE m.legacy_event_id = o.event_id
             )
            OR NOT EXISTS (
                 SELECT 1 FROM timeline_segments s WHERE s.legacy_timeline_id = o.timeline_id
             );",
    )
}

fn count(conn: &Connection, sql: &str) -> MigrationResult<u64> {
    let value: Option<i64> = conn.query_row(sql, [], |row| row.get(0)).optional()?;
    Ok(value.map_or(0, |count| count.max(0) as u64))
}

fn parse_node_id(value: &str, column: &'static str) -> MigrationResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| MigrationError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
