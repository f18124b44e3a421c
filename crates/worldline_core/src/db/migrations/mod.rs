//! Graph schema versions.
//!
//! - v1: legacy world graph (flat timelines, events, occurs-on edge, world
//!   rules). Kept so imported legacy rows have a home.
//! - v2: axis/era/segment/marker hierarchy and the segment-marker ownership
//!   edge, with unique natural keys the data migration upserts on.
//! - v3: append-only `timeline_state_changes` log guarded by triggers.
//!
//! The version lives in `PRAGMA user_version`. Moving legacy rows into the
//! hierarchy is a data migration run on demand by
//! `service::legacy_migration`, never on connection bootstrap.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct SchemaMigration {
    version: u32,
    sql: &'static str,
}

const SCHEMA_MIGRATIONS: &[SchemaMigration] = &[
    SchemaMigration {
        version: 1,
        sql: include_str!("0001_legacy_graph.sql"),
    },
    SchemaMigration {
        version: 2,
        sql: include_str!("0002_timeline_hierarchy.sql"),
    },
    SchemaMigration {
        version: 3,
        sql: include_str!("0003_state_changes.sql"),
    },
];

/// Returns the latest schema version known by this binary.
pub fn latest_version() -> u32 {
    SCHEMA_MIGRATIONS
        .last()
        .map_or(0, |migration| migration.version)
}

/// Applies all pending schema migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current = schema_version(conn)?;
    let latest = latest_version();

    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in SCHEMA_MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current)
    {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    info!("event=schema_migrate module=db status=ok from_version={current} to_version={latest}");
    Ok(())
}

/// Reads the schema version recorded in `PRAGMA user_version`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, latest_version, schema_version, SCHEMA_MIGRATIONS};
    use rusqlite::Connection;

    #[test]
    fn versions_are_strictly_increasing() {
        let versions = SCHEMA_MIGRATIONS
            .iter()
            .map(|migration| migration.version)
            .collect::<Vec<_>>();
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(latest_version(), 3);
    }

    #[test]
    fn legacy_only_database_upgrades_without_losing_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_MIGRATIONS[0].sql).unwrap();
        conn.execute_batch(
            "PRAGMA user_version = 1;
             INSERT INTO legacy_timelines (id, name) VALUES ('t-1', 'First Age');",
        )
        .unwrap();

        apply_migrations(&mut conn).unwrap();

        assert_eq!(schema_version(&conn).unwrap(), latest_version());
        let legacy: i64 = conn
            .query_row("SELECT COUNT(*) FROM legacy_timelines;", [], |row| row.get(0))
            .unwrap();
        let segments: i64 = conn
            .query_row("SELECT COUNT(*) FROM timeline_segments;", [], |row| row.get(0))
            .unwrap();
        assert_eq!((legacy, segments), (1, 0));
    }
}
