//! Logical database name to SQLite file mapping.

use super::{open_db, DbError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

const DB_FILE_EXTENSION: &str = "sqlite3";

static DATABASE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").expect("valid database name regex")
});

/// Resolves database names to files under one data directory.
///
/// Every `open` call hands out a fresh connection; dropping it ends the
/// session on every exit path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRegistry {
    data_dir: PathBuf,
}

impl DatabaseRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the file path backing `name` without touching the filesystem.
    pub fn path_for(&self, name: &str) -> DbResult<PathBuf> {
        let name = validate_database_name(name)?;
        Ok(self.data_dir.join(format!("{name}.{DB_FILE_EXTENSION}")))
    }

    /// Opens a migrated session against `name`, creating the data directory
    /// and database file on first use.
    pub fn open(&self, name: &str) -> DbResult<Connection> {
        let path = self.path_for(name)?;
        std::fs::create_dir_all(&self.data_dir)?;
        open_db(path)
    }
}

/// Trims and validates a logical database name.
pub fn validate_database_name(name: &str) -> DbResult<&str> {
    let trimmed = name.trim();
    if DATABASE_NAME_RE.is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(DbError::InvalidDatabaseName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_database_name, DatabaseRegistry};
    use crate::db::DbError;

    #[test]
    fn accepts_plain_names_and_trims() {
        assert_eq!(validate_database_name(" saga_main ").unwrap(), "saga_main");
        assert_eq!(validate_database_name("world-2").unwrap(), "world-2");
    }

    #[test]
    fn rejects_paths_and_blank_names() {
        for name in ["", "   ", "../escape", "a/b", "-leading", "with space"] {
            let err = validate_database_name(name).unwrap_err();
            assert!(matches!(err, DbError::InvalidDatabaseName(_)), "{name}");
        }
    }

    #[test]
    fn path_for_stays_under_data_dir() {
        let registry = DatabaseRegistry::new("/var/lib/worldline");
        let path = registry.path_for("saga").unwrap();
        assert_eq!(
            path,
            std::path::PathBuf::from("/var/lib/worldline/saga.sqlite3")
        );
    }
}
