//! Runtime configuration.
//!
//! # Responsibility
//! - Load `worldline.json` from a base directory, writing defaults on first use.
//! - Apply environment overrides for operational switches.
//!
//! # Invariants
//! - Relative paths in the file resolve against the base directory.
//! - A missing file is not an error; a malformed file is.

use crate::db::DatabaseRegistry;
use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "worldline.json";
/// `0`, `false`, `off` or `no` disables dual-write; anything else enables it.
pub const ENV_DUAL_WRITE: &str = "WORLDLINE_DUAL_WRITE";

const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Serialize(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "config io `{}`: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "malformed config `{}`: {source}", path.display())
            }
            Self::Serialize(err) => write!(f, "serialize config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Serialize(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldlineConfig {
    /// Directory holding one `<name>.sqlite3` file per database.
    pub data_dir: PathBuf,
    pub dual_write_enabled: bool,
    pub log_level: String,
    /// Rolling log directory; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for WorldlineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            dual_write_enabled: true,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl WorldlineConfig {
    /// Reads `<base_dir>/worldline.json`, creating it with defaults when absent.
    pub fn load_or_init(base_dir: &Path) -> Result<Self, ConfigError> {
        fs::create_dir_all(base_dir).map_err(|source| ConfigError::Io {
            path: base_dir.to_path_buf(),
            source,
        })?;
        let path = base_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            return Self::from_path(&path);
        }

        let config = Self::default();
        let payload = serde_json::to_string_pretty(&config).map_err(ConfigError::Serialize)?;
        fs::write(&path, payload).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `WORLDLINE_DUAL_WRITE` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(ENV_DUAL_WRITE) {
            self.dual_write_enabled = parse_switch(&value);
        }
    }

    pub fn resolved_data_dir(&self, base_dir: &Path) -> PathBuf {
        resolve(base_dir, &self.data_dir)
    }

    pub fn resolved_log_dir(&self, base_dir: &Path) -> Option<PathBuf> {
        self.log_dir.as_deref().map(|dir| resolve(base_dir, dir))
    }

    pub fn database_registry(&self, base_dir: &Path) -> DatabaseRegistry {
        DatabaseRegistry::new(self.resolved_data_dir(base_dir))
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn parse_switch(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}

#[cfg(test)]
mod tests {
    use super::{parse_switch, WorldlineConfig};
    use std::path::{Path, PathBuf};

    #[test]
    fn switch_values() {
        assert!(!parse_switch("0"));
        assert!(!parse_switch(" OFF "));
        assert!(!parse_switch("false"));
        assert!(parse_switch("1"));
        assert!(parse_switch("on"));
    }

    #[test]
    fn relative_dirs_resolve_against_base() {
        let config = WorldlineConfig {
            log_dir: Some(PathBuf::from("logs")),
            ..WorldlineConfig::default()
        };
        let base = Path::new("/srv/worldline");
        assert_eq!(config.resolved_data_dir(base), base.join("data"));
        assert_eq!(config.resolved_log_dir(base), Some(base.join("logs")));

        let absolute = WorldlineConfig {
            data_dir: PathBuf::from("/mnt/graph"),
            ..WorldlineConfig::default()
        };
        assert_eq!(absolute.resolved_data_dir(base), PathBuf::from("/mnt/graph"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: WorldlineConfig =
            serde_json::from_str(r#"{ "dual_write_enabled": false }"#).unwrap();
        assert!(!config.dual_write_enabled);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.log_dir.is_none());
    }
}
