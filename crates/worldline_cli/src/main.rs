//! Administrative entry point.
//!
//! # Responsibility
//! - Run the legacy timeline migration against a named database.
//! - Inspect pending legacy data and smoke-test dual-write projection.
//! - Print machine-readable JSON results on stdout.

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use worldline_core::{
    init_logging, inspect_legacy, migrate_database, DualWriteProjector, EntityWrite,
    MigrationOptions, SqliteStateChangeSink, WorldlineConfig, WriteMode,
};

#[derive(Parser)]
#[command(name = "worldline", version, about = "Timeline migration and provenance tooling")]
struct Cli {
    /// Directory holding `worldline.json`; relative config paths resolve here.
    #[arg(long, env = "WORLDLINE_HOME", default_value = ".", global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print linkage probe and core version.
    Ping,
    /// Migrate legacy timelines into the axis/era/segment/marker hierarchy.
    Migrate {
        #[arg(long)]
        db: String,
        /// Keep legacy timelines and occurs-on edges after migrating.
        #[arg(long)]
        keep_legacy: bool,
    },
    /// Report legacy data still awaiting migration, without writing.
    Inspect {
        #[arg(long)]
        db: String,
    },
    /// Project one entity write into the provenance log.
    Project {
        #[arg(long)]
        db: Option<String>,
        #[arg(long)]
        subject_type: String,
        #[arg(long)]
        subject_id: String,
        #[arg(long, value_enum)]
        mode: ModeArg,
        /// Persisted entity as JSON.
        #[arg(long)]
        entity: String,
        /// Original request payload as JSON (updates).
        #[arg(long)]
        payload: Option<String>,
        /// Timeline header as `name=value`; repeatable.
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        #[arg(long, default_value = "cli")]
        action: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Create,
    Update,
}

impl From<ModeArg> for WriteMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Create => WriteMode::Create,
            ModeArg::Update => WriteMode::Update,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("worldline: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<String, String> {
    match cli.command {
        Command::Ping => Ok(format!(
            "worldline_core ping={} version={}",
            worldline_core::ping(),
            worldline_core::core_version()
        )),
        Command::Migrate { db, keep_legacy } => {
            let config = load_config(&cli.config_dir)?;
            let registry = config.database_registry(&cli.config_dir);
            let options = MigrationOptions {
                delete_legacy: !keep_legacy,
            };
            let report =
                migrate_database(&registry, &db, &options).map_err(|err| err.to_string())?;
            to_json(&report)
        }
        Command::Inspect { db } => {
            let config = load_config(&cli.config_dir)?;
            let conn = config
                .database_registry(&cli.config_dir)
                .open(&db)
                .map_err(|err| err.to_string())?;
            let inventory = inspect_legacy(&conn).map_err(|err| err.to_string())?;
            to_json(&inventory)
        }
        Command::Project {
            db,
            subject_type,
            subject_id,
            mode,
            entity,
            payload,
            headers,
            action,
        } => {
            let config = load_config(&cli.config_dir)?;
            let registry = config.database_registry(&cli.config_dir);
            let entity = parse_json("entity", &entity)?;
            let payload = payload
                .as_deref()
                .map(|raw| parse_json("payload", raw))
                .transpose()?;
            let projector = DualWriteProjector::new(
                SqliteStateChangeSink::new(registry),
                config.dual_write_enabled,
            );
            let write = EntityWrite {
                database: db.as_deref(),
                subject_type: &subject_type,
                subject_id: &subject_id,
                entity: &entity,
                mode: mode.into(),
                payload: payload.as_ref(),
                action: &action,
            };
            let outcome = projector.project_with_headers(
                headers
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str())),
                &write,
            );
            to_json(&outcome)
        }
    }
}

fn load_config(config_dir: &Path) -> Result<WorldlineConfig, String> {
    let mut config = WorldlineConfig::load_or_init(config_dir).map_err(|err| err.to_string())?;
    config.apply_env_overrides();

    if let Some(log_dir) = config.resolved_log_dir(config_dir) {
        let log_dir = std::path::absolute(&log_dir).unwrap_or(log_dir);
        match init_logging(&config.log_level, &log_dir) {
            Ok(()) => info!(
                "event=cli_start module=cli status=ok dual_write_enabled={}",
                config.dual_write_enabled
            ),
            Err(err) => eprintln!("worldline: logging disabled: {err}"),
        }
    }
    Ok(config)
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("header `{raw}` must be name=value"))?;
    Ok((name.trim().to_string(), value.to_string()))
}

fn parse_json(label: &str, raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|err| format!("invalid {label} json: {err}"))
}

fn to_json(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|err| err.to_string())
}
