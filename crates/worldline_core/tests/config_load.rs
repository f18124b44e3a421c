use std::path::PathBuf;
use worldline_core::config::CONFIG_FILE_NAME;
use worldline_core::{migrate_database, ConfigError, MigrationOptions, WorldlineConfig};

#[test]
fn load_or_init_writes_defaults_on_first_use() {
    let dir = tempfile::tempdir().unwrap();

    let config = WorldlineConfig::load_or_init(dir.path()).unwrap();
    assert_eq!(config, WorldlineConfig::default());
    assert!(config.dual_write_enabled);
    assert!(dir.path().join(CONFIG_FILE_NAME).exists());

    let reloaded = WorldlineConfig::load_or_init(dir.path()).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn load_or_init_reads_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        r#"{ "data_dir": "graphs", "dual_write_enabled": false, "log_level": "warn" }"#,
    )
    .unwrap();

    let config = WorldlineConfig::load_or_init(dir.path()).unwrap();
    assert_eq!(config.data_dir, PathBuf::from("graphs"));
    assert!(!config.dual_write_enabled);
    assert_eq!(config.log_level, "warn");
    assert_eq!(
        config.database_registry(dir.path()).data_dir(),
        dir.path().join("graphs")
    );
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();

    let err = WorldlineConfig::load_or_init(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn configured_registry_runs_migration_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorldlineConfig::load_or_init(dir.path()).unwrap();
    let registry = config.database_registry(dir.path());

    {
        let conn = registry.open("saga").unwrap();
        conn.execute_batch(
            "INSERT INTO legacy_timelines (id, name, created_at) VALUES ('t-1', 'First Age', 1);
             INSERT INTO events (id, name) VALUES ('e-1', 'Dawn');
             INSERT INTO legacy_occurs_on (event_id, timeline_id, year) VALUES ('e-1', 't-1', 4);",
        )
        .unwrap();
    }

    let report = migrate_database(&registry, "saga", &MigrationOptions::default()).unwrap();
    assert_eq!(report.segments_created, 1);
    assert_eq!(report.markers_created, 1);
    assert!(report.deleted_legacy_timeline_nodes);

    let again = migrate_database(&registry, "saga", &MigrationOptions::default()).unwrap();
    assert_eq!(again.axis_id, report.axis_id);
    assert_eq!(again.segments_total, 1);
    assert_eq!(again.segments_created, 0);
}
