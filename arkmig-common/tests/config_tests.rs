//! Tests for configuration resolution and file loading
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate ARKMIG_CONFIG are marked with #[serial].

use arkmig_common::config::{resolve_config_path, MigrationConfig, CONFIG_ENV_VAR};
use arkmig_common::metadata::MetadataDocument;
use arkmig_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::Path;

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Should create temp file");
    file.write_all(contents.as_bytes()).expect("Should write temp file");
    file
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")));
    assert_eq!(resolved.as_deref(), Some(Path::new("/tmp/from-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(None);
    assert_eq!(resolved.as_deref(), Some(Path::new("/tmp/from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_resolve_loads_file_from_env() {
    let file = write_temp(
        r#"
        [database]
        path = "/data/archive.db"

        [cache]
        grace_period_ms = 1000
        "#,
    );
    env::set_var(CONFIG_ENV_VAR, file.path());

    let config = MigrationConfig::resolve(None).expect("Config should load");
    assert_eq!(config.database.path, Path::new("/data/archive.db"));
    assert_eq!(config.cache.grace_period_ms, 1000);
    // Unspecified sections keep defaults
    assert_eq!(config.cache.poll_interval_ms, 25);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_missing_explicit_file_is_error() {
    let err = MigrationConfig::resolve(Some(Path::new("/nonexistent/arkmig.toml"))).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_malformed_file_is_error() {
    let file = write_temp("[processing\nbatch_size = ");
    let err = MigrationConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::Toml(_)));
}

#[test]
fn test_metadata_document_from_file() {
    let file = write_temp(
        r#"
        name = "hr"

        [[tables]]
        source_name = "emp"
        target_name = "EMPLOYEE"
        fields = [
            { source_name = "id", target_name = "EmployeeID", source_type = "int64" },
            { source_name = "hired", target_name = "Hired", source_type = "string", target_type = "datetime" },
        ]
        candidate_keys = [{ name = "PK_EMPLOYEE", fields = ["EmployeeID"] }]

        [[views]]
        source_name = "v_emp"
        fields = [{ source_name = "id", source_type = "int64" }]
        "#,
    );

    let source = MetadataDocument::load(file.path())
        .and_then(|doc| doc.build())
        .expect("Metadata should build");

    assert_eq!(source.tables().len(), 1);
    assert_eq!(source.views().len(), 1);
    let employee = source.require_table("EMPLOYEE").unwrap();
    let hired = employee.require_field("hired").unwrap();
    assert_eq!(hired.source_datatype().name(), "string");
    assert_eq!(hired.datatype().name(), "datetime");
    assert!(source.table("v_emp").is_some());
}
