//! Environment override tests
//!
//! These mutate process environment variables, so they run serially.

use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;
use trellis_config::{ConfigError, ConfigLoader, ENV_DB_PATH, ENV_INSTANCE_ID, ENV_SESSION_TIMEOUT};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn clear_env() {
    for var in [ENV_DB_PATH, ENV_INSTANCE_ID, ENV_SESSION_TIMEOUT] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_file_values_are_loaded() {
    clear_env();
    let file = write_config(
        r#"
        [storage]
        path = "/tmp/trellis-test.db"

        [sync]
        instance_id = "laptop"
        "#,
    );

    let config = ConfigLoader::load_from_file(file.path()).unwrap();
    assert_eq!(config.storage.path.to_str(), Some("/tmp/trellis-test.db"));
    assert_eq!(config.sync.instance_id, "laptop");
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let file = write_config(
        r#"
        [sync]
        instance_id = "laptop"
        "#,
    );

    std::env::set_var(ENV_INSTANCE_ID, "desktop");
    std::env::set_var(ENV_SESSION_TIMEOUT, "42");
    let config = ConfigLoader::load_from_file(file.path()).unwrap();
    clear_env();

    assert_eq!(config.sync.instance_id, "desktop");
    assert_eq!(config.protected_session.timeout_secs, 42);
}

#[test]
#[serial]
fn test_non_numeric_timeout_rejected() {
    clear_env();
    let file = write_config("");

    std::env::set_var(ENV_SESSION_TIMEOUT, "soon");
    let result = ConfigLoader::load_from_file(file.path());
    clear_env();

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
#[serial]
fn test_missing_file_is_io_error() {
    clear_env();
    let result = ConfigLoader::load_from_file("/definitely/not/here/trellis.toml");
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}
