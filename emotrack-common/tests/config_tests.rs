//! Integration tests for configuration loading and resolution
//!
//! Tests cover:
//! - Missing TOML files fall back to defaults instead of failing
//! - Malformed TOML files are reported as configuration errors
//! - Priority order: overrides > TOML > compiled defaults
//! - EMOTRACK_CONFIG locates the config file
//!
//! Note: Uses serial_test to prevent ENV variable race conditions.
//! Tests that manipulate EMOTRACK_CONFIG are marked with #[serial].

use emotrack_common::config::{
    load_toml_config, locate_config_file, write_toml_config, CollaboratorConfig, ConfigOverrides,
    ServiceConfig, TomlConfig, CONFIG_ENV_VAR, DEFAULT_PORT,
};
use emotrack_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("does-not-exist.toml");

    let config = load_toml_config(&missing).expect("Missing file should not be an error");
    assert!(config.port.is_none());
    assert_eq!(config.sessions.idle_timeout_secs, 1800);
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("emotrack.toml");
    std::fs::write(&path, "port = \"not a number\"\n[sessions\n").unwrap();

    let result = load_toml_config(&path);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_write_then_resolve_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("emotrack.toml");

    let mut written = TomlConfig {
        port: Some(5999),
        database_path: Some(PathBuf::from("/tmp/emotrack-test.db")),
        authorization_key: Some("secret-key".to_string()),
        collaborators: CollaboratorConfig {
            analyzer_url: Some("http://127.0.0.1:9000/analyze".to_string()),
            action_unit_command: Some(vec!["au-extract".to_string(), "--json".to_string()]),
            request_timeout_ms: 2500,
        },
        ..Default::default()
    };
    written.sessions.idle_timeout_secs = 90;
    write_toml_config(&written, &path).unwrap();

    let overrides = ConfigOverrides {
        config_path: Some(path),
        ..Default::default()
    };
    let config = ServiceConfig::resolve(overrides).unwrap();

    assert_eq!(config.port, 5999);
    assert_eq!(config.database_path, PathBuf::from("/tmp/emotrack-test.db"));
    assert_eq!(config.authorization_key.as_deref(), Some("secret-key"));
    assert_eq!(config.idle_timeout, Duration::from_secs(90));
    assert_eq!(config.collaborator_timeout, Duration::from_millis(2500));
    assert_eq!(
        config.analyzer_url.as_deref(),
        Some("http://127.0.0.1:9000/analyze")
    );
    assert_eq!(
        config.action_unit_command,
        Some(vec!["au-extract".to_string(), "--json".to_string()])
    );
}

#[test]
#[serial]
fn test_env_var_locates_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("from-env.toml");
    std::fs::write(&path, "port = 6123\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let located = locate_config_file(None);
    let config = ServiceConfig::resolve(ConfigOverrides::default());
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(located, Some(path));
    assert_eq!(config.unwrap().port, 6123);
}

#[test]
#[serial]
fn test_explicit_path_beats_env_var() {
    let temp_dir = TempDir::new().unwrap();
    let explicit = temp_dir.path().join("explicit.toml");
    let from_env = temp_dir.path().join("env.toml");
    std::fs::write(&explicit, "port = 7001\n").unwrap();
    std::fs::write(&from_env, "port = 7002\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &from_env);
    let config = ServiceConfig::resolve(ConfigOverrides {
        config_path: Some(explicit),
        ..Default::default()
    });
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.unwrap().port, 7001);
}

#[test]
#[serial]
fn test_cli_override_beats_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("emotrack.toml");
    std::fs::write(&path, "port = 7100\nbind_address = \"0.0.0.0\"\n").unwrap();

    env::remove_var(CONFIG_ENV_VAR);
    let config = ServiceConfig::resolve(ConfigOverrides {
        config_path: Some(path),
        port: Some(7200),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(config.port, 7200);
    assert_eq!(config.bind_address, "0.0.0.0");
    assert_ne!(config.port, DEFAULT_PORT);
}
