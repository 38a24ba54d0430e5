//! Configuration loading and resolution
//!
//! Bootstrap-only configuration, resolved in priority order:
//! 1. Command-line argument / environment variable (via [`ConfigOverrides`])
//! 2. TOML config file
//! 3. Compiled defaults
//!
//! A missing TOML file is not an error: a warning is logged and defaults
//! apply. A TOML file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "EMOTRACK_CONFIG";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5730;

/// Default bind address (local only)
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// TOML bootstrap configuration (`emotrack.toml`)
///
/// Every field is optional; unset fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub bind_address: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// SQLite file for finalized results
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Shared key expected in the `Authorization` header. Empty disables auth.
    #[serde(default)]
    pub authorization_key: Option<String>,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub collaborators: CollaboratorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Idle-session reaping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions without activity for this long are discarded
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How often the reaper sweeps the registry
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// External inference collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// Frame emotion inference endpoint (POST image bytes, JSON scores back)
    #[serde(default)]
    pub analyzer_url: Option<String>,

    /// Action-unit extraction command; program followed by its arguments
    #[serde(default)]
    pub action_unit_command: Option<Vec<String>>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            analyzer_url: None,
            action_unit_command: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line / environment tier
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    pub authorization_key: Option<String>,
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub authorization_key: Option<String>,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub analyzer_url: Option<String>,
    pub action_unit_command: Option<Vec<String>>,
    pub collaborator_timeout: Duration,
    pub log_level: String,
}

impl ServiceConfig {
    /// Resolve configuration from overrides, the TOML file, and defaults
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match locate_config_file(overrides.config_path.as_deref()) {
            Some(path) => load_toml_config(&path)?,
            None => {
                info!("No config file found, using defaults");
                TomlConfig::default()
            }
        };
        Self::merge(overrides, toml_config)
    }

    /// Merge an already-loaded TOML config under the overrides
    pub fn merge(overrides: ConfigOverrides, toml_config: TomlConfig) -> Result<Self> {
        let TomlConfig {
            bind_address,
            port,
            database_path,
            authorization_key,
            sessions,
            collaborators,
            logging,
        } = toml_config;

        if sessions.idle_timeout_secs == 0 {
            return Err(Error::Config("sessions.idle_timeout_secs must be > 0".to_string()));
        }
        if sessions.sweep_interval_secs == 0 {
            return Err(Error::Config("sessions.sweep_interval_secs must be > 0".to_string()));
        }

        let authorization_key = overrides
            .authorization_key
            .or(authorization_key)
            .filter(|key| !key.trim().is_empty());

        let action_unit_command = collaborators
            .action_unit_command
            .filter(|command| !command.is_empty());

        Ok(Self {
            bind_address: overrides
                .bind_address
                .or(bind_address)
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            port: overrides.port.or(port).unwrap_or(DEFAULT_PORT),
            database_path: overrides
                .database_path
                .or(database_path)
                .unwrap_or_else(default_database_path),
            authorization_key,
            idle_timeout: Duration::from_secs(sessions.idle_timeout_secs),
            sweep_interval: Duration::from_secs(sessions.sweep_interval_secs),
            analyzer_url: collaborators.analyzer_url.filter(|url| !url.trim().is_empty()),
            action_unit_command,
            collaborator_timeout: Duration::from_millis(collaborators.request_timeout_ms),
            log_level: overrides.log_level.unwrap_or(logging.level),
        })
    }
}

/// Find the config file to load
///
/// Explicit path first, then `EMOTRACK_CONFIG`, then the platform config
/// directory (only if the file exists there).
pub fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|path| path.exists())
}

/// Platform config location: `<config dir>/emotrack/emotrack.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("emotrack").join("emotrack.toml"))
}

/// Platform data location for the results database
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("emotrack"))
        .unwrap_or_else(|| PathBuf::from("./emotrack_data"))
        .join("emotrack.db")
}

/// Load TOML config; a missing file yields defaults with a warning
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Serialize config to a TOML file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::merge(ConfigOverrides::default(), TomlConfig::default()).unwrap();
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.collaborator_timeout, Duration::from_millis(10_000));
        assert_eq!(config.log_level, "info");
        assert!(config.authorization_key.is_none());
        assert!(config.database_path.ends_with("emotrack.db"));
    }

    #[test]
    fn test_overrides_beat_toml() {
        let toml_config = TomlConfig {
            port: Some(6000),
            authorization_key: Some("from-toml".to_string()),
            ..Default::default()
        };
        let overrides = ConfigOverrides {
            port: Some(7000),
            ..Default::default()
        };

        let config = ServiceConfig::merge(overrides, toml_config).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.authorization_key.as_deref(), Some("from-toml"));
    }

    #[test]
    fn test_blank_authorization_key_disables_auth() {
        let overrides = ConfigOverrides {
            authorization_key: Some("   ".to_string()),
            ..Default::default()
        };
        let config = ServiceConfig::merge(overrides, TomlConfig::default()).unwrap();
        assert!(config.authorization_key.is_none());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let mut toml_config = TomlConfig::default();
        toml_config.sessions.sweep_interval_secs = 0;
        let result = ServiceConfig::merge(ConfigOverrides::default(), toml_config);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_toml_parses() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 5999

            [sessions]
            idle_timeout_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.port, Some(5999));
        assert_eq!(config.sessions.idle_timeout_secs, 120);
        assert_eq!(config.sessions.sweep_interval_secs, 60);
        assert_eq!(config.logging.level, "info");
        assert!(config.collaborators.analyzer_url.is_none());
    }
}
