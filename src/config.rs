//! Configuration loading
//!
//! Settings live in a single TOML file: the admin-client connection, the
//! readiness gate, reconciliation options and one table per extension.

use converge::{ExtensionConfig, ReadinessConfig, ReconcileOptions, ReconciliationMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding the configuration file location
pub const ENV_CONFIG_FILE: &str = "KAFKAFORM_CONFIG";

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML or has unexpected fields
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration parsed but a value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for converge::Error {
    fn from(err: ConfigError) -> Self {
        converge::Error::configuration("config", err.to_string())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub client: ClientConfig,
    pub reconcile: ReconcileConfig,
    /// Extension parameters keyed by extension name
    pub extensions: BTreeMap<String, toml::Table>,
}

/// Admin-client connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub readiness: ReadinessSettings,
    /// Extra properties passed verbatim to the admin client
    pub properties: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            client_id: "kafkaform".to_string(),
            readiness: ReadinessSettings::default(),
            properties: BTreeMap::new(),
        }
    }
}

/// Readiness gate settings as written in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessSettings {
    pub enabled: bool,
    pub min_available_brokers: usize,
    pub timeout_ms: u64,
    pub retry_backoff_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_available_brokers: 1,
            timeout_ms: 60_000,
            retry_backoff_ms: 1_000,
        }
    }
}

impl From<ReadinessSettings> for ReadinessConfig {
    fn from(settings: ReadinessSettings) -> Self {
        Self {
            enabled: settings.enabled,
            min_available_nodes: settings.min_available_brokers,
            timeout: Duration::from_millis(settings.timeout_ms),
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

/// Reconciliation settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    pub mode: ReconciliationMode,
    pub dry_run: bool,
    /// Remove topic configs that are set on the cluster but absent from the desired state
    pub delete_orphan_configs: bool,
}

impl ReconcileConfig {
    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions::new(self.mode, self.dry_run)
    }
}

impl Config {
    /// Parse and check a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Default configuration file location
    ///
    /// Priority:
    /// 1. `KAFKAFORM_CONFIG` env var
    /// 2. `<platform config dir>/kafkaform/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(file) = std::env::var(ENV_CONFIG_FILE) {
            log::debug!("Using config file from {ENV_CONFIG_FILE}: {file}");
            return Some(PathBuf::from(file));
        }
        dirs::config_dir().map(|dir| dir.join("kafkaform").join("config.toml"))
    }

    /// Load the default configuration file, or built-in defaults if there is none
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                log::debug!("Config file does not exist, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parameters for one extension; empty when the file has no table for it
    pub fn extension(&self, name: &str) -> converge::Result<ExtensionConfig> {
        match self.extensions.get(name) {
            None => Ok(ExtensionConfig::new(name)),
            Some(table) => {
                let value = serde_json::to_value(table)
                    .map_err(|e| converge::Error::configuration(name, e.to_string()))?;
                ExtensionConfig::from_value(name, value)
            }
        }
    }

    /// Whether the file has a table for the extension
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.client.bootstrap_servers.trim().is_empty() {
            return Err(ConfigError::Invalid("client.bootstrap_servers must not be empty".into()));
        }
        let readiness = &self.client.readiness;
        if readiness.enabled {
            if readiness.min_available_brokers == 0 {
                return Err(ConfigError::Invalid(
                    "client.readiness.min_available_brokers must be at least 1".into(),
                ));
            }
            if readiness.retry_backoff_ms == 0 {
                return Err(ConfigError::Invalid(
                    "client.readiness.retry_backoff_ms must be greater than 0".into(),
                ));
            }
        }
        Ok(())
    }
}
