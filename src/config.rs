//! Configuration management for the KoboNFT rate limiter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{KoboError, Result};
use crate::ratelimit::{PresetTable, RateLimitConfig, DEFAULT_STORAGE_KEY};

/// Prefix for environment variable overrides, e.g. `KOBO__STORAGE__PATH`.
const ENV_PREFIX: &str = "KOBO";

/// Main configuration for the rate limiter tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Durable storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-category quota overrides, keyed by category name
    #[serde(default)]
    pub presets: HashMap<String, RateLimitConfig>,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the JSON document holding limiter state
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Key the limiter snapshot is stored under
    #[serde(default = "default_storage_key")]
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            key: default_storage_key(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("kobo-ratelimit.json")
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from an optional YAML file layered under
    /// `KOBO__`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), but reads overrides from `env` instead of
    /// the process environment when given.
    fn load_with_env(path: Option<&Path>, env: Option<::config::Map<String, String>>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .source(env),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| KoboError::Config(e.to_string()))
    }

    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| KoboError::Config(e.to_string()))
    }

    /// Build the effective preset table: shipped defaults plus overrides.
    pub fn preset_table(&self) -> Result<PresetTable> {
        PresetTable::new().with_overrides(&self.presets)
    }
}
