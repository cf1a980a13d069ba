//! Runner configuration.
//!
//! [`ScribeConfig::load`] reads `config/config.toml` (optional) and then the
//! environment (`SCRIBE__DATABASE__URL`, `SCRIBE__MIGRATION__LOCK_TIMEOUT_SECONDS`, ...).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Advisory lock key used when none is configured ("scribe" in ASCII)
pub const DEFAULT_LOCK_KEY: i64 = 0x7363_7269_6265;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScribeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Unset unless the file or `SCRIBE__DATABASE__URL` provides one
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    /// Seconds to wait for the migration lock before giving up
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,
    /// Key passed to `pg_try_advisory_lock`
    #[serde(default = "default_lock_key")]
    pub lock_key: i64,
    /// Per-statement timeout applied to the migration session
    #[serde(default)]
    pub statement_timeout_seconds: Option<u64>,
}

fn default_lock_timeout_seconds() -> u64 {
    60
}

fn default_lock_key() -> i64 {
    DEFAULT_LOCK_KEY
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_seconds: default_lock_timeout_seconds(),
            lock_key: default_lock_key(),
            statement_timeout_seconds: None,
        }
    }
}

impl ScribeConfig {
    /// Load the configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load the configuration from the given TOML file (optional) and the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("SCRIBE").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // The file exists but cannot be parsed: retry with env only
                if path.exists() {
                    log::warn!(
                        "Failed to load config file {}, falling back to env. Error: {}",
                        path.display(),
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix("SCRIBE").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, \
                             then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        settings.try_deserialize::<ScribeConfig>().map_err(|e| {
            ConfigError::Message(format!(
                "Configuration could not be loaded from file or environment: {}",
                e
            ))
        })
    }
}
