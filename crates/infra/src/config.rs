//! Engine configuration.
//!
//! Loaded from an optional `config/haulbook.toml` overlaid with `HAULBOOK__*`
//! environment variables (e.g. `HAULBOOK__BATCH_WRITE_LIMIT=400`).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use haulbook_observability::LogFormat;

const CONFIG_FILE: &str = "config/haulbook.toml";
const ENV_PREFIX: &str = "HAULBOOK";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Attempts per optimistic transaction before giving up on conflicts.
    #[serde(default = "default_max_transaction_attempts")]
    pub max_transaction_attempts: u32,
    /// Maximum writes per atomic commit.
    #[serde(default = "default_batch_write_limit")]
    pub batch_write_limit: usize,
    /// Postgres URL; the in-memory store is used when unset.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_max_transaction_attempts() -> u32 {
    5
}

fn default_batch_write_limit() -> usize {
    500
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_transaction_attempts: default_max_transaction_attempts(),
            batch_write_limit: default_batch_write_limit(),
            database_url: None,
            listen_addr: default_listen_addr(),
            log_format: LogFormat::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `config/haulbook.toml` (optional) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::with_prefix(ENV_PREFIX).separator("__")),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_transaction_attempts == 0 {
            return Err(ConfigError::Message(
                "max_transaction_attempts must be at least 1".to_string(),
            ));
        }
        if self.batch_write_limit < 2 {
            return Err(ConfigError::Message(
                "batch_write_limit must allow at least 2 writes".to_string(),
            ));
        }
        Ok(())
    }
}
