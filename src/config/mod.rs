//! Configuration Module
//!
//! Provides TOML-based configuration for the delivery core with support for:
//! - Selector language extensions and limits
//! - Default credit window and acknowledgement mode
//! - Transaction expiry and reaping
//! - Environment variable overrides (VIBEMQ_DELIVERY__* prefix)

use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

pub use transactions::TransactionConfig;

use crate::delivery::{AckMode, CreditHandler};
use crate::selector::{ExtensionRegistry, DEFAULT_MAX_DEPTH, DEFAULT_MAX_LIKE_PATTERN};

mod transactions;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "VIBEMQ_DELIVERY";

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}


/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Selector language configuration
    pub selector: SelectorConfig,
    /// Subscription delivery defaults
    pub delivery: DeliveryConfig,
    /// Transaction configuration
    pub transactions: TransactionConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Selector language configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Registered payload parser extensions (e.g., "json")
    pub extensions: Vec<String>,
    /// Maximum LIKE pattern size in bytes (0 = unlimited)
    pub max_like_pattern: usize,
    /// Maximum expression nesting and tree depth (0 = unlimited)
    pub max_depth: usize,
    /// Maximum cached selector texts (0 = unlimited)
    pub cache_capacity: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["json".to_string()],
            max_like_pattern: DEFAULT_MAX_LIKE_PATTERN,
            max_depth: DEFAULT_MAX_DEPTH,
            cache_capacity: 0,
        }
    }
}

/// Subscription delivery defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Default credit window (maximum unacknowledged messages)
    pub receive_maximum: i32,
    /// Acknowledgement mode
    pub ack_mode: AckMode,
    /// Credit manager
    pub credit_handler: CreditHandler,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            receive_maximum: 32,
            ack_mode: AckMode::Cumulative,
            credit_handler: CreditHandler::Fixed,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `VIBEMQ_DELIVERY__` prefix with double underscores for nesting:
    ///    - `VIBEMQ_DELIVERY__DELIVERY__RECEIVE_MAXIMUM=64` overrides `delivery.receive_maximum`
    ///    - `VIBEMQ_DELIVERY__TRANSACTIONS__EXPIRY=30s` overrides `transactions.expiry`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            // Start with defaults
            .set_default("log.level", "info")?
            .set_default("selector.extensions", vec!["json"])?
            .set_default("selector.max_like_pattern", DEFAULT_MAX_LIKE_PATTERN as u64)?
            .set_default("selector.max_depth", DEFAULT_MAX_DEPTH as u64)?
            .set_default("selector.cache_capacity", 0)?
            .set_default("delivery.receive_maximum", 32)?
            .set_default("delivery.ack_mode", "cumulative")?
            .set_default("delivery.credit_handler", "fixed")?
            .set_default("transactions.expiry", "1h")?
            .set_default("transactions.reaper_interval", "100ms")?
            .set_default("transactions.max_buffered_writes", 10_000)?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content)?;
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery.receive_maximum <= 0 {
            return Err(ConfigError::Validation(
                "delivery.receive_maximum must be greater than 0".to_string(),
            ));
        }

        if self.transactions.reaper_interval.is_zero() {
            return Err(ConfigError::Validation(
                "transactions.reaper_interval must be greater than 0".to_string(),
            ));
        }

        if let Err(name) = ExtensionRegistry::from_names(&self.selector.extensions) {
            return Err(ConfigError::Validation(format!(
                "Unknown selector extension '{}'",
                name
            )));
        }

        Ok(())
    }
}
