//! Transaction configuration.

use std::time::Duration;

use serde::Deserialize;

fn default_expiry() -> Duration {
    Duration::from_secs(3600)
}

fn default_reaper_interval() -> Duration {
    Duration::from_millis(100)
}

/// Transaction configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// How long a transaction may stay open (e.g., "1h", "30s")
    #[serde(default = "default_expiry", with = "humantime_serde")]
    pub expiry: Duration,

    /// How often expired transactions are reaped (e.g., "100ms")
    #[serde(default = "default_reaper_interval", with = "humantime_serde")]
    pub reaper_interval: Duration,

    /// Maximum buffered writes per transaction (0 = unlimited)
    pub max_buffered_writes: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            expiry: default_expiry(),
            reaper_interval: default_reaper_interval(),
            max_buffered_writes: 10_000,
        }
    }
}
