use std::time::Duration;

use muxlink_types::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_POOL_SIZE, DEFAULT_SWEEP_INTERVAL_SECS,
    DEFAULT_TOUCH_DEBOUNCE_MS,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Pool sizing and eviction timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Touches closer together than this are dropped
    #[serde(default = "default_touch_debounce_ms")]
    pub touch_debounce_ms: u64,
}

fn default_max_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_touch_debounce_ms() -> u64 {
    DEFAULT_TOUCH_DEBOUNCE_MS
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            touch_debounce_ms: default_touch_debounce_ms(),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn touch_debounce(&self) -> Duration {
        Duration::from_millis(self.touch_debounce_ms)
    }
}
