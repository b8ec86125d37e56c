use muxlink_types::PoolKey;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool is full ({max_size} connections) and every entry is protected")]
    CapacityExceeded { max_size: usize },

    #[error("no pooled connection for {0}")]
    UnknownKey(PoolKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("pool max_size must be at least 1")]
    ZeroPoolSize,

    #[error("pool sweep_interval_secs must be at least 1")]
    ZeroSweepInterval,
}
