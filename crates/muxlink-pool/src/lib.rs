//! Bounded pool of terminal connections
//!
//! Connections are keyed by container and session; the window index is a
//! mutable attribute of the entry. Capacity is enforced by evicting the
//! least recently used entry before inserting, and an [`IdleSweeper`]
//! periodically drops entries nobody has touched for a while. One key may be
//! marked active, which protects it from both.

mod config;
mod error;
mod pool;
mod sweeper;

pub use config::PoolConfig;
pub use error::{ConfigError, PoolError};
pub use pool::ConnectionPool;
pub use sweeper::IdleSweeper;
