use thiserror::Error;

/// Errors raised by a terminal connection
///
/// Only `InvalidEndpoint`, `TransportOpen` and `Cancelled` are ever returned
/// to a caller. The other variants end up as the connection's last error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to open {url}: {reason}")]
    TransportOpen { url: String, reason: String },

    #[error("transport error: {0}")]
    TransportIo(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection attempt was superseded")]
    Cancelled,

    #[error("connection has been released by its pool")]
    Released,
}
