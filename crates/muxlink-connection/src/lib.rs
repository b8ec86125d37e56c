//! Terminal connections over websocket
//!
//! A [`TerminalConnection`] owns one websocket session to a multiplexer
//! window: it opens the socket, pumps outbound frames, feeds inbound frames
//! to the data and control sinks, and reconnects once when connectivity
//! comes back after a loss.

mod config;
mod connection;
mod endpoint;
mod error;
mod network;
mod sink;

pub use config::ConnectionConfig;
pub use connection::{ConnectionHandle, ConnectionPhase, ConnectionStatus, TerminalConnection};
pub use endpoint::{probe_address, terminal_url};
pub use error::ConnectionError;
pub use network::{Connectivity, NetworkMonitor, NetworkSnapshot, NetworkSubscription, ProbeGuard};
pub use sink::{channel_sinks, ControlSink, DataSink, TerminalEvent};
