use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use muxlink_protocol::{decode, CommandSink, ControlCommand, Decoded};
use muxlink_types::TerminalTarget;

use crate::config::ConnectionConfig;
use crate::endpoint::terminal_url;
use crate::error::ConnectionError;
use crate::network::{NetworkSnapshot, NetworkSubscription};
use crate::sink::{ControlSink, DataSink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle phase of a terminal connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time view of a connection, for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub id: Uuid,
    pub phase: ConnectionPhase,
    /// Why the last session ended, including a clean close by the server
    pub last_error: Option<String>,
    pub target: Option<TerminalTarget>,
    pub was_ever_connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct Sinks {
    data: Arc<dyn DataSink>,
    control: Arc<dyn ControlSink>,
}

/// Handles of one open websocket session
struct Session {
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Session {
    /// Stop both pumps. The writer is left to emit the closing frame.
    fn close(self) {
        self.cancel.cancel();
        if let Some(reader) = self.reader {
            reader.abort();
        }
        drop(self.writer);
    }
}

/// Everything mutable about a connection; only touched under `Shared::state`
struct State {
    phase: ConnectionPhase,
    last_error: Option<String>,
    endpoint: Option<String>,
    target: Option<TerminalTarget>,
    sinks: Option<Sinks>,
    was_ever_connected: bool,
    connected_at: Option<DateTime<Utc>>,
    /// Cleared by a manual disconnect, set again by the next connect
    auto_reconnect: bool,
    /// Bumped whenever the current session is replaced or torn down
    generation: u64,
    session: Option<Session>,
    reconnect_ticket: u64,
    pending_reconnect: Option<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
    network: Option<NetworkSubscription>,
    shut_down: bool,
}

impl State {
    fn reconnect_eligible(&self) -> bool {
        self.was_ever_connected
            && self.auto_reconnect
            && !self.shut_down
            && matches!(
                self.phase,
                ConnectionPhase::Disconnected | ConnectionPhase::Failed
            )
            && self.endpoint.is_some()
            && self.target.is_some()
            && self.sinks.is_some()
    }
}

struct Shared {
    id: Uuid,
    config: ConnectionConfig,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> ConnectionStatus {
        let state = self.lock();
        ConnectionStatus {
            id: self.id,
            phase: state.phase,
            last_error: state.last_error.clone(),
            target: state.target.clone(),
            was_ever_connected: state.was_ever_connected,
            connected_at: state.connected_at,
        }
    }

    async fn connect(
        self: &Arc<Self>,
        endpoint: String,
        target: TerminalTarget,
        sinks: Sinks,
    ) -> Result<(), ConnectionError> {
        let (generation, url, outbound_rx, cancel) = {
            let mut state = self.lock();
            if state.shut_down {
                return Err(ConnectionError::Released);
            }
            self.teardown(&mut state);

            state.endpoint = Some(endpoint.clone());
            state.target = Some(target.clone());
            state.sinks = Some(sinks.clone());
            state.auto_reconnect = true;

            let url = match terminal_url(&endpoint, &target) {
                Ok(url) => url,
                Err(e) => {
                    warn!(connection_id = %self.id, error = %e, "Cannot build terminal endpoint");
                    state.phase = ConnectionPhase::Failed;
                    state.last_error = Some(e.to_string());
                    return Err(e);
                }
            };

            // Frames sent while the socket opens are queued here
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let cancel = CancellationToken::new();
            state.phase = ConnectionPhase::Connecting;
            state.last_error = None;
            state.session = Some(Session {
                outbound: outbound_tx,
                cancel: cancel.clone(),
                reader: None,
                writer: None,
            });
            self.start_watcher(&mut state);

            (state.generation, url, outbound_rx, cancel)
        };

        info!(connection_id = %self.id, %url, "Connecting terminal");

        let stream = match connect_async(url.clone()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                let error = ConnectionError::TransportOpen {
                    url,
                    reason: e.to_string(),
                };
                self.fail_session(generation, &error);
                return Err(error);
            }
        };

        let mut state = self.lock();
        if state.generation != generation || state.shut_down {
            debug!(connection_id = %self.id, "Dropping superseded terminal socket");
            return Err(ConnectionError::Cancelled);
        }

        let (ws_sink, ws_stream) = stream.split();
        let weak = Arc::downgrade(self);
        let writer = tokio::spawn(write_loop(
            weak.clone(),
            generation,
            ws_sink,
            outbound_rx,
            cancel.clone(),
            self.config.close_timeout(),
        ));
        let reader = tokio::spawn(read_loop(weak, generation, ws_stream, sinks, cancel));

        if let Some(session) = state.session.as_mut() {
            session.reader = Some(reader);
            session.writer = Some(writer);
        }
        state.phase = ConnectionPhase::Connected;
        state.was_ever_connected = true;
        state.connected_at = Some(Utc::now());
        info!(connection_id = %self.id, target = %target, "Terminal connected");
        Ok(())
    }

    /// Close the current session and any pending reconnection.
    fn teardown(&self, state: &mut State) {
        state.generation += 1;
        if let Some(pending) = state.pending_reconnect.take() {
            pending.abort();
        }
        if let Some(session) = state.session.take() {
            session.close();
        }
        state.phase = ConnectionPhase::Disconnected;
        state.connected_at = None;
    }

    fn disconnect(&self) {
        let mut state = self.lock();
        state.auto_reconnect = false;
        if state.session.is_none()
            && state.pending_reconnect.is_none()
            && state.phase == ConnectionPhase::Disconnected
        {
            return;
        }
        self.teardown(&mut state);
        info!(connection_id = %self.id, "Terminal disconnected");
    }

    fn shutdown(&self) {
        self.disconnect();
        let mut state = self.lock();
        state.shut_down = true;
        if let Some(watcher) = state.watcher.take() {
            watcher.abort();
        }
    }

    /// Record a mid-session failure, unless the session is already stale
    fn fail_session(&self, generation: u64, error: &ConnectionError) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        warn!(connection_id = %self.id, error = %error, "Terminal connection failed");
        state.phase = ConnectionPhase::Failed;
        state.last_error = Some(error.to_string());
        state.connected_at = None;
        if let Some(session) = state.session.take() {
            session.cancel.cancel();
        }
    }

    /// Record a clean close by the server, unless the session is already stale
    fn close_session(&self, generation: u64, reason: String) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        info!(connection_id = %self.id, %reason, "Terminal closed by server");
        state.phase = ConnectionPhase::Disconnected;
        state.last_error = Some(reason);
        state.connected_at = None;
        if let Some(session) = state.session.take() {
            session.cancel.cancel();
        }
    }

    fn send(&self, message: Message) {
        let mut state = self.lock();
        let delivered = match state.session.as_ref() {
            Some(session) => session.outbound.send(message).is_ok(),
            None => false,
        };
        if !delivered {
            debug!(connection_id = %self.id, phase = %state.phase, "Send without a session");
            // Keep the original error of an already failed session
            if state.phase != ConnectionPhase::Failed {
                state.phase = ConnectionPhase::Failed;
                state.last_error = Some(ConnectionError::NotConnected.to_string());
            }
        }
    }

    fn start_watcher(self: &Arc<Self>, state: &mut State) {
        if state.watcher.is_some() {
            return;
        }
        if let Some(network) = state.network.take() {
            let weak = Arc::downgrade(self);
            state.watcher = Some(tokio::spawn(watch_network(weak, network.into_receiver())));
        }
    }

    /// Arm a single delayed reconnection with the last known target
    fn schedule_reconnect(self: &Arc<Self>) {
        let mut state = self.lock();
        if !state.reconnect_eligible() {
            debug!(connection_id = %self.id, phase = %state.phase, "Network back; no reconnection needed");
            return;
        }
        if let Some(pending) = state.pending_reconnect.take() {
            pending.abort();
        }
        state.reconnect_ticket += 1;
        let ticket = state.reconnect_ticket;
        let delay = self.config.reconnect_delay();
        info!(connection_id = %self.id, ?delay, "Network back; scheduling reconnection");

        let weak = Arc::downgrade(self);
        state.pending_reconnect = Some(tokio::spawn(reconnect_after(weak, ticket, delay)));
    }
}

async fn reconnect_after(shared: Weak<Shared>, ticket: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let (endpoint, target, sinks) = {
        let mut state = shared.lock();
        if state.reconnect_ticket != ticket || !state.reconnect_eligible() {
            return;
        }
        // Detach ourselves so the connect below does not abort this task
        state.pending_reconnect = None;
        match (&state.endpoint, &state.target, &state.sinks) {
            (Some(endpoint), Some(target), Some(sinks)) => {
                (endpoint.clone(), target.clone(), sinks.clone())
            }
            _ => return,
        }
    };

    info!(connection_id = %shared.id, target = %target, "Reconnecting terminal");
    if let Err(e) = shared.connect(endpoint, target, sinks).await {
        warn!(connection_id = %shared.id, error = %e, "Reconnection failed");
    }
}

async fn watch_network(shared: Weak<Shared>, mut network: watch::Receiver<NetworkSnapshot>) {
    let mut seen = network.borrow_and_update().restorations;
    while network.changed().await.is_ok() {
        let snapshot = *network.borrow_and_update();
        if snapshot.restorations > seen {
            seen = snapshot.restorations;
            match shared.upgrade() {
                Some(shared) => shared.schedule_reconnect(),
                None => break,
            }
        }
    }
}

async fn read_loop(
    shared: Weak<Shared>,
    generation: u64,
    mut stream: SplitStream<WsStream>,
    sinks: Sinks,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => frame,
        };

        let failure = match frame {
            Some(Ok(Message::Binary(bytes))) => {
                sinks.data.on_data(bytes);
                continue;
            }
            Some(Ok(Message::Text(text))) => {
                match decode(&text) {
                    Decoded::Event(event) => sinks.control.on_control(event),
                    Decoded::Unrecognized(reason) => {
                        debug!(%reason, frame_len = text.len(), "Dropping control frame")
                    }
                }
                continue;
            }
            Some(Ok(Message::Close(Some(frame)))) if frame.code == CloseCode::Normal => {
                let reason = if frame.reason.is_empty() {
                    "closed by server".to_string()
                } else {
                    format!("closed by server: {}", frame.reason)
                };
                if let Some(shared) = shared.upgrade() {
                    shared.close_session(generation, reason);
                }
                break;
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| format!("closed by server ({}): {}", f.code, f.reason))
                    .unwrap_or_else(|| "closed by server".to_string());
                ConnectionError::TransportIo(reason)
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => ConnectionError::TransportIo(e.to_string()),
            None => ConnectionError::TransportIo("connection closed by server".to_string()),
        };

        if let Some(shared) = shared.upgrade() {
            shared.fail_session(generation, &failure);
        }
        break;
    }
}

async fn write_loop(
    shared: Weak<Shared>,
    generation: u64,
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
    close_timeout: Duration,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let close = Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                }));
                let _ = tokio::time::timeout(close_timeout, sink.send(close)).await;
                break;
            }
            message = outbound.recv() => {
                let Some(message) = message else { break };
                if let Err(e) = sink.send(message).await {
                    if let Some(shared) = shared.upgrade() {
                        shared.fail_session(generation, &ConnectionError::TransportIo(e.to_string()));
                    }
                    break;
                }
            }
        }
    }
}

/// One websocket session to a multiplexer window
///
/// The owner (normally a pool entry) controls its lifetime; everyone else
/// gets a [`ConnectionHandle`]. Dropping the connection shuts it down.
pub struct TerminalConnection {
    shared: Arc<Shared>,
}

impl fmt::Debug for TerminalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.shared.status();
        f.debug_struct("TerminalConnection")
            .field("id", &status.id)
            .field("phase", &status.phase)
            .field("target", &status.target)
            .finish()
    }
}

impl TerminalConnection {
    /// Create a disconnected connection that follows `network` for reconnection
    pub fn new(config: ConnectionConfig, network: NetworkSubscription) -> Self {
        let state = State {
            phase: ConnectionPhase::Disconnected,
            last_error: None,
            endpoint: None,
            target: None,
            sinks: None,
            was_ever_connected: false,
            connected_at: None,
            auto_reconnect: false,
            generation: 0,
            session: None,
            reconnect_ticket: 0,
            pending_reconnect: None,
            watcher: None,
            network: Some(network),
            shut_down: false,
        };
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                config,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Non-owning handle for views and controllers
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            id: self.shared.id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Open a session to `target`, replacing any current one
    pub async fn connect(
        &self,
        endpoint: &str,
        target: TerminalTarget,
        data_sink: Arc<dyn DataSink>,
        control_sink: Arc<dyn ControlSink>,
    ) -> Result<(), ConnectionError> {
        let sinks = Sinks {
            data: data_sink,
            control: control_sink,
        };
        self.shared.connect(endpoint.to_string(), target, sinks).await
    }

    /// Close the session with a normal closure; no-op when already closed
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Disconnect and stop following the network for good
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub fn send_text(&self, text: impl Into<String>) {
        self.shared.send(Message::Text(text.into()));
    }

    pub fn send_binary(&self, bytes: impl Into<Vec<u8>>) {
        self.shared.send(Message::Binary(bytes.into()));
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.shared.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == ConnectionPhase::Connected
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    pub fn target(&self) -> Option<TerminalTarget> {
        self.shared.lock().target.clone()
    }

    pub fn was_ever_connected(&self) -> bool {
        self.shared.lock().was_ever_connected
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }
}

impl CommandSink for TerminalConnection {
    fn send_command(&self, command: ControlCommand) {
        self.send_text(command.encode());
    }
}

impl Drop for TerminalConnection {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

/// Weak reference to a pooled connection
///
/// Every call is a no-op (or reports `Released`) once the owner has dropped
/// the connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    shared: Weak<Shared>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl ConnectionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.shared
            .upgrade()
            .map(|shared| !shared.lock().shut_down)
            .unwrap_or(false)
    }

    pub async fn connect(
        &self,
        endpoint: &str,
        target: TerminalTarget,
        data_sink: Arc<dyn DataSink>,
        control_sink: Arc<dyn ControlSink>,
    ) -> Result<(), ConnectionError> {
        let shared = self.shared.upgrade().ok_or(ConnectionError::Released)?;
        let sinks = Sinks {
            data: data_sink,
            control: control_sink,
        };
        shared.connect(endpoint.to_string(), target, sinks).await
    }

    pub fn disconnect(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.disconnect();
        }
    }

    pub fn send_text(&self, text: impl Into<String>) {
        match self.shared.upgrade() {
            Some(shared) => shared.send(Message::Text(text.into())),
            None => debug!(connection_id = %self.id, "Dropping frame for released connection"),
        }
    }

    pub fn send_binary(&self, bytes: impl Into<Vec<u8>>) {
        match self.shared.upgrade() {
            Some(shared) => shared.send(Message::Binary(bytes.into())),
            None => debug!(connection_id = %self.id, "Dropping frame for released connection"),
        }
    }

    /// Phase of the connection; `Disconnected` once released
    pub fn phase(&self) -> ConnectionPhase {
        self.shared
            .upgrade()
            .map(|shared| shared.lock().phase)
            .unwrap_or(ConnectionPhase::Disconnected)
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared
            .upgrade()
            .and_then(|shared| shared.lock().last_error.clone())
    }

    pub fn status(&self) -> Option<ConnectionStatus> {
        self.shared.upgrade().map(|shared| shared.status())
    }
}

impl CommandSink for ConnectionHandle {
    fn send_command(&self, command: ControlCommand) {
        self.send_text(command.encode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkMonitor;
    use crate::sink::channel_sinks;

    fn connection() -> TerminalConnection {
        TerminalConnection::new(ConnectionConfig::default(), NetworkMonitor::new().subscribe())
    }

    #[test]
    fn test_new_connection_is_idle() {
        let conn = connection();
        assert_eq!(conn.phase(), ConnectionPhase::Disconnected);
        assert!(!conn.was_ever_connected());
        assert_eq!(conn.last_error(), None);
        assert_eq!(conn.target(), None);
    }

    #[test]
    fn test_disconnect_when_idle_is_noop() {
        let conn = connection();
        conn.disconnect();
        conn.disconnect();
        assert_eq!(conn.phase(), ConnectionPhase::Disconnected);
        assert_eq!(conn.last_error(), None);
    }

    #[test]
    fn test_send_without_session_fails_quietly() {
        let conn = connection();
        conn.resize(80, 24);
        assert_eq!(conn.phase(), ConnectionPhase::Failed);
        assert_eq!(conn.last_error().as_deref(), Some("not connected"));
    }

    #[tokio::test]
    async fn test_invalid_endpoint_fails_fast() {
        let conn = connection();
        let (tx, _rx) = channel_sinks();
        let sink = Arc::new(tx);
        let err = conn
            .connect("not a url", TerminalTarget::new("c1", "s1", 0), sink.clone(), sink)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectionError::InvalidEndpoint { .. }));
        assert_eq!(conn.phase(), ConnectionPhase::Failed);
        assert!(conn.last_error().unwrap().contains("missing scheme"));
        assert!(!conn.was_ever_connected());
    }

    #[test]
    fn test_handle_is_weak() {
        let conn = connection();
        let handle = conn.handle();
        assert!(handle.is_alive());
        assert_eq!(handle.id(), conn.id());

        drop(conn);
        assert!(!handle.is_alive());
        assert_eq!(handle.phase(), ConnectionPhase::Disconnected);
        assert!(handle.status().is_none());
        handle.select_window(1);
        handle.disconnect();
    }

    #[test]
    fn test_shutdown_marks_handle_dead() {
        let conn = connection();
        let handle = conn.handle();
        conn.shutdown();
        assert!(!handle.is_alive());
    }
}
