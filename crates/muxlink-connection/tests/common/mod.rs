//! In-process websocket server speaking the terminal endpoint layout

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use muxlink_types::TerminalTarget;

/// What the server observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Opened(TerminalTarget),
    Text(String),
    Binary(Vec<u8>),
    Closed(Option<u16>),
}

enum Outbound {
    Frame(Message),
    /// Drop the socket without a closing handshake
    Abort,
}

#[derive(Clone)]
struct ServerState {
    events: mpsc::UnboundedSender<ServerEvent>,
    clients: Arc<Mutex<Vec<mpsc::UnboundedSender<Outbound>>>>,
    accepts: Arc<AtomicUsize>,
}

pub struct TestServer {
    pub base_url: String,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    clients: Arc<Mutex<Vec<mpsc::UnboundedSender<Outbound>>>>,
    accepts: Arc<AtomicUsize>,
}

impl TestServer {
    pub async fn start() -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let clients = Arc::new(Mutex::new(Vec::new()));
        let accepts = Arc::new(AtomicUsize::new(0));
        let state = ServerState {
            events: events_tx,
            clients: clients.clone(),
            accepts: accepts.clone(),
        };

        let app = Router::new()
            .route("/ws/terminal/:container/:session/:window", get(ws_handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            events,
            clients,
            accepts,
        }
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    /// Send a frame to the most recently opened socket
    pub fn push(&self, message: Message) {
        let clients = self.clients.lock().unwrap();
        let latest = clients.last().expect("no client connected");
        let _ = latest.send(Outbound::Frame(message));
    }

    pub fn push_text(&self, text: &str) {
        self.push(Message::Text(text.to_string()));
    }

    pub fn push_binary(&self, bytes: &[u8]) {
        self.push(Message::Binary(bytes.to_vec()));
    }

    /// Kill every open socket without a close frame
    pub fn abort_all(&self) {
        for client in self.clients.lock().unwrap().drain(..) {
            let _ = client.send(Outbound::Abort);
        }
    }

    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("server event channel closed")
    }

    /// Next event, if one arrives within `wait`
    pub async fn try_next_event(&mut self, wait: Duration) -> Option<ServerEvent> {
        tokio::time::timeout(wait, self.events.recv()).await.ok().flatten()
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((container, session, window)): Path<(String, String, u32)>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    let target = TerminalTarget::new(container, session, window);
    ws.on_upgrade(move |socket| handle_socket(socket, state, target))
}

async fn handle_socket(socket: WebSocket, state: ServerState, target: TerminalTarget) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.accepts.fetch_add(1, Ordering::SeqCst);
    state.clients.lock().unwrap().push(tx);
    let _ = state.events.send(ServerEvent::Opened(target));

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Frame(message)) => {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Abort) | None => return,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = state.events.send(ServerEvent::Text(text));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = state.events.send(ServerEvent::Binary(bytes));
                }
                Some(Ok(Message::Close(frame))) => {
                    let _ = state.events.send(ServerEvent::Closed(frame.map(|f| f.code)));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => {
                    let _ = state.events.send(ServerEvent::Closed(None));
                    break;
                }
            }
        }
    }
}

/// Poll `condition` until it holds or five seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
