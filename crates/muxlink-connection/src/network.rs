use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Whether the network path to the server is usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Available,
    Unavailable,
}

/// Current connectivity plus the number of unavailable-to-available
/// transitions seen so far
///
/// Watch channels only keep the latest value, so a quick drop and recovery
/// could otherwise be missed entirely; the counter still records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub connectivity: Connectivity,
    pub restorations: u64,
}

/// Publishes connectivity changes to every subscribed connection
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<NetworkSnapshot>>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    /// Monitor that starts out assuming the network is available
    pub fn new() -> Self {
        Self::with_initial(Connectivity::Available)
    }

    pub fn with_initial(connectivity: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(NetworkSnapshot {
            connectivity,
            restorations: 0,
        });
        Self { tx: Arc::new(tx) }
    }

    /// Record the current connectivity; repeated values are ignored
    pub fn set(&self, connectivity: Connectivity) {
        let changed = self.tx.send_if_modified(|snapshot| {
            if snapshot.connectivity == connectivity {
                return false;
            }
            if connectivity == Connectivity::Available {
                snapshot.restorations += 1;
            }
            snapshot.connectivity = connectivity;
            true
        });
        if changed {
            info!(?connectivity, "Network connectivity changed");
        }
    }

    pub fn current(&self) -> Connectivity {
        self.tx.borrow().connectivity
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> NetworkSubscription {
        NetworkSubscription(self.tx.subscribe())
    }

    /// Derive connectivity from periodic TCP connects to `addr`
    ///
    /// The probe runs until the returned guard is stopped or dropped.
    pub fn spawn_probe(&self, addr: String, interval: Duration, timeout: Duration) -> ProbeGuard {
        let cancel = CancellationToken::new();
        let monitor = self.clone();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let reachable = matches!(
                    tokio::time::timeout(timeout, TcpStream::connect(&addr)).await,
                    Ok(Ok(_))
                );
                debug!(%addr, reachable, "Network probe");
                monitor.set(if reachable {
                    Connectivity::Available
                } else {
                    Connectivity::Unavailable
                });
            }
        });

        ProbeGuard {
            cancel,
            handle: Some(handle),
        }
    }
}

/// Receiving side of a [`NetworkMonitor`]
#[derive(Debug, Clone)]
pub struct NetworkSubscription(watch::Receiver<NetworkSnapshot>);

impl NetworkSubscription {
    pub fn current(&self) -> NetworkSnapshot {
        *self.0.borrow()
    }

    pub(crate) fn into_receiver(self) -> watch::Receiver<NetworkSnapshot> {
        self.0
    }
}

/// Keeps a connectivity probe alive
#[derive(Debug)]
pub struct ProbeGuard {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProbeGuard {
    /// Stop the probe and wait for it to finish
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
