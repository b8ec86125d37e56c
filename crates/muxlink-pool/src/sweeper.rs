use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::pool::ConnectionPool;

/// Background task that evicts idle pool entries on a fixed period
///
/// Dropping the sweeper cancels the task.
#[derive(Debug)]
pub struct IdleSweeper {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl IdleSweeper {
    /// First sweep runs one `interval` from now
    pub fn start(pool: ConnectionPool, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let removed = pool.sweep_idle();
                debug!(removed = removed.len(), remaining = pool.len(), "Idle sweep");
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop sweeping and wait for the task to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for IdleSweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
