use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use muxlink_connection::{
    channel_sinks, probe_address, ConnectionHandle, NetworkMonitor, ProbeGuard, TerminalEvent,
};
use muxlink_pool::{ConnectionPool, IdleSweeper};
use muxlink_types::{PoolKey, TerminalTarget};

use crate::config::AppConfig;

/// A pooled, connected terminal plus the background services around it
pub struct OpenTerminal {
    pub pool: ConnectionPool,
    pub key: PoolKey,
    pub handle: ConnectionHandle,
    pub events: mpsc::UnboundedReceiver<TerminalEvent>,
    sweeper: IdleSweeper,
    probe: ProbeGuard,
}

impl OpenTerminal {
    /// Pool `target`, mark it active and connect it
    pub async fn open(config: &AppConfig, target: &TerminalTarget) -> Result<Self> {
        let network = NetworkMonitor::new();
        let probe_addr = probe_address(&config.base_url).context("Invalid base URL")?;
        let probe = network.spawn_probe(
            probe_addr,
            config.network.probe_interval(),
            config.network.probe_timeout(),
        );

        let pool = ConnectionPool::new(config.pool.clone(), config.connection.clone(), network)
            .context("Invalid pool configuration")?;
        let sweeper = pool.start_sweeper();

        let key = pool.ensure(target)?;
        pool.set_active(Some(key.clone()));
        let handle = pool.connection(&key)?;

        let (tx, events) = channel_sinks();
        let sink = Arc::new(tx);
        handle
            .connect(&config.base_url, target.clone(), sink.clone(), sink)
            .await
            .with_context(|| format!("Failed to connect to {}", target))?;
        info!(%key, %target, "Terminal ready");

        Ok(Self {
            pool,
            key,
            handle,
            events,
            sweeper,
            probe,
        })
    }

    /// Record activity on this terminal so the idle sweep leaves it alone
    pub fn touch(&self) {
        self.pool.touch(&self.key);
    }

    /// Stop background services and close every pooled connection
    pub async fn close(self) {
        self.sweeper.stop().await;
        self.pool.shutdown();
        self.probe.stop().await;
    }
}
