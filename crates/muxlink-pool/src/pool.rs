use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use muxlink_connection::{ConnectionConfig, ConnectionHandle, NetworkMonitor, TerminalConnection};
use muxlink_types::{PoolKey, TerminalTarget};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::error::{ConfigError, PoolError};
use crate::sweeper::IdleSweeper;

struct PoolEntry {
    connection: TerminalConnection,
    target: TerminalTarget,
    last_accessed: Instant,
    /// Insertion order, for breaking LRU ties
    seq: u64,
}

struct PoolState {
    entries: HashMap<PoolKey, PoolEntry>,
    active_key: Option<PoolKey>,
    next_seq: u64,
}

impl PoolState {
    /// Least recently used entry that is not the active one
    fn lru_victim(&self) -> Option<PoolKey> {
        self.entries
            .iter()
            .filter(|(key, _)| self.active_key.as_ref() != Some(*key))
            .min_by_key(|(_, entry)| (entry.last_accessed, entry.seq))
            .map(|(key, _)| key.clone())
    }

    fn remove(&mut self, key: &PoolKey) -> Option<TerminalConnection> {
        let entry = self.entries.remove(key)?;
        if self.active_key.as_ref() == Some(key) {
            self.active_key = None;
        }
        Some(entry.connection)
    }
}

struct Inner {
    config: PoolConfig,
    connection_config: ConnectionConfig,
    network: NetworkMonitor,
    state: Mutex<PoolState>,
}

/// Registry of live terminal connections
///
/// Cloning is cheap; clones share the same entries. The pool is the only
/// owner of its connections, callers get [`ConnectionHandle`]s.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ConnectionPool")
            .field("max_size", &self.inner.config.max_size)
            .field("entries", &state.entries.len())
            .field("active_key", &state.active_key)
            .finish()
    }
}

impl ConnectionPool {
    pub fn new(
        config: PoolConfig,
        connection_config: ConnectionConfig,
        network: NetworkMonitor,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                connection_config,
                network,
                state: Mutex::new(PoolState {
                    entries: HashMap::new(),
                    active_key: None,
                    next_seq: 0,
                }),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Make sure a connection exists for `target` and return its key
    ///
    /// An existing entry only has its window index updated and its access
    /// time refreshed. A new entry starts disconnected; when the pool is full
    /// the least recently used unprotected entry is evicted first.
    pub fn ensure(&self, target: &TerminalTarget) -> Result<PoolKey, PoolError> {
        let key = target.key();
        let now = Instant::now();

        let evicted = {
            let mut state = self.lock();

            if let Some(entry) = state.entries.get_mut(&key) {
                if entry.target.window_index != target.window_index {
                    debug!(%key, from = entry.target.window_index, to = target.window_index, "Window changed");
                    entry.target.window_index = target.window_index;
                }
                entry.last_accessed = now;
                return Ok(key);
            }

            let mut evicted = None;
            if state.entries.len() >= self.inner.config.max_size {
                let victim = state.lru_victim().ok_or(PoolError::CapacityExceeded {
                    max_size: self.inner.config.max_size,
                })?;
                info!(key = %victim, "Evicting least recently used connection");
                evicted = state.remove(&victim);
            }

            let connection = TerminalConnection::new(
                self.inner.connection_config.clone(),
                self.inner.network.subscribe(),
            );
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.insert(
                key.clone(),
                PoolEntry {
                    connection,
                    target: target.clone(),
                    last_accessed: now,
                    seq,
                },
            );
            info!(%key, size = state.entries.len(), "Pooled new connection");
            evicted
        };

        if let Some(connection) = evicted {
            connection.shutdown();
        }
        Ok(key)
    }

    /// Refresh the access time of `key`, at most once per debounce window
    pub fn touch(&self, key: &PoolKey) {
        let now = Instant::now();
        let debounce = self.inner.config.touch_debounce();
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            if now.duration_since(entry.last_accessed) >= debounce {
                entry.last_accessed = now;
            }
        }
    }

    /// Protect `key` from LRU and idle eviction, or clear the protection
    pub fn set_active(&self, key: Option<PoolKey>) {
        debug!(key = ?key.as_ref().map(ToString::to_string), "Active connection changed");
        self.lock().active_key = key;
    }

    pub fn active_key(&self) -> Option<PoolKey> {
        self.lock().active_key.clone()
    }

    /// Remove `key` even if it is active; returns whether it was pooled
    pub fn evict(&self, key: &PoolKey) -> bool {
        let removed = self.lock().remove(key);
        match removed {
            Some(connection) => {
                info!(%key, "Evicted connection");
                connection.shutdown();
                true
            }
            None => false,
        }
    }

    /// Drop every unprotected entry idle for longer than the timeout
    pub fn sweep_idle(&self) -> Vec<PoolKey> {
        let now = Instant::now();
        let idle_timeout = self.inner.config.idle_timeout();

        let removed: Vec<(PoolKey, TerminalConnection)> = {
            let mut state = self.lock();
            let stale: Vec<PoolKey> = state
                .entries
                .iter()
                .filter(|(key, entry)| {
                    state.active_key.as_ref() != Some(*key)
                        && now.duration_since(entry.last_accessed) > idle_timeout
                })
                .map(|(key, _)| key.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|key| state.remove(&key).map(|connection| (key, connection)))
                .collect()
        };

        let mut keys = Vec::with_capacity(removed.len());
        for (key, connection) in removed {
            info!(%key, "Evicted idle connection");
            connection.shutdown();
            keys.push(key);
        }
        keys
    }

    /// Start the periodic idle sweep at the configured interval
    pub fn start_sweeper(&self) -> IdleSweeper {
        IdleSweeper::start(self.clone(), self.inner.config.sweep_interval())
    }

    pub fn connection(&self, key: &PoolKey) -> Result<ConnectionHandle, PoolError> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.connection.handle())
            .ok_or_else(|| PoolError::UnknownKey(key.clone()))
    }

    pub fn window_index(&self, key: &PoolKey) -> Result<u32, PoolError> {
        self.target(key).map(|target| target.window_index)
    }

    /// Last target ensured for `key`
    pub fn target(&self, key: &PoolKey) -> Result<TerminalTarget, PoolError> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.target.clone())
            .ok_or_else(|| PoolError::UnknownKey(key.clone()))
    }

    pub fn contains(&self, key: &PoolKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Pooled keys, sorted
    pub fn keys(&self) -> Vec<PoolKey> {
        let mut keys: Vec<PoolKey> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shut down and drop every pooled connection
    pub fn shutdown(&self) {
        let drained: Vec<(PoolKey, PoolEntry)> = {
            let mut state = self.lock();
            state.active_key = None;
            state.entries.drain().collect()
        };
        if !drained.is_empty() {
            info!(count = drained.len(), "Shutting down connection pool");
        }
        for (_, entry) in drained {
            entry.connection.shutdown();
        }
    }
}
