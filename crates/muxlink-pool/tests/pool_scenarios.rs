use std::time::Duration;

use muxlink_connection::{ConnectionConfig, NetworkMonitor};
use muxlink_pool::{ConnectionPool, PoolConfig, PoolError};
use muxlink_types::{PoolKey, TerminalTarget};

fn small_pool() -> ConnectionPool {
    let config = PoolConfig {
        max_size: 2,
        idle_timeout_secs: 5,
        sweep_interval_secs: 10,
        touch_debounce_ms: 1000,
    };
    ConnectionPool::new(config, ConnectionConfig::default(), NetworkMonitor::new()).unwrap()
}

fn target(container: &str, session: &str, window: u32) -> TerminalTarget {
    TerminalTarget::new(container, session, window)
}

fn keys(names: &[(&str, &str)]) -> Vec<PoolKey> {
    let mut keys: Vec<PoolKey> = names.iter().map(|(c, s)| PoolKey::new(*c, *s)).collect();
    keys.sort();
    keys
}

async fn tick() {
    tokio::time::advance(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_lru_evicts_oldest_entry() {
    let pool = small_pool();
    pool.ensure(&target("c1", "s1", 0)).unwrap();
    tick().await;
    pool.ensure(&target("c2", "s2", 0)).unwrap();
    tick().await;
    pool.ensure(&target("c3", "s3", 0)).unwrap();

    assert_eq!(pool.keys(), keys(&[("c2", "s2"), ("c3", "s3")]));
}

#[tokio::test(start_paused = true)]
async fn test_active_key_survives_lru() {
    let pool = small_pool();
    let c1 = pool.ensure(&target("c1", "s1", 0)).unwrap();
    tick().await;
    pool.ensure(&target("c2", "s2", 0)).unwrap();
    tick().await;
    pool.set_active(Some(c1));
    pool.ensure(&target("c3", "s3", 0)).unwrap();

    assert_eq!(pool.keys(), keys(&[("c1", "s1"), ("c3", "s3")]));
}

#[tokio::test(start_paused = true)]
async fn test_lru_ties_break_by_insertion_order() {
    let pool = small_pool();
    pool.ensure(&target("c1", "s1", 0)).unwrap();
    pool.ensure(&target("c2", "s2", 0)).unwrap();
    pool.ensure(&target("c3", "s3", 0)).unwrap();

    assert_eq!(pool.keys(), keys(&[("c2", "s2"), ("c3", "s3")]));
}

#[tokio::test(start_paused = true)]
async fn test_window_switch_updates_entry_in_place() {
    let pool = small_pool();
    let first = pool.ensure(&target("c1", "s1", 0)).unwrap();
    let handle = pool.connection(&first).unwrap();
    let second = pool.ensure(&target("c1", "s1", 1)).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.to_string(), "c1-s1");
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.window_index(&first), Ok(1));
    assert_eq!(pool.connection(&second).unwrap().id(), handle.id());
}

#[tokio::test(start_paused = true)]
async fn test_idle_sweep_spares_active_key() {
    let pool = small_pool();
    let c1 = pool.ensure(&target("c1", "s1", 0)).unwrap();
    pool.ensure(&target("c2", "s2", 0)).unwrap();
    pool.set_active(Some(c1.clone()));

    let sweeper = pool.start_sweeper();
    tokio::time::sleep(Duration::from_secs(15)).await;

    assert_eq!(pool.keys(), vec![c1]);
    sweeper.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_sweep_without_candidates_is_noop() {
    let pool = small_pool();
    pool.ensure(&target("c1", "s1", 0)).unwrap();
    tokio::time::advance(Duration::from_secs(3)).await;

    assert!(pool.sweep_idle().is_empty());
    assert_eq!(pool.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_touch_keeps_entry_alive() {
    let pool = small_pool();
    let c1 = pool.ensure(&target("c1", "s1", 0)).unwrap();
    pool.ensure(&target("c2", "s2", 0)).unwrap();

    tokio::time::advance(Duration::from_secs(4)).await;
    pool.touch(&c1);
    tokio::time::advance(Duration::from_secs(2)).await;

    assert_eq!(pool.sweep_idle(), vec![PoolKey::new("c2", "s2")]);
    assert_eq!(pool.keys(), vec![c1]);
}

#[tokio::test(start_paused = true)]
async fn test_touch_is_debounced() {
    let pool = small_pool();
    let c1 = pool.ensure(&target("c1", "s1", 0)).unwrap();
    tick().await;
    pool.ensure(&target("c2", "s2", 0)).unwrap();
    tick().await;

    // Within a second of c1's refresh, so the touch is dropped
    pool.touch(&c1);
    pool.ensure(&target("c3", "s3", 0)).unwrap();

    assert_eq!(pool.keys(), keys(&[("c2", "s2"), ("c3", "s3")]));
}

#[tokio::test(start_paused = true)]
async fn test_capacity_with_only_protected_entries() {
    let config = PoolConfig {
        max_size: 1,
        ..PoolConfig::default()
    };
    let pool =
        ConnectionPool::new(config, ConnectionConfig::default(), NetworkMonitor::new()).unwrap();
    let c1 = pool.ensure(&target("c1", "s1", 0)).unwrap();
    pool.set_active(Some(c1.clone()));

    let err = pool.ensure(&target("c2", "s2", 0)).unwrap_err();
    assert_eq!(err, PoolError::CapacityExceeded { max_size: 1 });
    assert_eq!(pool.keys(), vec![c1]);
}

#[tokio::test(start_paused = true)]
async fn test_pool_never_exceeds_capacity() {
    let pool = small_pool();
    for i in 0..6 {
        pool.ensure(&target(&format!("c{}", i), "s", 0)).unwrap();
        assert!(pool.len() <= 2);
        tick().await;
    }
    assert_eq!(pool.keys(), keys(&[("c4", "s"), ("c5", "s")]));
}

#[tokio::test(start_paused = true)]
async fn test_evicted_connection_handle_goes_dead() {
    let pool = small_pool();
    let c1 = pool.ensure(&target("c1", "s1", 0)).unwrap();
    let handle = pool.connection(&c1).unwrap();
    tick().await;
    pool.ensure(&target("c2", "s2", 0)).unwrap();
    tick().await;
    pool.ensure(&target("c3", "s3", 0)).unwrap();

    assert!(!pool.contains(&c1));
    assert!(!handle.is_alive());
}
