//! Pool manager
//!
//! Answers "give me a usable connection now" for every client call. Selection
//! is an index computation plus a health-tag read: it never blocks and never
//! locks the connection array.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::Dispatch;

use super::pool::ConnectionPool;
use super::state::{ConnectionState, StateAwareConnection};
use super::strategy::SelectionStrategy;
use crate::error::PoolError;
use crate::services::connection::StoreHandle;

// ============================================================================
// Pooled Connection
// ============================================================================

/// A connection handed out by [`PoolManager::get_connection`]
#[derive(Debug, Clone)]
pub struct PooledConnection {
    index: usize,
    handle: Arc<dyn StoreHandle>,
    connection: Arc<dyn StateAwareConnection>,
}

impl PooledConnection {
    /// Position of the connection in its pool
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn handle(&self) -> &Arc<dyn StoreHandle> {
        &self.handle
    }

    /// Tell the connection its session dropped
    pub fn report_failure(&self) {
        self.connection.report_failure();
    }
}

// ============================================================================
// Pool Manager
// ============================================================================

pub struct PoolManager {
    pool: ConnectionPool,
    connections: Vec<Arc<dyn StateAwareConnection>>,
    strategy: Box<dyn SelectionStrategy>,
    diagnostics: Dispatch,
    unavailable_hits: AtomicU64,
}

impl PoolManager {
    /// Wrap the pool's connections and select with the configured strategy
    pub fn new(pool: ConnectionPool, diagnostics: Option<&Dispatch>) -> Self {
        let strategy = pool.configuration().load_balance.build();
        Self::with_strategy(pool, strategy, diagnostics)
    }

    pub fn with_strategy(
        pool: ConnectionPool,
        strategy: Box<dyn SelectionStrategy>,
        diagnostics: Option<&Dispatch>,
    ) -> Self {
        let connections = pool.initialize(diagnostics);
        Self {
            pool,
            connections,
            strategy,
            diagnostics: diagnostics.cloned().unwrap_or_else(Dispatch::none),
            unavailable_hits: AtomicU64::new(0),
        }
    }

    /// Select a connection for one request.
    ///
    /// A non-healthy pick fails this call only; the strategy is not rewound
    /// and the next caller may land on a healthy connection.
    pub fn get_connection(&self) -> Result<PooledConnection, PoolError> {
        let index = match self.connections.len() {
            1 => 0,
            len => self.strategy.next_index(len) % len,
        };
        let connection = &self.connections[index];

        match connection.acquire() {
            Some(handle) => Ok(PooledConnection {
                index,
                handle,
                connection: connection.clone(),
            }),
            None => Err(self.unavailable(index, connection.state())),
        }
    }

    fn unavailable(&self, index: usize, state: ConnectionState) -> PoolError {
        let hits = self.unavailable_hits.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::dispatcher::with_default(&self.diagnostics, || {
            tracing::warn!(
                pool = %self.name(),
                index,
                state = %state,
                hits,
                "Selected connection is unavailable"
            )
        });

        PoolError::Unavailable {
            pool: self.name().to_string(),
            index,
            state,
        }
    }

    pub fn name(&self) -> &str {
        self.pool.name()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn connections(&self) -> &[Arc<dyn StateAwareConnection>] {
        &self.connections
    }

    pub fn pool_size(&self) -> usize {
        self.connections.len()
    }

    /// Count of healthy connections
    pub fn healthy_count(&self) -> usize {
        self.count_in(ConnectionState::Healthy)
    }

    fn count_in(&self, state: ConnectionState) -> usize {
        self.connections.iter().filter(|c| c.state() == state).count()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.name().to_string(),
            total: self.connections.len(),
            healthy: self.count_in(ConnectionState::Healthy),
            reconnecting: self.count_in(ConnectionState::Reconnecting),
            failed: self.count_in(ConnectionState::Failed),
            unavailable_hits: self.unavailable_hits.load(Ordering::Relaxed),
            strategy: self.strategy.name(),
        }
    }

    /// Stop background recovery and close every physical connection
    pub async fn close(&self) {
        for connection in &self.connections {
            connection.shutdown();
        }
        self.pool.close().await;
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("name", &self.name())
            .field("connections", &self.connections)
            .field("strategy", &self.strategy)
            .finish()
    }
}

// ============================================================================
// Pool Statistics
// ============================================================================

/// Point-in-time health of one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub total: usize,
    pub healthy: usize,
    pub reconnecting: usize,
    pub failed: usize,
    /// Selections that landed on a non-healthy connection
    pub unavailable_hits: u64,
    pub strategy: &'static str,
}

impl PoolStats {
    /// At least one connection can serve requests
    pub fn is_healthy(&self) -> bool {
        self.healthy > 0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointOptions, StoreConfiguration};
    use crate::services::connection::MemoryConnector;
    use crate::services::pool::{HealthAwareConnection, RoundRobin};
    use crate::utils::retry::presets;
    use crate::utils::RetryConfig;
    use std::time::Duration;

    async fn manager(pool_size: usize) -> PoolManager {
        let connector = MemoryConnector::new();
        let config = StoreConfiguration::new("cache", EndpointOptions::default())
            .as_default()
            .with_pool_size(pool_size);
        let pool = ConnectionPool::connect(config, &connector).await.unwrap();
        PoolManager::new(pool, None)
    }

    /// Wrap a slot in a connection whose state the test controls
    fn fail_slot(manager: &mut PoolManager, index: usize) {
        let handle = manager.pool.handles()[index].clone();
        let conn = HealthAwareConnection::new(handle, presets::no_retry(), Dispatch::none());
        conn.mark_failed();
        manager.connections[index] = conn as Arc<dyn StateAwareConnection>;
    }

    #[tokio::test]
    async fn test_round_robin_sequence() {
        let manager = manager(3).await;
        let picks: Vec<usize> = (0..4)
            .map(|_| manager.get_connection().unwrap().index())
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn test_single_connection_always_selected() {
        let manager = manager(1).await;
        for _ in 0..3 {
            assert_eq!(manager.get_connection().unwrap().index(), 0);
        }
    }

    #[tokio::test]
    async fn test_single_failed_connection_surfaces_error() {
        let mut manager = manager(1).await;
        fail_slot(&mut manager, 0);

        let err = manager.get_connection().unwrap_err();
        assert!(matches!(
            err,
            PoolError::Unavailable {
                index: 0,
                state: ConnectionState::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_slot_fails_only_its_caller() {
        let mut manager = manager(3).await;
        fail_slot(&mut manager, 1);

        assert_eq!(manager.get_connection().unwrap().index(), 0);
        assert!(manager.get_connection().is_err());
        assert_eq!(manager.get_connection().unwrap().index(), 2);
        assert_eq!(manager.get_connection().unwrap().index(), 0);

        let stats = manager.stats();
        assert_eq!(stats.unavailable_hits, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.healthy, 2);
        assert!(stats.is_healthy());
    }

    #[tokio::test]
    async fn test_custom_strategy() {
        #[derive(Debug)]
        struct AlwaysLast;

        impl SelectionStrategy for AlwaysLast {
            fn next_index(&self, len: usize) -> usize {
                len - 1
            }

            fn name(&self) -> &'static str {
                "always_last"
            }
        }

        let connector = MemoryConnector::new();
        let config = StoreConfiguration::new("cache", EndpointOptions::default()).with_pool_size(4);
        let pool = ConnectionPool::connect(config, &connector).await.unwrap();
        let manager = PoolManager::with_strategy(pool, Box::new(AlwaysLast), None);

        assert_eq!(manager.get_connection().unwrap().index(), 3);
        assert_eq!(manager.stats().strategy, "always_last");
    }

    #[tokio::test]
    async fn test_out_of_range_strategy_index_wraps() {
        #[derive(Debug)]
        struct PastTheEnd;

        impl SelectionStrategy for PastTheEnd {
            fn next_index(&self, len: usize) -> usize {
                len + 1
            }

            fn name(&self) -> &'static str {
                "past_the_end"
            }
        }

        let connector = MemoryConnector::new();
        let config = StoreConfiguration::new("cache", EndpointOptions::default()).with_pool_size(3);
        let pool = ConnectionPool::connect(config, &connector).await.unwrap();
        let manager = PoolManager::with_strategy(pool, Box::new(PastTheEnd), None);

        assert_eq!(manager.get_connection().unwrap().index(), 1);
    }

    #[tokio::test]
    async fn test_reconnecting_slot_is_unavailable() {
        let connector = MemoryConnector::new();
        let config = StoreConfiguration::new("cache", EndpointOptions::default()).with_pool_size(2);
        let pool = ConnectionPool::connect(config, &connector).await.unwrap();
        let mut manager = PoolManager::new(pool, None);
        connector.refuse_reconnects(true);

        let slow = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(60))
            .with_jitter(false);
        let conn = HealthAwareConnection::new(manager.pool.handles()[1].clone(), slow, Dispatch::none());
        conn.report_failure();
        manager.connections[1] = conn as Arc<dyn StateAwareConnection>;

        assert_eq!(manager.get_connection().unwrap().index(), 0);
        let err = manager.get_connection().unwrap_err();
        assert!(matches!(
            err,
            PoolError::Unavailable {
                index: 1,
                state: ConnectionState::Reconnecting,
                ..
            }
        ));
        assert!(err.is_transient());

        let stats = manager.stats();
        assert_eq!(stats.reconnecting, 1);
        assert_eq!(stats.unavailable_hits, 1);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_concurrent_selection_is_fair() {
        let connector = MemoryConnector::new();
        let config = StoreConfiguration::new("cache", EndpointOptions::default()).with_pool_size(4);
        let pool = ConnectionPool::connect(config, &connector).await.unwrap();
        let manager = Arc::new(PoolManager::with_strategy(pool, Box::new(RoundRobin::new()), None));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    let mut counts = [0usize; 4];
                    for _ in 0..250 {
                        counts[manager.get_connection().unwrap().index()] += 1;
                    }
                    counts
                })
            })
            .collect();

        let mut totals = [0usize; 4];
        for task in tasks {
            for (slot, count) in task.await.unwrap().iter().enumerate() {
                totals[slot] += count;
            }
        }
        assert_eq!(totals, [500, 500, 500, 500]);
    }

    #[tokio::test]
    async fn test_close_closes_handles() {
        let manager = manager(2).await;
        manager.close().await;
        assert_eq!(manager.pool().connected_count(), 0);
        assert_eq!(manager.pool_size(), 2);
    }
}
