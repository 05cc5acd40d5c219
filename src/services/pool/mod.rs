//! Connection pooling
//!
//! This module owns the physical connections of each store configuration and
//! hands them out per request.
//!
//! # Features
//! - Eager, all-or-nothing pool construction
//! - Pluggable health-aware wrappers around each physical connection
//! - Lock-free connection selection (round-robin by default)
//! - Per-pool health statistics
//!
//! # Example
//! ```ignore
//! let pool = ConnectionPool::connect(configuration, &TcpConnector::new()).await?;
//! let manager = PoolManager::new(pool, None);
//!
//! let conn = manager.get_connection()?;
//! println!("Using connection {}", conn.index());
//! ```

mod manager;
#[allow(clippy::module_inception)]
mod pool;
mod state;
mod strategy;

pub use manager::{PoolManager, PoolStats, PooledConnection};
pub use pool::ConnectionPool;
pub use state::{
    ConnectionState, ConnectionWrapperFactory, HealthAwareConnection, HealthAwareWrapperFactory,
    StateAwareConnection,
};
pub use strategy::{LoadBalanceStrategy, RandomSelection, RoundRobin, SelectionStrategy};
