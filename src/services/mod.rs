//! Services module
//!
//! Configuration validation, connection pooling and the client registry.

pub mod client;
pub mod connection;
pub mod pool;
pub mod registry;
pub mod serializer;
pub mod validator;

pub use client::{Client, Database};
pub use connection::{
    MemoryConnector, ProfiledOperation, Profiler, ProfilingHook, StoreConnector, StoreHandle,
    TcpConnector,
};
pub use pool::{
    ConnectionPool, ConnectionState, ConnectionWrapperFactory, HealthAwareConnection,
    HealthAwareWrapperFactory, LoadBalanceStrategy, PoolManager, PoolStats, PooledConnection,
    RandomSelection, RoundRobin, SelectionStrategy, StateAwareConnection,
};
pub use registry::ClientRegistry;
pub use serializer::{JsonSerializer, Serializer};
pub use validator::validate_configurations;
