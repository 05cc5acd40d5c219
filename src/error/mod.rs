//! Error types
//!
//! One `thiserror` enum per concern: configuration validation, the store
//! connection primitive, pooling, registry lookups and serialization.

pub mod types;

pub use types::{
    ConfigurationError, ConnectError, LookupError, PoolError, SerializationError, StoreError,
    StoreResult,
};
