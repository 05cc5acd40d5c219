//! Error types for configuration, pooling and lookup

use std::time::Duration;

use thiserror::Error;

use crate::services::pool::ConnectionState;

/// Errors raised while validating the set of store configurations.
///
/// All of them are fatal: registration stops before any pool is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Empty configuration: at least one store configuration is required")]
    Empty,

    #[error("Configuration name must be unique: '{0}' is declared more than once")]
    DuplicateName(String),

    #[error(
        "There is more than one default configuration ('{first}' and '{second}'). Only one default configuration is allowed"
    )]
    MultipleDefaults { first: String, second: String },

    #[error("There is no default configuration. At least one default configuration is required")]
    NoDefault,
}

/// Failure of the store connection primitive
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Invalid endpoint address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to connect to {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connecting to {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("Connection to {address} refused: {reason}")]
    Refused { address: String, reason: String },
}

/// Errors raised by connection pools and pool managers
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Pool size must be greater than 0 (configuration '{name}' has {size})")]
    PoolSize { name: String, size: usize },

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Connection {index} of pool '{pool}' is {state}")]
    Unavailable {
        pool: String,
        index: usize,
        state: ConnectionState,
    },
}

impl PoolError {
    /// Whether a later selection may succeed where this one failed
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::Unavailable { .. })
    }
}

/// Registry lookup failures. Local to a single call, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("No store client is registered under the name '{0}'")]
    NotFound(String),

    #[error("The registry has no default client")]
    NoDefault,
}

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Failed to serialize value: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to deserialize value: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Umbrella error returned by the registration surface
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid store configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl From<ConnectError> for StoreError {
    fn from(err: ConnectError) -> Self {
        StoreError::Pool(PoolError::Connect(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
