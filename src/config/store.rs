//! Named store configurations
//!
//! [`StoreConfiguration`] is the runtime form handed to the registration
//! surface. [`StoreEntry`] is its serializable counterpart read from the
//! settings file.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::connection::ProfilingHook;
use crate::services::pool::{ConnectionWrapperFactory, HealthAwareWrapperFactory, LoadBalanceStrategy};
use crate::utils::RetryConfig;

/// Default number of physical connections per configuration
pub const DEFAULT_POOL_SIZE: usize = 5;

// ============================================================================
// Endpoint Options
// ============================================================================

/// Parameters for reaching one store endpoint
///
/// Opaque to pooling; only the connector interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct EndpointOptions {
    #[validate(length(min = 1, message = "host must not be empty"))]
    pub host: String,

    #[validate(range(min = 1, message = "port must be greater than 0"))]
    pub port: u16,

    /// Connect deadline in milliseconds, 0 disables it
    pub connect_timeout_ms: u64,

    /// Disable Nagle's algorithm on the session socket
    pub nodelay: bool,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            connect_timeout_ms: 5_000,
            nodelay: true,
        }
    }
}

impl EndpointOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Store Configuration
// ============================================================================

/// One named profile describing how to reach a store endpoint
#[derive(Clone)]
pub struct StoreConfiguration {
    /// Unique name; a UUID is assigned during validation when empty
    pub name: String,
    /// Resolved by default lookups
    pub is_default: bool,
    /// Number of physical connections, must be at least 1
    pub pool_size: usize,
    pub endpoint: EndpointOptions,
    /// Database index used by the client's default database view
    pub database: u32,
    /// Prefix applied to keys by database views
    pub key_prefix: String,
    /// How the pool manager picks a connection
    pub load_balance: LoadBalanceStrategy,
    /// Attached to every physical connection when set
    pub profiling_hook: Option<ProfilingHook>,
    /// Turns a physical handle into a health-aware connection
    pub wrapper_factory: Arc<dyn ConnectionWrapperFactory>,
}

impl Default for StoreConfiguration {
    fn default() -> Self {
        Self {
            name: String::new(),
            is_default: false,
            pool_size: DEFAULT_POOL_SIZE,
            endpoint: EndpointOptions::default(),
            database: 0,
            key_prefix: String::new(),
            load_balance: LoadBalanceStrategy::default(),
            profiling_hook: None,
            wrapper_factory: Arc::new(HealthAwareWrapperFactory::default()),
        }
    }
}

impl StoreConfiguration {
    pub fn new(name: impl Into<String>, endpoint: EndpointOptions) -> Self {
        Self {
            name: name.into(),
            endpoint,
            ..Default::default()
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_load_balance(mut self, strategy: LoadBalanceStrategy) -> Self {
        self.load_balance = strategy;
        self
    }

    pub fn with_profiling_hook(mut self, hook: ProfilingHook) -> Self {
        self.profiling_hook = Some(hook);
        self
    }

    pub fn with_wrapper_factory(mut self, factory: Arc<dyn ConnectionWrapperFactory>) -> Self {
        self.wrapper_factory = factory;
        self
    }
}

impl fmt::Debug for StoreConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfiguration")
            .field("name", &self.name)
            .field("is_default", &self.is_default)
            .field("pool_size", &self.pool_size)
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("key_prefix", &self.key_prefix)
            .field("load_balance", &self.load_balance)
            .field("profiling_hook", &self.profiling_hook.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Configuration Structures (for deserialization)
// ============================================================================

/// Reconnect backoff as written in the settings file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
        }
    }
}

impl From<&ReconnectSettings> for RetryConfig {
    fn from(settings: &ReconnectSettings) -> Self {
        RetryConfig::new()
            .with_max_retries(settings.max_retries)
            .with_initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .with_max_delay(Duration::from_millis(settings.max_delay_ms))
    }
}

/// A `[[stores]]` entry of the settings file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct StoreEntry {
    pub name: String,
    pub is_default: bool,
    pub pool_size: usize,
    #[validate(nested)]
    pub endpoint: EndpointOptions,
    pub database: u32,
    pub key_prefix: String,
    pub load_balance: LoadBalanceStrategy,
    pub reconnect: ReconnectSettings,
}

impl Default for StoreEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            is_default: false,
            pool_size: DEFAULT_POOL_SIZE,
            endpoint: EndpointOptions::default(),
            database: 0,
            key_prefix: String::new(),
            load_balance: LoadBalanceStrategy::default(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl From<StoreEntry> for StoreConfiguration {
    fn from(entry: StoreEntry) -> Self {
        let factory = HealthAwareWrapperFactory::new(RetryConfig::from(&entry.reconnect));
        StoreConfiguration {
            name: entry.name,
            is_default: entry.is_default,
            pool_size: entry.pool_size,
            endpoint: entry.endpoint,
            database: entry.database,
            key_prefix: entry.key_prefix,
            load_balance: entry.load_balance,
            profiling_hook: None,
            wrapper_factory: Arc::new(factory),
        }
    }
}
