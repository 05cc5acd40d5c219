//! Configuration module
//!
//! Store configurations and application settings.

pub mod settings;
pub mod store;

pub use settings::{Environment, Settings, DEFAULT_CONFIG_FILE};
pub use store::{
    EndpointOptions, ReconnectSettings, StoreConfiguration, StoreEntry, DEFAULT_POOL_SIZE,
};
