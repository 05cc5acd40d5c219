//! storehub
//!
//! Named, pooled connections to remote key-value stores. Configurations are
//! validated once, each one gets a fixed pool of eagerly opened connections,
//! and a registry hands out clients by name.

pub mod app;
pub mod config;
pub mod error;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::{App, AppContext, Registrar};
pub use config::{EndpointOptions, Settings, StoreConfiguration};
pub use error::{StoreError, StoreResult};
pub use services::{Client, ClientRegistry, Database};
