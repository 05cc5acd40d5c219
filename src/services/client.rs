//! Store clients and database views
//!
//! A [`Client`] is bound to one pool manager and the shared serializer. It
//! hands out [`Database`] views that carry a database index and a key prefix
//! on top of the same pool.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::pool::{PoolManager, PoolStats, PooledConnection};
use super::serializer::Serializer;
use crate::error::{PoolError, SerializationError};

/// Client for one named store configuration
pub struct Client {
    manager: Arc<PoolManager>,
    serializer: Arc<dyn Serializer>,
}

impl Client {
    pub fn new(manager: Arc<PoolManager>, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            manager,
            serializer,
        }
    }

    pub fn name(&self) -> &str {
        self.manager.name()
    }

    pub fn is_default(&self) -> bool {
        self.manager.pool().configuration().is_default
    }

    pub fn manager(&self) -> &Arc<PoolManager> {
        &self.manager
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    pub fn stats(&self) -> PoolStats {
        self.manager.stats()
    }

    /// View on the configured database with the configured key prefix
    pub fn get_default_database(&self) -> Database {
        let configuration = self.manager.pool().configuration();
        self.get_database(configuration.database, Some(&configuration.key_prefix))
    }

    /// View on any database index of the same endpoint
    pub fn get_database(&self, number: u32, key_prefix: Option<&str>) -> Database {
        Database {
            manager: self.manager.clone(),
            serializer: self.serializer.clone(),
            number,
            key_prefix: key_prefix.unwrap_or_default().to_string(),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name())
            .field("is_default", &self.is_default())
            .field("serializer", &self.serializer.name())
            .finish()
    }
}

/// A logical database on a client's pool
#[derive(Clone)]
pub struct Database {
    manager: Arc<PoolManager>,
    serializer: Arc<dyn Serializer>,
    number: u32,
    key_prefix: String,
}

impl Database {
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Name of the client this view belongs to
    pub fn client_name(&self) -> &str {
        self.manager.name()
    }

    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Select a connection for one operation
    pub fn connection(&self) -> Result<PooledConnection, PoolError> {
        self.manager.get_connection()
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        let value = serde_json::to_value(value).map_err(SerializationError::Serialize)?;
        self.serializer.serialize(&value)
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        let value = self.serializer.deserialize(bytes)?;
        serde_json::from_value(value).map_err(SerializationError::Deserialize)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("client", &self.client_name())
            .field("number", &self.number)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}
