//! Client registry
//!
//! Built once from the connected pools, read-only afterwards. This is the
//! only lookup surface consumers use: by name, or the default.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::Dispatch;

use super::client::{Client, Database};
use super::pool::{ConnectionPool, PoolManager, PoolStats};
use super::serializer::Serializer;
use crate::error::LookupError;

pub struct ClientRegistry {
    clients: HashMap<String, Arc<Client>>,
    default_name: Option<String>,
}

impl ClientRegistry {
    /// One client per pool, keyed by configuration name.
    ///
    /// Pool managers log health diagnostics to `diagnostics`; `None` keeps
    /// them silent.
    pub fn new(
        pools: Vec<ConnectionPool>,
        serializer: Arc<dyn Serializer>,
        diagnostics: Option<&Dispatch>,
    ) -> Self {
        let mut clients = HashMap::with_capacity(pools.len());
        let mut default_name = None;

        for pool in pools {
            let name = pool.name().to_string();
            if pool.configuration().is_default {
                default_name = Some(name.clone());
            }

            let manager = Arc::new(PoolManager::new(pool, diagnostics));
            clients.insert(name, Arc::new(Client::new(manager, serializer.clone())));
        }

        Self {
            clients,
            default_name,
        }
    }

    /// Every registered client, in no particular order
    pub fn get_all_clients(&self) -> Vec<Arc<Client>> {
        self.clients.values().cloned().collect()
    }

    pub fn get_default_client(&self) -> Result<Arc<Client>, LookupError> {
        let name = self.default_name.as_deref().ok_or(LookupError::NoDefault)?;
        self.clients
            .get(name)
            .cloned()
            .ok_or(LookupError::NoDefault)
    }

    /// Look a client up by exact name; `None` or `""` means the default.
    pub fn get_client(&self, name: Option<&str>) -> Result<Arc<Client>, LookupError> {
        match name {
            None | Some("") => self.get_default_client(),
            Some(name) => self
                .clients
                .get(name)
                .cloned()
                .ok_or_else(|| LookupError::NotFound(name.to_string())),
        }
    }

    pub fn get_default_database(&self) -> Result<Database, LookupError> {
        Ok(self.get_default_client()?.get_default_database())
    }

    /// Default database view of the named client, same resolution as
    /// [`get_client`](Self::get_client)
    pub fn get_database(&self, name: Option<&str>) -> Result<Database, LookupError> {
        Ok(self.get_client(name)?.get_default_database())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    pub fn names(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Health of every pool, sorted by name
    pub fn stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<PoolStats> = self.clients.values().map(|c| c.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Close every pool
    pub async fn close_all(&self) {
        join_all(self.clients.values().map(|client| client.manager().close())).await;
        tracing::info!(pools = self.clients.len(), "All store pools closed");
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.names())
            .field("default_name", &self.default_name)
            .finish()
    }
}
