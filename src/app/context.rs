//! Registration and application context
//!
//! [`Registrar`] turns store configurations into an [`AppContext`]: validate,
//! connect every pool, build the registry. The context is passed explicitly
//! to whatever needs a client; there is no process-wide instance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::Dispatch;

use crate::config::StoreConfiguration;
use crate::error::StoreResult;
use crate::services::{
    validate_configurations, Client, ClientRegistry, ConnectionPool, Database, JsonSerializer,
    PoolStats, Serializer, StoreConnector,
};

// ============================================================================
// Registrar
// ============================================================================

/// Builds an [`AppContext`] from store configurations
pub struct Registrar {
    connector: Arc<dyn StoreConnector>,
    serializer: Arc<dyn Serializer>,
    diagnostics: Option<Dispatch>,
}

impl Registrar {
    /// Registrar using the JSON serializer and no diagnostic sink
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            serializer: Arc::new(JsonSerializer),
            diagnostics: None,
        }
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Route connection health diagnostics to `dispatch`
    pub fn with_diagnostics(mut self, dispatch: Dispatch) -> Self {
        self.diagnostics = Some(dispatch);
        self
    }

    /// Register a single store; it becomes the default
    pub async fn register(&self, configuration: StoreConfiguration) -> StoreResult<AppContext> {
        self.register_all(vec![configuration]).await
    }

    /// Validate, connect and register every store.
    ///
    /// Nothing is connected when validation fails. Pools are connected in
    /// order; if one fails the pools built before it are closed and the
    /// error is returned.
    pub async fn register_all(
        &self,
        mut configurations: Vec<StoreConfiguration>,
    ) -> StoreResult<AppContext> {
        let default_name = validate_configurations(&mut configurations)?;

        tracing::info!(
            stores = configurations.len(),
            default = %default_name,
            "Registering stores"
        );

        let mut pools: Vec<ConnectionPool> = Vec::with_capacity(configurations.len());
        for configuration in configurations {
            match ConnectionPool::connect(configuration, self.connector.as_ref()).await {
                Ok(pool) => pools.push(pool),
                Err(err) => {
                    for pool in &pools {
                        pool.close().await;
                    }
                    return Err(err.into());
                }
            }
        }

        let registry = Arc::new(ClientRegistry::new(
            pools,
            self.serializer.clone(),
            self.diagnostics.as_ref(),
        ));
        let context = AppContext::from_registry(registry).await?;

        tracing::info!(
            stores = context.registry.len(),
            default = %context.default_client.name(),
            "Store registration complete"
        );

        Ok(context)
    }
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("serializer", &self.serializer.name())
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

// ============================================================================
// Application Context
// ============================================================================

/// Everything registration produced
///
/// Cheap to clone; every clone shares the same registry.
#[derive(Debug, Clone)]
pub struct AppContext {
    registry: Arc<ClientRegistry>,
    default_client: Arc<Client>,
    default_database: Database,
    started_at: DateTime<Utc>,
    start_time: Instant,
}

impl AppContext {
    /// Resolve the default client; a registry without one is closed
    async fn from_registry(registry: Arc<ClientRegistry>) -> StoreResult<Self> {
        let default_client = match registry.get_default_client() {
            Ok(client) => client,
            Err(err) => {
                registry.close_all().await;
                return Err(err.into());
            }
        };
        let default_database = default_client.get_default_database();

        Ok(Self {
            registry,
            default_client,
            default_database,
            started_at: Utc::now(),
            start_time: Instant::now(),
        })
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn default_client(&self) -> &Arc<Client> {
        &self.default_client
    }

    pub fn default_database(&self) -> &Database {
        &self.default_database
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        self.registry.stats()
    }

    /// Close every pool of the registry
    pub async fn shutdown(&self) {
        self.registry.close_all().await;
    }
}
