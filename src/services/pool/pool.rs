//! Connection pool for one store configuration
//!
//! The pool owns a fixed number of physical connections, all established
//! eagerly when the pool is built. It is never resized.

use std::sync::Arc;

use futures::future::join_all;
use tracing::Dispatch;

use super::state::StateAwareConnection;
use crate::config::StoreConfiguration;
use crate::error::PoolError;
use crate::services::connection::{StoreConnector, StoreHandle};

/// Fixed-size set of physical connections for one configuration
#[derive(Debug)]
pub struct ConnectionPool {
    configuration: StoreConfiguration,
    handles: Vec<Arc<dyn StoreHandle>>,
}

impl ConnectionPool {
    /// Connect every slot of the pool.
    ///
    /// Fails with [`PoolError::PoolSize`] before touching the network when the
    /// pool size is 0. The first connect failure aborts construction; handles
    /// opened up to that point are closed.
    pub async fn connect(
        configuration: StoreConfiguration,
        connector: &dyn StoreConnector,
    ) -> Result<Self, PoolError> {
        if configuration.pool_size < 1 {
            return Err(PoolError::PoolSize {
                name: configuration.name.clone(),
                size: configuration.pool_size,
            });
        }

        tracing::debug!(
            pool = %configuration.name,
            size = configuration.pool_size,
            endpoint = %configuration.endpoint.address(),
            "Connecting pool"
        );

        let mut handles: Vec<Arc<dyn StoreHandle>> = Vec::with_capacity(configuration.pool_size);
        for slot in 0..configuration.pool_size {
            let handle = match connector.connect(&configuration.endpoint).await {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::error!(
                        pool = %configuration.name,
                        slot,
                        error = %err,
                        "Store connection failed, aborting pool construction"
                    );
                    close_handles(&handles).await;
                    return Err(err.into());
                }
            };

            if let Some(hook) = &configuration.profiling_hook {
                handle.register_profiler(hook.clone());
            }
            handles.push(handle);
        }

        tracing::info!(
            pool = %configuration.name,
            size = handles.len(),
            "Pool connected"
        );

        Ok(Self {
            configuration,
            handles,
        })
    }

    /// Wrap every physical connection with the configured wrapper factory.
    ///
    /// Without a diagnostic sink the wrappers log nowhere.
    pub fn initialize(&self, diagnostics: Option<&Dispatch>) -> Vec<Arc<dyn StateAwareConnection>> {
        let sink = diagnostics.cloned().unwrap_or_else(Dispatch::none);
        self.handles
            .iter()
            .map(|handle| self.configuration.wrapper_factory.wrap(handle.clone(), &sink))
            .collect()
    }

    pub fn configuration(&self) -> &StoreConfiguration {
        &self.configuration
    }

    pub fn name(&self) -> &str {
        &self.configuration.name
    }

    pub fn pool_size(&self) -> usize {
        self.handles.len()
    }

    pub fn handles(&self) -> &[Arc<dyn StoreHandle>] {
        &self.handles
    }

    /// Number of handles whose session is currently up
    pub fn connected_count(&self) -> usize {
        self.handles.iter().filter(|h| h.is_connected()).count()
    }

    /// Close every physical connection
    pub async fn close(&self) {
        close_handles(&self.handles).await;
        tracing::debug!(pool = %self.configuration.name, "Pool closed");
    }
}

async fn close_handles(handles: &[Arc<dyn StoreHandle>]) {
    join_all(handles.iter().map(|handle| handle.close())).await;
}
