//! Application runner
//!
//! Registers the configured stores, reports pool health periodically and
//! closes every pool on shutdown.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;

use super::context::{AppContext, Registrar};
use crate::config::Settings;
use crate::services::{PoolStats, StoreConnector};

/// Main application struct
pub struct App {
    settings: Settings,
    context: AppContext,
}

impl App {
    /// Connect every configured store
    pub async fn new(settings: Settings, connector: Arc<dyn StoreConnector>) -> Result<Self> {
        tracing::debug!(stores = settings.stores.len(), "Initializing application context");

        let context = Registrar::new(connector)
            .with_diagnostics(tracing::dispatcher::get_default(|d| d.clone()))
            .register_all(settings.store_configurations())
            .await
            .context("Store registration failed")?;

        Ok(Self { settings, context })
    }

    /// Log health once and return it
    pub fn check(&self) -> Vec<PoolStats> {
        let stats = self.context.stats();
        for pool in &stats {
            report(pool);
        }
        stats
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run_with_graceful_shutdown(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Report pool health every interval until `shutdown` completes, then
    /// close every pool
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            stores = self.context.registry().len(),
            default = %self.context.default_client().name(),
            "Store hub running"
        );

        match self.settings.health_report_interval() {
            Some(period) => {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // the first tick completes immediately
                ticker.tick().await;

                tokio::pin!(shutdown);
                loop {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = ticker.tick() => {
                            self.check();
                        }
                    }
                }
            }
            None => shutdown.await,
        }

        self.cleanup().await
    }

    async fn cleanup(&self) -> Result<()> {
        tracing::info!(
            uptime_secs = self.context.uptime().as_secs(),
            "Closing store pools"
        );

        let timeout = self.settings.shutdown_timeout();
        tokio::time::timeout(timeout, self.context.shutdown())
            .await
            .with_context(|| format!("Pools did not close within {:?}", timeout))
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

fn report(pool: &PoolStats) {
    if pool.is_healthy() {
        tracing::info!(
            pool = %pool.name,
            healthy = pool.healthy,
            reconnecting = pool.reconnecting,
            failed = pool.failed,
            unavailable_hits = pool.unavailable_hits,
            "Pool health"
        );
    } else {
        tracing::warn!(
            pool = %pool.name,
            total = pool.total,
            reconnecting = pool.reconnecting,
            failed = pool.failed,
            "Pool has no healthy connection"
        );
    }
}

/// Create a future that completes when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
