//! storehub
//!
//! Connects the configured key-value stores, keeps their connection pools
//! healthy and reports on them until shut down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use storehub::{
    app::App,
    config::{Environment, Settings},
    services::{MemoryConnector, StoreConnector, TcpConnector},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// storehub
///
/// Named, pooled connections to remote key-value stores.
#[derive(Parser, Debug)]
#[command(name = "storehub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (overrides STOREHUB_CONFIG, default: storehub.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error (overrides settings)
    #[arg(long)]
    log_level: Option<String>,

    /// Environment: dev, staging, prod (overrides settings)
    #[arg(short, long)]
    env: Option<Environment>,

    /// Use in-process stores instead of opening network connections
    #[arg(long)]
    dry_run: bool,

    /// Connect every store, print pool health as JSON and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (before logging, so we can use log_level)
    let mut settings = Settings::load(args.config.as_deref())?;

    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }
    if let Some(env) = args.env {
        settings.environment = env;
    }

    init_tracing(&settings.log_level, settings.is_production());

    tracing::info!(
        app_name = %settings.app_name,
        version = %settings.app_version,
        environment = %settings.environment,
        stores = settings.stores.len(),
        dry_run = args.dry_run,
        "Starting application"
    );

    let connector: Arc<dyn StoreConnector> = if args.dry_run {
        Arc::new(MemoryConnector::new())
    } else {
        Arc::new(TcpConnector::new())
    };

    let app = App::new(settings, connector).await?;

    if args.check {
        let stats = app.check();
        println!("{}", serde_json::to_string_pretty(&stats)?);
        app.context().shutdown().await;
        if !stats.iter().all(|pool| pool.is_healthy()) {
            anyhow::bail!("At least one store has no healthy connection");
        }
        return Ok(());
    }

    app.run_with_graceful_shutdown().await?;

    tracing::info!("Application shutdown complete");

    Ok(())
}

/// Initialize tracing subscriber with the specified log level
///
/// `RUST_LOG` takes precedence. Production logs are JSON, everything else is
/// human readable.
fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let console_layer = if json {
        fmt::layer().json().with_filter(filter).boxed()
    } else {
        fmt::layer().with_target(false).with_filter(filter).boxed()
    };

    tracing_subscriber::registry().with(console_layer).init();
}
