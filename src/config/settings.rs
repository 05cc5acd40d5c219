//! Application settings
//!
//! Layered as: built-in defaults, then an optional TOML file, then
//! `STOREHUB__*` environment variables (`.env` is loaded first).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::store::{StoreConfiguration, StoreEntry};

/// File read when neither `--config` nor `STOREHUB_CONFIG` is given
pub const DEFAULT_CONFIG_FILE: &str = "storehub.toml";

const CONFIG_PATH_VAR: &str = "STOREHUB_CONFIG";
const ENV_PREFIX: &str = "STOREHUB";

/// Application environment
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!(
                "Invalid environment: {}. Expected: development, staging, or production",
                s
            ),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub app_name: String,
    #[serde(skip_deserializing)]
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    /// Seconds between pool health reports, 0 disables them
    pub health_report_interval_secs: u64,
    /// Upper bound on closing every pool at shutdown
    pub shutdown_timeout_secs: u64,

    pub stores: Vec<StoreEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "storehub".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::default(),
            log_level: "info".to_string(),
            health_report_interval_secs: 30,
            shutdown_timeout_secs: 10,
            stores: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from the given file (or the default locations) and the
    /// environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let (file, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match std::env::var(CONFIG_PATH_VAR) {
                Ok(path) => (PathBuf::from(path), true),
                Err(_) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
            },
        };

        let config = config::Config::builder()
            .add_source(config::File::from(file.as_path()).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read settings from {}", file.display()))?;

        let mut settings: Settings = config
            .try_deserialize()
            .context("Invalid settings")?;
        settings.app_version = env!("CARGO_PKG_VERSION").to_string();

        settings.validate()?;

        tracing::debug!(
            file = %file.display(),
            stores = settings.stores.len(),
            "Settings loaded"
        );

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            anyhow::bail!("log_level cannot be empty");
        }

        for (index, entry) in self.stores.iter().enumerate() {
            entry.validate().with_context(|| {
                format!("Invalid store entry #{} ('{}')", index, entry.name)
            })?;
        }

        if self.environment == Environment::Production {
            for entry in &self.stores {
                if entry.endpoint.host == "localhost" || entry.endpoint.host == "127.0.0.1" {
                    tracing::warn!(
                        store = %entry.name,
                        "Store points at a loopback address in production"
                    );
                }
            }
        }

        Ok(())
    }

    /// Runtime configurations for every `[[stores]]` entry, in file order
    pub fn store_configurations(&self) -> Vec<StoreConfiguration> {
        self.stores.iter().cloned().map(StoreConfiguration::from).collect()
    }

    pub fn health_report_interval(&self) -> Option<Duration> {
        match self.health_report_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}
