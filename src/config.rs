//! # Configuration
//!
//! Process configuration comes from environment variables; upstream service
//! definitions come from a layered config file (see [`ServicesConfig::load`]).

use crate::constants::queue;
use crate::error::{CatalogError, Result};
use crate::services::banner::BannerSchoolConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub database_url: String,
    /// Only a local deployment may run destructive reloads
    pub local: bool,
    pub bind_address: String,
    pub max_connections: u32,
    pub services_config_path: String,
    pub scheduler: SchedulerConfig,
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DB_CONN")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CatalogError::configuration("DB_CONN must be set"))?;

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().map_err(|e| {
                CatalogError::configuration(format!("Invalid DB_MAX_CONNECTIONS: {e}"))
            })?,
            None => 10,
        };

        Ok(Self {
            database_url,
            local: lookup("LOCAL").as_deref() == Some("true"),
            bind_address: lookup("SYNC_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            max_connections,
            services_config_path: lookup("SERVICES_CONFIG")
                .unwrap_or_else(|| "config/services".to_string()),
            scheduler: SchedulerConfig::default(),
        })
    }
}

/// Job queue polling parameters
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub queue_name: String,
    pub visibility_timeout: Duration,
    pub batch_size: i32,
    pub poll_timeout: Duration,
    pub poll_interval: Duration,
    pub max_read_count: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_name: queue::COLLECTION_JOBS_QUEUE.to_string(),
            visibility_timeout: queue::VISIBILITY_TIMEOUT,
            batch_size: queue::READ_BATCH_SIZE,
            poll_timeout: queue::POLL_TIMEOUT,
            poll_interval: queue::POLL_INTERVAL,
            max_read_count: queue::MAX_READ_COUNT,
        }
    }
}

/// Upstream service definitions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub banner: Vec<BannerSchoolConfig>,
}

impl ServicesConfig {
    /// Load from `path` (extension picks the format) with
    /// `CATALOG_SERVICES__*` environment overrides layered on top.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CATALOG_SERVICES").separator("__"))
            .build()
            .map_err(|e| CatalogError::configuration(format!("Failed to read {path}: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| CatalogError::configuration(format!("Invalid services config: {e}")))
    }
}
