use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::constants::{
    DEFAULT_CACHE_COST_LIMIT, DEFAULT_POOL_MAX_IDLE_PER_HOST, DEFAULT_REQUEST_TIMEOUT_SECS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub request_timeout: u64,

    /// Idle connections kept alive per host.
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Total byte budget for cached images.
    #[serde(default = "default_max_cost")]
    pub max_cost: u64,
}

impl LoaderConfig {
    /// Load a configuration from a TOML file. Missing sections and fields
    /// fall back to their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("Failed to read config file")?;

        let config: LoaderConfig =
            toml::from_str(&contents).context("Failed to parse config file")?;

        debug!("Config loaded from {:?}", path);
        Ok(config)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_timeout(),
            pool_max_idle_per_host: default_pool_max_idle(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cost: default_max_cost(),
        }
    }
}

// Default value functions
fn default_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_pool_max_idle() -> usize {
    DEFAULT_POOL_MAX_IDLE_PER_HOST
}
fn default_max_cost() -> u64 {
    DEFAULT_CACHE_COST_LIMIT
}
