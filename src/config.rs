// Copyright 2024-2026 GG-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Pool configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `GG_DEVMEM_*` environment variables. The result is validated before it is
//! handed to [`MemPool::new`](crate::memory::MemPool::new); nothing here is
//! process-global.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::MemoryProperties;

/// Environment variable overriding `pool_size`.
pub const ENV_POOL_SIZE: &str = "GG_DEVMEM_POOL_SIZE";
/// Environment variable overriding `page_count`.
pub const ENV_PAGE_COUNT: &str = "GG_DEVMEM_PAGE_COUNT";
/// Environment variable overriding `alignment`.
pub const ENV_ALIGNMENT: &str = "GG_DEVMEM_ALIGNMENT";
/// Environment variable overriding `clean_interval_ms`.
pub const ENV_CLEAN_INTERVAL_MS: &str = "GG_DEVMEM_CLEAN_INTERVAL_MS";

/// Default number of pages per pool.
pub const DEFAULT_PAGE_COUNT: usize = 1;

/// Errors while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a device memory pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Total bytes reserved by the pool, split evenly across pages.
    pub pool_size: u64,
    /// Number of pages reserved eagerly at construction.
    pub page_count: usize,
    /// Properties the backing memory type must have.
    pub memory_properties: MemoryProperties,
    /// Allocation granularity. Defaults to the device's buffer/image
    /// granularity when unset.
    pub alignment: Option<u64>,
    /// Period of the background clean worker.
    pub clean_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 64 * 1024 * 1024, // 64 MiB
            page_count: DEFAULT_PAGE_COUNT,
            memory_properties: MemoryProperties::default(),
            alignment: None,
            clean_interval_ms: 250,
        }
    }
}

impl PoolConfig {
    /// Bytes per page.
    pub fn page_size(&self) -> u64 {
        if self.page_count == 0 {
            return 0;
        }
        self.pool_size / self.page_count as u64
    }

    pub fn clean_interval(&self) -> Duration {
        Duration::from_millis(self.clean_interval_ms)
    }

    /// Check the configuration for values the pool cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_count == 0 {
            return Err(ConfigError::Invalid("page_count must be at least 1".into()));
        }
        if self.page_size() == 0 {
            return Err(ConfigError::Invalid(format!(
                "pool_size {} is too small for {} pages",
                self.pool_size, self.page_count
            )));
        }
        if self.alignment == Some(0) {
            return Err(ConfigError::Invalid("alignment must be at least 1".into()));
        }
        if self.memory_properties.is_empty() {
            return Err(ConfigError::Invalid("memory_properties must not be empty".into()));
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_POOL_SIZE) {
            self.pool_size = parse_env(ENV_POOL_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_PAGE_COUNT) {
            self.page_count = parse_env(ENV_PAGE_COUNT, &v)?;
        }
        if let Some(v) = lookup(ENV_ALIGNMENT) {
            self.alignment = Some(parse_env(ENV_ALIGNMENT, &v)?);
        }
        if let Some(v) = lookup(ENV_CLEAN_INTERVAL_MS) {
            self.clean_interval_ms = parse_env(ENV_CLEAN_INTERVAL_MS, &v)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Load configuration from defaults, an optional file and the environment.
pub fn load(path: Option<&Path>) -> Result<PoolConfig, ConfigError> {
    load_with_env(path, |var| std::env::var(var).ok())
}

/// Same as [`load`] with an explicit environment lookup.
pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<PoolConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            tracing::debug!(path = %path.display(), "loading pool config");
            PoolConfig::from_toml_str(&text)?
        }
        None => PoolConfig::default(),
    };
    config.apply_env(lookup)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
