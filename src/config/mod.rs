//! Configuration management for the transaction coordinator.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Component-wise validation
mod cluster;
mod group;
mod monitoring;
mod offsets;
mod retry;
mod transaction;
pub use cluster::*;
pub use group::*;
pub use monitoring::*;
pub use offsets::*;
pub use retry::*;
pub use transaction::*;

#[cfg(test)]
mod config_test;

use std::env;
use std::fmt::Debug;
use std::path::Path;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

const ENV_PREFIX: &str = "TXN";

/// Main configuration container for a coordinator node
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with the `TXN__` prefix (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct CoordinatorConfig {
    /// Node identity, storage paths and the initial version view
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Transaction coordinator sharding and timeouts
    #[serde(default)]
    pub transaction: TransactionConfig,
    /// Consumer group session handling
    #[serde(default)]
    pub group: GroupConfig,
    /// Consumer offsets log layout
    #[serde(default)]
    pub offsets: OffsetsConfig,
    /// Retry policies for marker writes and log appends
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Debug for CoordinatorConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CoordinatorConfig")
            .field("cluster", &self.cluster)
            .field("transaction", &self.transaction)
            .finish()
    }
}

impl CoordinatorConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `TXN__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred to allow further overrides via `with_override_config()`.
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("TXN__TRANSACTION__NUM_SHARDS", "8");
    /// let cfg = CoordinatorConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// Consumes self and performs validation of all subsystems. Must be called
    /// after all configuration overrides.
    pub fn validate(self) -> Result<Self> {
        self.cluster.validate()?;
        self.transaction.validate()?;
        self.group.validate()?;
        self.offsets.validate()?;
        self.retry.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}

pub(super) fn invalid(msg: impl Into<String>) -> Error {
    Error::Config(ConfigError::Message(msg.into()))
}

/// Ensures directory path is valid and writable
pub(super) fn validate_directory(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(invalid(format!("{name} path cannot be empty")));
    }

    #[cfg(not(test))]
    {
        use std::fs;
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                invalid(format!(
                    "Failed to create {} directory at {}: {}",
                    name,
                    path.display(),
                    e
                ))
            })?;
        }

        let test_file = path.join(".permission_test");
        fs::write(&test_file, b"test").map_err(|e| {
            invalid(format!(
                "No write permission in {} directory {}: {}",
                name,
                path.display(),
                e
            ))
        })?;
        fs::remove_file(&test_file).ok();
    }

    Ok(())
}
