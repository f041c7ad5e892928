//! Configuration loading for the sync controller.
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. TOML file, when a path is given
//! 3. Environment variables: `SEED_SYNC_*`
//!
//! # Example Config
//!
//! ```toml
//! controller_name = "master-sync-controller"
//! finalizer = "seed-sync.io/cleanup-seed-copies"
//! workers = 4
//! target_namespace = "kubermatic"
//! store_timeout_ms = 10000
//!
//! [backoff]
//! base_delay_ms = 5
//! max_delay_ms = 1000000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "SEED_SYNC_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Name used in logs and recorded events.
    pub controller_name: String,
    /// Pre-delete marker this controller owns on master objects.
    pub finalizer: String,
    /// Number of concurrent reconcile workers.
    pub workers: usize,
    /// Namespace holding target descriptors. `None` watches every namespace.
    pub target_namespace: Option<String>,
    /// Timeout applied to every single store call.
    pub store_timeout_ms: u64,
    pub backoff: BackoffConfig,
}

/// Per-object requeue backoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            controller_name: "master-sync-controller".to_string(),
            finalizer: "seed-sync.io/cleanup-seed-copies".to_string(),
            workers: 4,
            target_namespace: None,
            store_timeout_ms: 10_000,
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5,
            max_delay_ms: 1_000_000,
        }
    }
}

impl BackoffConfig {
    /// Delay before the next retry of an object that failed `failures`
    /// times in a row: `base * 2^failures`, capped at `max`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 1_u64.checked_shl(failures).unwrap_or(u64::MAX);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

impl SyncConfig {
    /// The per-call store timeout.
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.trim().is_empty() {
            return Err(Error::invalid_config("controller_name must not be empty"));
        }
        if !is_qualified_finalizer(&self.finalizer) {
            return Err(Error::invalid_config(format!(
                "finalizer '{}' must be a qualified name like 'example.io/cleanup'",
                self.finalizer
            )));
        }
        if self.workers == 0 {
            return Err(Error::invalid_config("workers must be at least 1"));
        }
        if self.store_timeout_ms == 0 {
            return Err(Error::invalid_config("store_timeout_ms must be positive"));
        }
        if self.backoff.base_delay_ms == 0 {
            return Err(Error::invalid_config("backoff.base_delay_ms must be positive"));
        }
        if self.backoff.base_delay_ms > self.backoff.max_delay_ms {
            return Err(Error::invalid_config(
                "backoff.base_delay_ms must not exceed backoff.max_delay_ms",
            ));
        }
        if self
            .target_namespace
            .as_ref()
            .is_some_and(|ns| ns.trim().is_empty())
        {
            return Err(Error::invalid_config("target_namespace must not be blank"));
        }
        Ok(())
    }

    /// Apply `SEED_SYNC_*` overrides from the given variables.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if a numeric override does not parse.
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field {
                "CONTROLLER_NAME" => self.controller_name = value,
                "FINALIZER" => self.finalizer = value,
                "WORKERS" => self.workers = parse_number(&key, &value)?,
                "TARGET_NAMESPACE" => {
                    self.target_namespace = Some(value).filter(|ns| !ns.is_empty());
                }
                "STORE_TIMEOUT_MS" => self.store_timeout_ms = parse_number(&key, &value)?,
                "BACKOFF_BASE_MS" => self.backoff.base_delay_ms = parse_number(&key, &value)?,
                "BACKOFF_MAX_MS" => self.backoff.max_delay_ms = parse_number(&key, &value)?,
                _ => tracing::debug!(key = %key, "Ignoring unknown configuration override"),
            }
        }
        Ok(())
    }
}

/// Load configuration from all sources with hierarchy.
///
/// # Errors
///
/// Returns error if:
/// - The given config file cannot be read or is malformed TOML
/// - An environment override does not parse
/// - The merged values fail validation
pub fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    let mut config = match path {
        Some(path) => load_toml_file(path)?,
        None => SyncConfig::default(),
    };

    config.apply_env_overrides(std::env::vars())?;
    config.validate()?;

    Ok(config)
}

/// Load a TOML file; missing keys take their defaults.
fn load_toml_file(path: &Path) -> Result<SyncConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config_load(path, format!("failed to read file: {e}")))?;

    toml::from_str(&content).map_err(|e| Error::config_load(path, format!("failed to parse: {e}")))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid_config(format!("{key}='{value}' is not a valid number")))
}

fn is_qualified_finalizer(finalizer: &str) -> bool {
    finalizer
        .split_once('/')
        .is_some_and(|(domain, name)| !domain.is_empty() && !name.is_empty() && !name.contains('/'))
}
