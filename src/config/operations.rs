//! Config loading, discovery, validation, and utility operations.

use super::model::Config;
use super::types::{CONFIG_ENV, CONFIG_FILE_NAME};
use crate::error::{LeaseholdError, Result};
use crate::store::FileStoreOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the config file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(LeaseholdError::UserError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LeaseholdError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Find and load the config for this invocation.
    ///
    /// Looks in order at `explicit` (from `--config`), the `LEASEHOLD_CONFIG`
    /// variable, and `leasehold.yaml` in the working directory. An explicit or
    /// environment path must exist; a missing working-directory file just means
    /// defaults. Returns the config and the file it came from, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(path);
            return Ok((Self::load(&path)?, Some(path)));
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Ok((Self::load(&local)?, Some(local)));
        }

        Ok((Self::default(), None))
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document parses as null; treat it as "all defaults".
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| {
                LeaseholdError::UserError(format!("failed to parse config YAML: {}", e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            LeaseholdError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - durations (`default_lease_seconds`, `operation_timeout_ms`,
    ///   `lock_retry_interval_ms`) must be positive
    /// - `store_root`, `database` and both collection names must be non-empty
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("default_lease_seconds", self.default_lease_seconds),
            ("operation_timeout_ms", self.operation_timeout_ms),
            ("lock_retry_interval_ms", self.lock_retry_interval_ms),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(LeaseholdError::UserError(format!(
                    "config validation failed: {} must be greater than 0",
                    key
                )));
            }
        }

        let named = [
            ("store_root", &self.store_root),
            ("database", &self.database),
            ("locks_collection", &self.locks_collection),
            ("tasks_collection", &self.tasks_collection),
        ];
        for (key, value) in named {
            if value.trim().is_empty() {
                return Err(LeaseholdError::UserError(format!(
                    "config validation failed: {} must not be empty",
                    key
                )));
            }
        }

        if self.locks_collection == self.tasks_collection {
            return Err(LeaseholdError::UserError(format!(
                "config validation failed: locks_collection and tasks_collection are both '{}'",
                self.locks_collection
            )));
        }

        Ok(())
    }

    /// The lease applied when a command gives none.
    pub fn default_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.default_lease_seconds).unwrap_or(i64::MAX))
    }

    /// Call-plane bounds for the file store.
    pub fn store_options(&self) -> FileStoreOptions {
        FileStoreOptions {
            operation_timeout: Duration::from_millis(self.operation_timeout_ms),
            retry_interval: Duration::from_millis(self.lock_retry_interval_ms),
        }
    }
}
