//! Configuration constants and defaults for leasehold.
//!
//! This module defines the discovery constants and default value functions
//! used by the Config struct.

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_ENV: &str = "LEASEHOLD_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "leasehold.yaml";

pub(crate) fn default_store_root() -> String {
    ".leasehold".to_string()
}

pub(crate) fn default_database() -> String {
    "leasehold".to_string()
}

pub(crate) fn default_locks_collection() -> String {
    "locks".to_string()
}

pub(crate) fn default_tasks_collection() -> String {
    "tasks".to_string()
}

pub(crate) fn default_lease_seconds() -> u64 {
    60
}

pub(crate) fn default_operation_timeout_ms() -> u64 {
    5000
}

pub(crate) fn default_lock_retry_interval_ms() -> u64 {
    10
}

pub(crate) fn default_log_level() -> String {
    "warn".to_string()
}
