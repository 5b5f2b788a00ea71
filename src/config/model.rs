//! Config struct definition and default implementation.

use super::types::*;
use crate::task::SelectionStrategy;
use serde::{Deserialize, Serialize};

/// Configuration for leasehold.
///
/// This struct represents the contents of `leasehold.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Store settings
    // =========================================================================
    /// Directory holding the file store (default: ".leasehold").
    #[serde(default = "default_store_root")]
    pub store_root: String,

    /// Database directory under `store_root` (default: "leasehold").
    #[serde(default = "default_database")]
    pub database: String,

    /// Collection holding lock documents (default: "locks").
    #[serde(default = "default_locks_collection")]
    pub locks_collection: String,

    /// Collection holding task documents (default: "tasks").
    #[serde(default = "default_tasks_collection")]
    pub tasks_collection: String,

    /// How long a single store call may wait for the collection lock.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Pause between attempts on a busy collection lock.
    #[serde(default = "default_lock_retry_interval_ms")]
    pub lock_retry_interval_ms: u64,

    // =========================================================================
    // Coordination settings
    // =========================================================================
    /// Lease used by `lock acquire` and `task next` when `--lease` is omitted.
    #[serde(default = "default_lease_seconds")]
    pub default_lease_seconds: u64,

    /// How `task next` picks among eligible tasks.
    #[serde(default)]
    pub selection: SelectionStrategy,

    // =========================================================================
    // Logging settings
    // =========================================================================
    /// Filter directive for log output (default: "warn"). `LEASEHOLD_LOG` wins.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines instead of text.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_root: default_store_root(),
            database: default_database(),
            locks_collection: default_locks_collection(),
            tasks_collection: default_tasks_collection(),
            operation_timeout_ms: default_operation_timeout_ms(),
            lock_retry_interval_ms: default_lock_retry_interval_ms(),
            default_lease_seconds: default_lease_seconds(),
            selection: SelectionStrategy::default(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}
