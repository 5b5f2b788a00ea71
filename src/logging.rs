//! Structured logging with tracing.
//!
//! Coordination outcomes are emitted as `debug` events with the lock or task
//! name and holder as fields. The CLI installs a subscriber once at startup;
//! library users install their own.

use crate::error::{LeaseholdError, Result};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable whose filter directives override the config.
pub const LOG_ENV: &str = "LEASEHOLD_LOG";

/// Build the event filter: `LEASEHOLD_LOG` if set and valid, else `level`.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| {
        LeaseholdError::UserError(format!("invalid log level '{}': {}", level, e))
    })
}

/// Install the global subscriber writing to stderr.
///
/// Stdout stays free for command output.
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = build_filter(level)?;
    let registry = Registry::default().with(filter);

    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    };

    installed.map_err(|e| LeaseholdError::UserError(format!("failed to install logger: {}", e)))?;
    tracing::debug!(level = %level, json, "logging initialized");
    Ok(())
}
