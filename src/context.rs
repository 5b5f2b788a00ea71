//! Invocation context resolution for leasehold.
//!
//! This module turns the global CLI options and the discovered config into
//! the things every command needs: the holder identity it acts as and an
//! opened [`Manager`] over the file store.
//!
//! Precedence for each setting is command line, then config file, then the
//! built-in default.

use crate::clock;
use crate::config::Config;
use crate::error::Result;
use crate::manager::Manager;
use crate::store::FileStore;
use std::path::{Path, PathBuf};

/// Holder identity used when `--holder` is not given: `user@host`.
pub fn default_holder() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Resolved state for one command invocation.
#[derive(Debug)]
pub struct Context {
    /// Effective configuration.
    pub config: Config,

    /// The file the config came from, if any.
    pub config_source: Option<PathBuf>,

    /// Directory holding the store's databases.
    pub store_root: PathBuf,

    /// Identity this invocation acts as.
    pub holder: String,

    manager: Manager,
}

impl Context {
    /// Open the store described by `config`, with optional command-line
    /// overrides for the store root and holder.
    pub fn open(
        config: Config,
        config_source: Option<PathBuf>,
        root: Option<&Path>,
        holder: Option<&str>,
    ) -> Result<Self> {
        let store_root = root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&config.store_root));
        let holder = holder
            .map(str::to_string)
            .unwrap_or_else(default_holder);

        let store = FileStore::open_with(
            &store_root,
            &config.database,
            config.store_options(),
            clock::system(),
        )?;
        let manager = Manager::from_store(
            &store,
            &config.locks_collection,
            &config.tasks_collection,
            config.selection,
        )?;

        tracing::debug!(
            store_root = %store_root.display(),
            database = %config.database,
            holder = %holder,
            config = ?config_source,
            "context resolved"
        );

        Ok(Self {
            config,
            config_source,
            store_root,
            holder,
            manager,
        })
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EnvGuard;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_default_holder_uses_user_and_host() {
        let _user = EnvGuard::set("USER", "alice");
        let holder = default_holder();
        assert!(holder.starts_with("alice@"), "{holder}");
        assert!(holder.len() > "alice@".len());
    }

    #[test]
    #[serial]
    fn test_default_holder_falls_back_to_username() {
        let _user = EnvGuard::unset("USER");
        let _username = EnvGuard::set("USERNAME", "bob");
        assert!(default_holder().starts_with("bob@"));
    }

    #[test]
    fn test_open_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            database: "ctx".to_string(),
            ..Config::default()
        };

        let ctx = Context::open(config, None, Some(dir.path()), Some("worker-7")).unwrap();
        assert_eq!(ctx.holder, "worker-7");
        assert_eq!(ctx.store_root, dir.path());
        assert!(dir.path().join("ctx").join("locks").is_dir());
        assert!(dir.path().join("ctx").join("tasks").is_dir());
    }

    #[test]
    fn test_open_uses_configured_root() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            store_root: dir.path().join("store").to_string_lossy().to_string(),
            ..Config::default()
        };

        let ctx = Context::open(config, None, None, Some("w")).unwrap();
        assert!(ctx.store_root.join("leasehold").is_dir());
    }

    #[test]
    fn test_open_rejects_bad_database_name() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            database: "../escape".to_string(),
            ..Config::default()
        };
        assert!(Context::open(config, None, Some(dir.path()), Some("w")).is_err());
    }
}
