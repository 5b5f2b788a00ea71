use crate::clock::ManualClock;
use crate::store::{FileStore, FileStoreOptions, MemoryStore, Store};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use tempfile::TempDir;

static CWD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub(crate) struct DirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl DirGuard {
    pub(crate) fn new(new_dir: &Path) -> Self {
        // Changing the process current working directory is global and not thread-safe.
        // Lock it so tests don't race even if a #[serial] annotation is missed.
        let lock = CWD_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(new_dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// Sets or clears an environment variable for the life of the guard.
///
/// Callers must be `#[serial]`.
pub(crate) struct EnvGuard {
    key: &'static str,
    original: Option<String>,
}

impl EnvGuard {
    pub(crate) fn set(key: &'static str, value: &str) -> Self {
        let original = std::env::var(key).ok();
        // SAFETY: tests touching the environment run under #[serial].
        unsafe { std::env::set_var(key, value) };
        Self { key, original }
    }

    pub(crate) fn unset(key: &'static str) -> Self {
        let original = std::env::var(key).ok();
        // SAFETY: tests touching the environment run under #[serial].
        unsafe { std::env::remove_var(key) };
        Self { key, original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: see constructors.
        unsafe {
            match &self.original {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }
}

/// A store under test plus whatever keeps it alive.
pub(crate) struct Backend {
    pub(crate) label: &'static str,
    pub(crate) store: Box<dyn Store>,
    pub(crate) clock: Arc<ManualClock>,
    _dir: Option<TempDir>,
}

/// One of each bundled backend, each on its own manual clock.
pub(crate) fn backends() -> Vec<Backend> {
    let clock = Arc::new(ManualClock::starting_now());
    let memory = Backend {
        label: "memory",
        store: Box::new(MemoryStore::with_clock(clock.clone())),
        clock,
        _dir: None,
    };

    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let file = Backend {
        label: "file",
        store: Box::new(
            FileStore::open_with(
                dir.path(),
                "leasehold",
                FileStoreOptions::default(),
                clock.clone(),
            )
            .unwrap(),
        ),
        clock,
        _dir: Some(dir),
    };

    vec![memory, file]
}
