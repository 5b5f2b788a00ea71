//! Exclusive per-collection lock for the file store.
//!
//! Every mutating call on a [`super::FileCollection`] runs while holding an
//! OS-level exclusive lock on `.collection.lock` inside the collection
//! directory. The lock dies with its process, so a crashed caller never
//! wedges the collection.
//!
//! While held, the lock file carries JSON metadata naming the owner, which
//! makes a timeout message say who was in the way.

use super::FileStoreOptions;
use crate::error::{LeaseholdError, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Who holds a collection lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardMetadata {
    /// Owner of the lock (`user@HOST`).
    pub owner: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl GuardMetadata {
    fn current() -> Self {
        Self {
            owner: crate::context::default_holder(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// RAII guard for a collection lock. Dropping it releases the lock.
#[derive(Debug)]
pub(super) struct CollectionGuard {
    file: File,
    path: PathBuf,
}

impl CollectionGuard {
    /// Block until the lock is ours or `options.operation_timeout` passes.
    pub(super) fn acquire(
        path: &Path,
        collection: &str,
        options: &FileStoreOptions,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LeaseholdError::io("failed to open collection lock", path, e))?;

        let started = Instant::now();
        let contended = fs2::lock_contended_error().kind();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(e) if e.kind() == contended => {
                    let waited = started.elapsed();
                    if waited >= options.operation_timeout {
                        if let Some(holder) = read_metadata(path) {
                            tracing::debug!(
                                collection,
                                owner = %holder.owner,
                                pid = holder.pid,
                                "collection lock still held at timeout"
                            );
                        }
                        return Err(LeaseholdError::Timeout {
                            collection: collection.to_string(),
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(with_jitter(options.retry_interval));
                }
                Err(e) => {
                    return Err(LeaseholdError::io("failed to lock collection", path, e));
                }
            }
        }

        let mut guard = Self {
            file,
            path: path.to_path_buf(),
        };
        guard.write_metadata(&GuardMetadata::current());
        Ok(guard)
    }

    // Best effort: the metadata is diagnostic only.
    fn write_metadata(&mut self, meta: &GuardMetadata) {
        let Ok(json) = serde_json::to_vec(meta) else {
            return;
        };
        let written = self
            .file
            .set_len(0)
            .and_then(|()| self.file.seek(SeekFrom::Start(0)))
            .and_then(|_| self.file.write_all(&json));
        if let Err(e) = written {
            tracing::debug!(path = %self.path.display(), error = %e, "could not record lock owner");
        }
    }
}

impl Drop for CollectionGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to release collection lock"
            );
        }
    }
}

/// Read whoever last recorded themselves in the lock file.
pub(super) fn read_metadata(path: &Path) -> Option<GuardMetadata> {
    let mut content = String::new();
    File::open(path).ok()?.read_to_string(&mut content).ok()?;
    serde_json::from_str(&content).ok()
}

fn with_jitter(base: std::time::Duration) -> std::time::Duration {
    let max_extra = (base.as_micros() / 2).max(1) as u64;
    base + std::time::Duration::from_micros(rand::rng().random_range(0..=max_extra))
}
