//! Lease-based mutual exclusion.
//!
//! A lock is one document per name in the locks collection:
//!
//! ```json
//! { "_id": "nightly-report", "holder": "worker@host-a", "expiresAt": 1718000000000000 }
//! ```
//!
//! # Protocol
//!
//! [`Mutex::try_lock`] is a single conditional update. The filter matches the
//! lock's document when either we already hold it, or its lease has run out
//! by the store's clock:
//!
//! ```text
//! (_id == name AND holder == me) OR (_id == name AND expiresAt < now)
//! ```
//!
//! On a match the holder and deadline are overwritten in our favour. On a miss
//! the store inserts a fresh document, which fails with a duplicate key when
//! another holder owns a live lease or won a simultaneous first insert. Both
//! outcomes are a lost race, reported as `Ok(false)`.
//!
//! [`Mutex::unlock`] deletes the document only if we are still the holder, so
//! releasing a lease that someone else has since reclaimed is a no-op.

use crate::clock::{self, Clock};
use crate::error::Result;
use crate::store::{Collection, Document, Filter, ID_FIELD, Selection, Update, decode};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[cfg(test)]
mod tests;

const HOLDER_FIELD: &str = "holder";
const EXPIRES_FIELD: &str = "expiresAt";

/// A lock document as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDocument {
    #[serde(rename = "_id")]
    pub name: String,

    pub holder: String,

    /// Lease deadline, UTC.
    #[serde(rename = "expiresAt", with = "chrono::serde::ts_microseconds")]
    pub expires_at: DateTime<Utc>,
}

impl LockDocument {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Describe the lease relative to `now` for display.
    pub fn describe(&self, now: DateTime<Utc>) -> String {
        if self.is_expired_at(now) {
            format!(
                "{} (holder: {}, expired {} ago, EXPIRED)",
                self.name,
                self.holder,
                format_span(now - self.expires_at)
            )
        } else {
            format!(
                "{} (holder: {}, expires in {})",
                self.name,
                self.holder,
                format_span(self.expires_at - now)
            )
        }
    }
}

/// Format a span as a short human-readable string (`2d 3h`, `4h 5m`, `6m`, `7s`).
pub fn format_span(span: Duration) -> String {
    let seconds = span.num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

/// Something that hands out lock handles.
pub trait MutexCreator {
    /// Build an unlocked handle for `name` owned by `holder`. No store access.
    fn new_mutex(&self, name: &str, holder: &str) -> Mutex;
}

/// Issues [`Mutex`] handles against one locks collection.
#[derive(Debug, Clone)]
pub struct LockManager {
    collection: Arc<dyn Collection>,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(collection: Arc<dyn Collection>) -> Self {
        Self::with_clock(collection, clock::system())
    }

    /// Use `clock` for the handles' local expiry checks.
    pub fn with_clock(collection: Arc<dyn Collection>, clock: Arc<dyn Clock>) -> Self {
        Self { collection, clock }
    }

    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.collection
    }

    /// Read the current document for `name`, live or expired.
    pub fn status(&self, name: &str) -> Result<Option<LockDocument>> {
        let mut docs = self.collection.find(&Filter::id(name))?;
        docs.pop()
            .map(|doc| decode(self.collection.name(), doc))
            .transpose()
    }

    /// Every lock document, ordered by name.
    pub fn list(&self) -> Result<Vec<LockDocument>> {
        self.collection
            .find(&Filter::all())?
            .into_iter()
            .map(|doc| decode(self.collection.name(), doc))
            .collect()
    }
}

impl MutexCreator for LockManager {
    fn new_mutex(&self, name: &str, holder: &str) -> Mutex {
        Mutex {
            name: name.to_string(),
            holder: holder.to_string(),
            expires_at: None,
            collection: self.collection.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// A handle on one named lock for one holder.
///
/// The handle caches the last deadline it was granted. It holds no authority
/// of its own: the store decides who owns the name.
#[derive(Debug)]
pub struct Mutex {
    name: String,
    holder: String,
    expires_at: Option<DateTime<Utc>>,
    collection: Arc<dyn Collection>,
    clock: Arc<dyn Clock>,
}

impl Mutex {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// The deadline from our last successful `try_lock`, if any.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Claim the lock for `lease`, or extend it if we already hold it.
    ///
    /// Returns `Ok(false)` when another holder owns a live lease. The new
    /// deadline is always `now + lease`; a shorter lease shortens it.
    pub fn try_lock(&mut self, lease: Duration) -> Result<bool> {
        let filter = Filter::or([
            self.identity(),
            Filter::and([Filter::id(&self.name), Filter::before_now(EXPIRES_FIELD)]),
        ]);
        let update = Update::new()
            .set(HOLDER_FIELD, self.holder.as_str())
            .set_expiry(EXPIRES_FIELD, lease);

        let mut fresh = Document::new();
        fresh.insert(ID_FIELD.to_string(), Value::from(self.name.as_str()));

        let result =
            self.collection
                .find_one_and_update(&filter, &update, &Selection::First, Some(fresh));
        let doc = match result {
            Ok(Some(doc)) => doc,
            Ok(None) => return Ok(false),
            Err(e) if e.is_duplicate_key() => {
                tracing::debug!(lock = %self.name, holder = %self.holder, "lock held elsewhere");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let lock: LockDocument = decode(self.collection.name(), doc)?;
        if lock.holder != self.holder {
            tracing::debug!(lock = %self.name, holder = %self.holder, owner = %lock.holder, "lock held elsewhere");
            return Ok(false);
        }

        tracing::debug!(lock = %self.name, holder = %self.holder, expires_at = %lock.expires_at, "lock acquired");
        self.expires_at = Some(lock.expires_at);
        Ok(true)
    }

    /// Release the lock if we still hold it.
    ///
    /// Returns whether a document was removed. `Ok(false)` means the lease had
    /// already been lost; that is not an error.
    pub fn unlock(&mut self) -> Result<bool> {
        let removed = self.collection.delete_many(&self.identity())?;
        self.expires_at = None;
        if removed == 0 {
            tracing::debug!(lock = %self.name, holder = %self.holder, "unlock found no lease to release");
        }
        Ok(removed > 0)
    }

    /// Whether the last deadline we were granted has passed.
    ///
    /// Local only: another holder may already have reclaimed the name. A
    /// handle that never acquired reports expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_none_or(|deadline| deadline < self.clock.now())
    }

    fn identity(&self) -> Filter {
        Filter::and([
            Filter::id(&self.name),
            Filter::eq(HOLDER_FIELD, self.holder.as_str()),
        ])
    }
}
