//! Claimable work items.
//!
//! A task is one document per unit of work in the tasks collection:
//!
//! ```json
//! {
//!   "_id": "resize-4711",
//!   "payload": "aW1nLzQ3MTEucG5n",
//!   "holder": "worker@host-b",
//!   "leaseExpiresAt": 1718000000000000,
//!   "distributionKey": [0.4182, 0.9071]
//! }
//! ```
//!
//! `holder` and `leaseExpiresAt` are absent while the task is free. A claim
//! made without a lease has a holder and no `leaseExpiresAt`, and never
//! expires on its own.
//!
//! The queue operations live in [`queue`]; this module holds the entity and
//! the client-side [`Task`] handle.

mod payload;
pub mod queue;

pub use queue::{SelectionStrategy, TaskQueue, random_point};

use crate::error::Result;
use crate::store::{Collection, Filter, Point, Update};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub(crate) const HOLDER_FIELD: &str = "holder";
pub(crate) const LEASE_FIELD: &str = "leaseExpiresAt";
pub(crate) const DISTRIBUTION_FIELD: &str = "distributionKey";

/// A task document as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDocument {
    #[serde(rename = "_id")]
    pub name: String,

    /// Who claimed the task. Absent while free.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,

    /// Caller-defined bytes, stored base64-encoded.
    #[serde(with = "payload")]
    pub payload: Vec<u8>,

    /// When the current claim lapses. Absent for unleased claims.
    #[serde(
        rename = "leaseExpiresAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_microseconds_option"
    )]
    pub lease_expires_at: Option<DateTime<Utc>>,

    /// Random point in the unit square, fixed at creation; spreads claimers.
    #[serde(rename = "distributionKey")]
    pub distribution_key: Point,
}

/// Where a task stands at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Free,
    Claimed,
    /// Claimed, but the lease has run out; the next claim may take it.
    Expired,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Free => "free",
            TaskState::Claimed => "claimed",
            TaskState::Expired => "expired",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TaskDocument {
    pub fn state_at(&self, now: DateTime<Utc>) -> TaskState {
        match (&self.holder, self.lease_expires_at) {
            (None, _) => TaskState::Free,
            (Some(_), Some(deadline)) if deadline < now => TaskState::Expired,
            (Some(_), _) => TaskState::Claimed,
        }
    }
}

/// Filter matching a task by name and holder. A `None` holder matches only a
/// free task.
pub(crate) fn identity(name: &str, holder: Option<&str>) -> Filter {
    let holder = match holder {
        Some(holder) => Filter::eq(HOLDER_FIELD, holder),
        None => Filter::absent(HOLDER_FIELD),
    };
    Filter::and([Filter::id(name), holder])
}

/// Something that runs a task queue.
pub trait TaskHandler {
    fn add(&self, name: &str, payload: &[u8]) -> Result<()>;
    fn next(&self, holder: &str, lease: Option<Duration>) -> Result<Option<Task>>;
    fn complete(&self, task: &Task) -> Result<bool>;
    fn failed(&self, task: &Task) -> Result<bool>;
}

/// A claimed task as last seen by this client.
#[derive(Debug, Clone)]
pub struct Task {
    doc: TaskDocument,
    collection: Arc<dyn Collection>,
}

impl Task {
    pub(crate) fn new(doc: TaskDocument, collection: Arc<dyn Collection>) -> Self {
        Self { doc, collection }
    }

    pub fn name(&self) -> &str {
        &self.doc.name
    }

    pub fn payload(&self) -> &[u8] {
        &self.doc.payload
    }

    pub fn holder(&self) -> Option<&str> {
        self.doc.holder.as_deref()
    }

    pub fn lease_expires_at(&self) -> Option<DateTime<Utc>> {
        self.doc.lease_expires_at
    }

    pub fn distribution_key(&self) -> Point {
        self.doc.distribution_key
    }

    pub fn document(&self) -> &TaskDocument {
        &self.doc
    }

    pub fn into_document(self) -> TaskDocument {
        self.doc
    }

    /// Remove the task for good, if this holder still owns it.
    ///
    /// Returns whether the task was removed. `Ok(false)` means the claim was
    /// lost (lease expired and reclaimed, or already finalized).
    pub fn complete(&self) -> Result<bool> {
        let removed = self.collection.delete_many(&self.identity())?;
        if removed == 0 {
            tracing::debug!(task = %self.doc.name, holder = ?self.doc.holder, "complete found no claim to finalize");
        } else {
            tracing::debug!(task = %self.doc.name, holder = ?self.doc.holder, "task completed");
        }
        Ok(removed > 0)
    }

    /// Hand the task back to the pool with its payload intact.
    ///
    /// Returns whether the task was released. Retries are unbounded; callers
    /// that want a cap must count attempts themselves.
    pub fn failed(&self) -> Result<bool> {
        let update = Update::new().unset(HOLDER_FIELD).unset(LEASE_FIELD);
        let released = self.collection.find_one_and_update(
            &self.identity(),
            &update,
            &crate::store::Selection::First,
            None,
        )?;
        match released {
            Some(_) => {
                tracing::debug!(task = %self.doc.name, holder = ?self.doc.holder, "task released");
                Ok(true)
            }
            None => {
                tracing::debug!(task = %self.doc.name, holder = ?self.doc.holder, "failed found no claim to release");
                Ok(false)
            }
        }
    }

    fn identity(&self) -> Filter {
        identity(&self.doc.name, self.doc.holder.as_deref())
    }
}
