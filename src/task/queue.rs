//! Queue operations over the tasks collection.
//!
//! Claiming is one conditional update. Eligible documents are the free ones
//! and the ones whose lease has run out:
//!
//! ```text
//! holder absent OR leaseExpiresAt < now
//! ```
//!
//! Among those the [`SelectionStrategy`] picks one. The default draws a random
//! probe in the unit square and takes the task whose `distributionKey` lies
//! closest, so concurrent claimers tend to aim at different documents instead
//! of all racing for the first one.

use super::{DISTRIBUTION_FIELD, HOLDER_FIELD, LEASE_FIELD, Task, TaskDocument, identity};
use crate::error::Result;
use crate::store::{Collection, Filter, IndexSpec, Point, Selection, Update, decode, encode};
use chrono::Duration;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How `next` picks among eligible tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Closest `distributionKey` to a fresh random probe.
    #[default]
    Nearest,
    /// First eligible task by name.
    First,
}

impl SelectionStrategy {
    /// Build the store selection for one claim attempt.
    pub fn selection(&self) -> Selection {
        match self {
            SelectionStrategy::Nearest => Selection::nearest(DISTRIBUTION_FIELD, random_point()),
            SelectionStrategy::First => Selection::First,
        }
    }
}

impl std::str::FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "nearest" => Ok(SelectionStrategy::Nearest),
            "first" => Ok(SelectionStrategy::First),
            other => Err(format!(
                "unknown selection strategy '{}' (expected 'nearest' or 'first')",
                other
            )),
        }
    }
}

/// A uniformly random point in the unit square.
pub fn random_point() -> Point {
    let mut rng = rand::rng();
    [rng.random::<f64>(), rng.random::<f64>()]
}

/// Adds, claims and finalizes tasks in one collection.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    collection: Arc<dyn Collection>,
    strategy: SelectionStrategy,
}

impl TaskQueue {
    /// Open the queue with the default strategy, declaring the distribution
    /// index.
    pub fn new(collection: Arc<dyn Collection>) -> Result<Self> {
        Self::with_strategy(collection, SelectionStrategy::default())
    }

    pub fn with_strategy(
        collection: Arc<dyn Collection>,
        strategy: SelectionStrategy,
    ) -> Result<Self> {
        collection.ensure_index(IndexSpec::Geo2d(DISTRIBUTION_FIELD.to_string()))?;
        Ok(Self {
            collection,
            strategy,
        })
    }

    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.collection
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// Insert a new free task.
    ///
    /// Fails with `DuplicateKey` if `name` is already queued.
    pub fn add(&self, name: &str, payload: &[u8]) -> Result<()> {
        let doc = TaskDocument {
            name: name.to_string(),
            holder: None,
            payload: payload.to_vec(),
            lease_expires_at: None,
            distribution_key: random_point(),
        };
        self.collection
            .insert_one(encode(self.collection.name(), &doc)?)?;
        tracing::debug!(task = %name, bytes = payload.len(), "task added");
        Ok(())
    }

    /// Claim one eligible task for `holder`.
    ///
    /// With a lease the claim lapses at store-now plus `lease`; without one it
    /// lasts until completed or failed. Returns `Ok(None)` when nothing is
    /// eligible.
    pub fn next(&self, holder: &str, lease: Option<Duration>) -> Result<Option<Task>> {
        let filter = Filter::or([
            Filter::absent(HOLDER_FIELD),
            Filter::before_now(LEASE_FIELD),
        ]);
        let update = Update::new().set(HOLDER_FIELD, holder);
        let update = match lease {
            Some(lease) => update.set_expiry(LEASE_FIELD, lease),
            None => update.unset(LEASE_FIELD),
        };

        let claimed = self.collection.find_one_and_update(
            &filter,
            &update,
            &self.strategy.selection(),
            None,
        )?;
        let Some(doc) = claimed else {
            tracing::debug!(holder = %holder, "no task available");
            return Ok(None);
        };

        let doc: TaskDocument = decode(self.collection.name(), doc)?;
        tracing::debug!(task = %doc.name, holder = %holder, lease_expires_at = ?doc.lease_expires_at, "task claimed");
        Ok(Some(Task::new(doc, self.collection.clone())))
    }

    pub fn complete(&self, task: &Task) -> Result<bool> {
        task.complete()
    }

    pub fn failed(&self, task: &Task) -> Result<bool> {
        task.failed()
    }

    /// Rebuild a handle for a claim `holder` made earlier, e.g. in another
    /// process. `None` if the task is gone or held by someone else.
    pub fn resume(&self, name: &str, holder: &str) -> Result<Option<Task>> {
        let mut docs = self.collection.find(&identity(name, Some(holder)))?;
        docs.pop()
            .map(|doc| {
                decode::<TaskDocument>(self.collection.name(), doc)
                    .map(|doc| Task::new(doc, self.collection.clone()))
            })
            .transpose()
    }

    /// Read one task document.
    pub fn get(&self, name: &str) -> Result<Option<TaskDocument>> {
        let mut docs = self.collection.find(&Filter::id(name))?;
        docs.pop()
            .map(|doc| decode(self.collection.name(), doc))
            .transpose()
    }

    /// Every task document, ordered by name.
    pub fn list(&self) -> Result<Vec<TaskDocument>> {
        self.collection
            .find(&Filter::all())?
            .into_iter()
            .map(|doc| decode(self.collection.name(), doc))
            .collect()
    }
}

impl super::TaskHandler for TaskQueue {
    fn add(&self, name: &str, payload: &[u8]) -> Result<()> {
        TaskQueue::add(self, name, payload)
    }

    fn next(&self, holder: &str, lease: Option<Duration>) -> Result<Option<Task>> {
        TaskQueue::next(self, holder, lease)
    }

    fn complete(&self, task: &Task) -> Result<bool> {
        TaskQueue::complete(self, task)
    }

    fn failed(&self, task: &Task) -> Result<bool> {
        TaskQueue::failed(self, task)
    }
}
