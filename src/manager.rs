//! One object that hands out both locks and tasks.

use crate::error::Result;
use crate::locks::{LockManager, Mutex, MutexCreator};
use crate::store::{Collection, Store};
use crate::task::{SelectionStrategy, Task, TaskHandler, TaskQueue};
use chrono::Duration;
use std::sync::Arc;

/// Locks and tasks over two collections of the same store.
///
/// Callers that only need one role can hold it as `&dyn MutexCreator` or
/// `&dyn TaskHandler`.
#[derive(Debug, Clone)]
pub struct Manager {
    locks: LockManager,
    tasks: TaskQueue,
}

impl Manager {
    /// Build from the two collections. Declares the distribution index on
    /// `tasks`.
    pub fn new(locks: Arc<dyn Collection>, tasks: Arc<dyn Collection>) -> Result<Self> {
        Ok(Self {
            locks: LockManager::new(locks),
            tasks: TaskQueue::new(tasks)?,
        })
    }

    pub fn from_store(
        store: &dyn Store,
        locks_collection: &str,
        tasks_collection: &str,
        strategy: SelectionStrategy,
    ) -> Result<Self> {
        Ok(Self {
            locks: LockManager::new(store.collection(locks_collection)?),
            tasks: TaskQueue::with_strategy(store.collection(tasks_collection)?, strategy)?,
        })
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }
}

impl MutexCreator for Manager {
    fn new_mutex(&self, name: &str, holder: &str) -> Mutex {
        self.locks.new_mutex(name, holder)
    }
}

impl TaskHandler for Manager {
    fn add(&self, name: &str, payload: &[u8]) -> Result<()> {
        self.tasks.add(name, payload)
    }

    fn next(&self, holder: &str, lease: Option<Duration>) -> Result<Option<Task>> {
        self.tasks.next(holder, lease)
    }

    fn complete(&self, task: &Task) -> Result<bool> {
        self.tasks.complete(task)
    }

    fn failed(&self, task: &Task) -> Result<bool> {
        self.tasks.failed(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, IndexSpec, MemoryStore};
    use tempfile::TempDir;

    #[test]
    fn test_roles_share_one_store() {
        let store = MemoryStore::new();
        let m = Manager::from_store(&store, "locks", "tasks", SelectionStrategy::Nearest).unwrap();

        let creator: &dyn MutexCreator = &m;
        let mut lock = creator.new_mutex("deploy", "a");
        assert!(lock.try_lock(Duration::minutes(1)).unwrap());

        let handler: &dyn TaskHandler = &m;
        handler.add("job1", b"x").unwrap();
        let task = handler.next("a", None).unwrap().unwrap();
        assert!(handler.complete(&task).unwrap());

        assert_eq!(m.locks().list().unwrap().len(), 1);
        assert!(m.tasks().list().unwrap().is_empty());
        assert_eq!(
            store.collection("locks").unwrap().find(&crate::store::Filter::all()).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_new_declares_distribution_index() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), "leasehold").unwrap();
        let tasks = store.file_collection("tasks").unwrap();

        Manager::new(store.collection("locks").unwrap(), tasks.clone()).unwrap();

        let indexes = std::fs::read_to_string(tasks.dir().join(".indexes.json")).unwrap();
        assert!(indexes.contains("distributionKey"), "{indexes}");
        // Declaring again is harmless.
        tasks
            .ensure_index(IndexSpec::Geo2d("distributionKey".to_string()))
            .unwrap();
    }

    #[test]
    fn test_failed_through_manager_returns_task() {
        let store = MemoryStore::new();
        let m = Manager::from_store(&store, "locks", "tasks", SelectionStrategy::First).unwrap();

        m.add("job1", b"payload").unwrap();
        let task = m.next("u1", Some(Duration::minutes(1))).unwrap().unwrap();
        assert!(m.failed(&task).unwrap());
        let again = m.next("u2", None).unwrap().unwrap();
        assert_eq!(again.payload(), b"payload");
    }
}
