//! Leasehold: lease-based distributed locks and claim queues.
//!
//! Coordination happens entirely through atomic single-document operations on
//! a shared [`store::Collection`]:
//!
//! - [`locks`]: named mutual exclusion with a lease. A crashed holder's lock
//!   frees itself when the lease runs out.
//! - [`task`]: a queue where each item is claimed by one worker at a time and
//!   then completed or handed back.
//! - [`manager::Manager`] bundles both over one store.
//!
//! ```no_run
//! use chrono::Duration;
//! use leasehold::locks::MutexCreator;
//! use leasehold::manager::Manager;
//! use leasehold::store::FileStore;
//! use leasehold::task::{SelectionStrategy, TaskHandler};
//!
//! # fn main() -> leasehold::error::Result<()> {
//! let store = FileStore::open("/var/lib/leasehold", "jobs")?;
//! let manager = Manager::from_store(&store, "locks", "tasks", SelectionStrategy::Nearest)?;
//!
//! let mut lock = manager.new_mutex("nightly-report", "worker-1");
//! if lock.try_lock(Duration::minutes(5))? {
//!     // ... exclusive work ...
//!     lock.unlock()?;
//! }
//!
//! manager.add("resize-4711", b"img/4711.png")?;
//! if let Some(task) = manager.next("worker-1", Some(Duration::minutes(1)))? {
//!     task.complete()?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod locks;
pub mod logging;
pub mod manager;
pub mod store;
pub mod task;

#[cfg(test)]
mod test_support;
