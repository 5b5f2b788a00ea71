//! Tests for the lock protocol.

use super::*;
use crate::clock::ManualClock;
use crate::error::LeaseholdError;
use crate::store::{FileStore, IndexSpec, MemoryStore, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn manager_with_clock() -> (LockManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let store = MemoryStore::with_clock(clock.clone());
    let manager = LockManager::with_clock(store.collection("locks").unwrap(), clock.clone());
    (manager, clock)
}

#[test]
fn test_contention_sequence() {
    let (m, _clock) = manager_with_clock();
    let mut first = m.new_mutex("Key", "routine1");
    let mut second = m.new_mutex("Key", "routine2");

    assert!(first.try_lock(Duration::hours(1)).unwrap());
    assert!(!second.try_lock(Duration::seconds(1)).unwrap());
    assert!(first.try_lock(Duration::seconds(1)).unwrap());
}

#[test]
fn test_reentrant_lock_sets_new_deadline() {
    let (m, clock) = manager_with_clock();
    let mut l = m.new_mutex("report", "host");

    assert!(l.try_lock(Duration::minutes(1)).unwrap());
    clock.advance(Duration::seconds(30));
    assert!(l.try_lock(Duration::minutes(5)).unwrap());

    let expected = clock.now() + Duration::minutes(5);
    assert_eq!(l.expires_at(), Some(expected));
    assert_eq!(m.status("report").unwrap().unwrap().expires_at, expected);
}

#[test]
fn test_reentrant_lock_with_shorter_lease_shortens() {
    let (m, clock) = manager_with_clock();
    let mut l = m.new_mutex("report", "host");

    assert!(l.try_lock(Duration::hours(1)).unwrap());
    assert!(l.try_lock(Duration::seconds(5)).unwrap());
    assert_eq!(l.expires_at(), Some(clock.now() + Duration::seconds(5)));
}

#[test]
fn test_reclaim_after_expiry() {
    let (m, clock) = manager_with_clock();
    let mut first = m.new_mutex("Reclaim after deadline", "host");
    let mut next = m.new_mutex("Reclaim after deadline", "second host");

    assert!(first.try_lock(Duration::milliseconds(100)).unwrap());
    assert!(!next.try_lock(Duration::milliseconds(100)).unwrap());

    clock.advance(Duration::milliseconds(101));
    assert!(next.try_lock(Duration::milliseconds(100)).unwrap());
    assert_eq!(m.status("Reclaim after deadline").unwrap().unwrap().holder, "second host");

    // The old holder's cached lease is stale and it cannot win back the name.
    assert!(first.is_expired());
    assert!(!first.try_lock(Duration::seconds(1)).unwrap());
}

#[test]
fn test_deadline_equal_to_now_is_still_live() {
    let (m, clock) = manager_with_clock();
    let mut first = m.new_mutex("edge", "a");
    let mut second = m.new_mutex("edge", "b");

    assert!(first.try_lock(Duration::seconds(10)).unwrap());
    clock.advance(Duration::seconds(10));
    assert!(!second.try_lock(Duration::seconds(10)).unwrap());
    clock.advance(Duration::microseconds(1));
    assert!(second.try_lock(Duration::seconds(10)).unwrap());
}

#[test]
fn test_unlock_makes_name_claimable_immediately() {
    let (m, _clock) = manager_with_clock();
    let mut first = m.new_mutex("job", "a");
    let mut second = m.new_mutex("job", "b");

    assert!(first.try_lock(Duration::hours(1)).unwrap());
    assert!(first.unlock().unwrap());
    assert!(m.status("job").unwrap().is_none());
    assert!(second.try_lock(Duration::hours(1)).unwrap());
}

#[test]
fn test_unlock_by_non_holder_is_noop() {
    let (m, _clock) = manager_with_clock();
    let mut owner = m.new_mutex("job", "a");
    let mut stranger = m.new_mutex("job", "b");

    assert!(owner.try_lock(Duration::hours(1)).unwrap());
    assert!(!stranger.unlock().unwrap());
    assert_eq!(m.status("job").unwrap().unwrap().holder, "a");
}

#[test]
fn test_unlock_after_reclaim_does_not_release_new_holder() {
    let (m, clock) = manager_with_clock();
    let mut old = m.new_mutex("job", "a");
    let mut new = m.new_mutex("job", "b");

    assert!(old.try_lock(Duration::seconds(1)).unwrap());
    clock.advance(Duration::seconds(2));
    assert!(new.try_lock(Duration::hours(1)).unwrap());

    assert!(!old.unlock().unwrap());
    assert_eq!(m.status("job").unwrap().unwrap().holder, "b");
}

#[test]
fn test_is_expired_tracks_cached_deadline() {
    let (m, clock) = manager_with_clock();
    let mut l = m.new_mutex("Key", "routine1");

    assert!(l.is_expired(), "never acquired counts as expired");
    assert!(l.try_lock(Duration::milliseconds(100)).unwrap());
    assert!(!l.is_expired());
    clock.advance(Duration::milliseconds(101));
    assert!(l.is_expired());
}

#[test]
fn test_unlock_clears_cached_deadline() {
    let (m, _clock) = manager_with_clock();
    let mut l = m.new_mutex("Key", "routine1");

    assert!(l.try_lock(Duration::hours(1)).unwrap());
    l.unlock().unwrap();
    assert!(l.expires_at().is_none());
    assert!(l.is_expired());
}

#[test]
fn test_new_mutex_does_not_touch_store() {
    let (m, _clock) = manager_with_clock();
    let l = m.new_mutex("untouched", "a");
    assert_eq!(l.name(), "untouched");
    assert_eq!(l.holder(), "a");
    assert!(m.list().unwrap().is_empty());
}

#[test]
fn test_lost_lock_keeps_previous_cache() {
    let (m, _clock) = manager_with_clock();
    let mut owner = m.new_mutex("job", "a");
    let mut other = m.new_mutex("job", "b");

    assert!(owner.try_lock(Duration::hours(1)).unwrap());
    assert!(!other.try_lock(Duration::hours(1)).unwrap());
    assert!(other.expires_at().is_none());
}

#[test]
fn test_persisted_layout() {
    let (m, clock) = manager_with_clock();
    let mut l = m.new_mutex("nightly", "worker@a");
    assert!(l.try_lock(Duration::seconds(30)).unwrap());

    let docs = m.collection().find(&Filter::all()).unwrap();
    assert_eq!(docs.len(), 1);
    let doc = &docs[0];
    assert_eq!(doc["_id"], serde_json::json!("nightly"));
    assert_eq!(doc["holder"], serde_json::json!("worker@a"));
    assert_eq!(
        doc["expiresAt"],
        serde_json::json!((clock.now() + Duration::seconds(30)).timestamp_micros())
    );
    assert_eq!(doc.len(), 3);
}

#[test]
fn test_list_and_describe() {
    let (m, clock) = manager_with_clock();
    assert!(m.new_mutex("b", "x").try_lock(Duration::minutes(10)).unwrap());
    assert!(m.new_mutex("a", "y").try_lock(Duration::seconds(1)).unwrap());
    clock.advance(Duration::seconds(2));

    let locks = m.list().unwrap();
    let names: Vec<&str> = locks.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);

    let now = clock.now();
    assert!(locks[0].is_expired_at(now));
    assert!(locks[0].describe(now).contains("EXPIRED"));
    assert!(!locks[1].is_expired_at(now));
    let live = locks[1].describe(now);
    assert!(live.contains("holder: x"));
    assert!(live.contains("expires in 9m"));
}

#[test]
fn test_format_span() {
    assert_eq!(format_span(Duration::seconds(42)), "42s");
    assert_eq!(format_span(Duration::minutes(5)), "5m");
    assert_eq!(format_span(Duration::minutes(125)), "2h 5m");
    assert_eq!(format_span(Duration::hours(50)), "2d 2h");
    assert_eq!(format_span(Duration::seconds(-3)), "0s");
}

#[derive(Debug)]
struct Unreachable;

impl Collection for Unreachable {
    fn name(&self) -> &str {
        "locks"
    }
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
    fn ensure_index(&self, _index: IndexSpec) -> Result<()> {
        Err(LeaseholdError::Store("connection refused".to_string()))
    }
    fn insert_one(&self, _doc: Document) -> Result<()> {
        Err(LeaseholdError::Store("connection refused".to_string()))
    }
    fn find_one_and_update(
        &self,
        _filter: &Filter,
        _update: &Update,
        _selection: &Selection,
        _upsert: Option<Document>,
    ) -> Result<Option<Document>> {
        Err(LeaseholdError::Store("connection refused".to_string()))
    }
    fn delete_many(&self, _filter: &Filter) -> Result<u64> {
        Err(LeaseholdError::Store("connection refused".to_string()))
    }
    fn find(&self, _filter: &Filter) -> Result<Vec<Document>> {
        Err(LeaseholdError::Store("connection refused".to_string()))
    }
}

#[test]
fn test_store_errors_propagate_unchanged() {
    let m = LockManager::new(Arc::new(Unreachable));
    let mut l = m.new_mutex("job", "a");

    let err = l.try_lock(Duration::seconds(1)).unwrap_err();
    assert_eq!(err.to_string(), "store error: connection refused");
    assert!(l.unlock().is_err());
    assert!(m.status("job").is_err());
}

fn race_for_one_name(collection: Arc<dyn Collection>) -> usize {
    let m = LockManager::new(collection);
    let hits = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for i in 1..=10 {
            let m = &m;
            let hits = &hits;
            s.spawn(move || {
                let mut l = m.new_mutex("Multiple", &format!("User#{}", i));
                if l.try_lock(Duration::hours(1)).unwrap() {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    hits.load(Ordering::SeqCst)
}

#[test]
fn test_concurrent_holders_single_winner_memory() {
    let store = MemoryStore::new();
    assert_eq!(race_for_one_name(store.collection("locks").unwrap()), 1);
}

#[test]
fn test_concurrent_holders_single_winner_file() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path(), "leasehold").unwrap();
    assert_eq!(race_for_one_name(store.collection("locks").unwrap()), 1);
}

#[test]
fn test_many_locks_all_acquired() {
    let store = MemoryStore::new();
    let m = LockManager::new(store.collection("locks").unwrap());
    let hits = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for i in 1..=100 {
            let m = &m;
            let hits = &hits;
            s.spawn(move || {
                let mut l = m.new_mutex(&format!("Multiple{}", i), "host");
                let got = l.try_lock(Duration::hours(1)).unwrap();
                if got {
                    hits.fetch_add(1, Ordering::SeqCst);
                    l.unlock().unwrap();
                }
            });
        }
    });

    assert_eq!(hits.load(Ordering::SeqCst), 100);
    assert!(m.list().unwrap().is_empty());
}

#[test]
fn test_processes_share_locks_through_file_store() {
    let dir = TempDir::new().unwrap();
    let a = FileStore::open(dir.path(), "leasehold").unwrap();
    let b = FileStore::open(dir.path(), "leasehold").unwrap();

    let mut first = LockManager::new(a.collection("locks").unwrap()).new_mutex("deploy", "a");
    let mut second = LockManager::new(b.collection("locks").unwrap()).new_mutex("deploy", "b");

    assert!(first.try_lock(Duration::hours(1)).unwrap());
    assert!(!second.try_lock(Duration::hours(1)).unwrap());
    assert!(first.unlock().unwrap());
    assert!(second.try_lock(Duration::hours(1)).unwrap());
}
