// tests/storage_lock.rs

use std::sync::Arc;
use std::time::Duration;

use runq::clock::mock::MockClock;
use runq::errors::RunqError;
use runq::lock::{DistributedLock, StorageLock};
use runq::model::Lock;
use runq::storage::{LockStore, MemoryStore, SqliteStore};
use runq_test_utils::init_tracing;
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(100);
const TTL: Duration = Duration::from_secs(60);

fn storage_lock(store: Arc<dyn LockStore>, clock: &MockClock) -> StorageLock {
    StorageLock::new(store, Arc::new(clock.clone()), POLL, TTL)
}

#[tokio::test]
async fn second_non_blocking_acquire_fails_until_release() {
    init_tracing();
    let clock = MockClock::at_epoch();
    let lock = storage_lock(Arc::new(MemoryStore::new()), &clock);

    let held = lock.acquire("jobs", false, Duration::ZERO).await.unwrap().expect("first acquire");
    assert!(lock.acquire("jobs", false, Duration::ZERO).await.unwrap().is_none());

    // Other names are independent.
    let other = lock.acquire("other", false, Duration::ZERO).await.unwrap();
    assert!(other.is_some());

    lock.release(&held).await.unwrap();
    assert!(lock.acquire("jobs", false, Duration::ZERO).await.unwrap().is_some());
}

#[tokio::test]
async fn release_with_foreign_owner_fails_and_keeps_lock() {
    init_tracing();
    let clock = MockClock::at_epoch();
    let lock = storage_lock(Arc::new(MemoryStore::new()), &clock);

    let held = lock.acquire("jobs", false, Duration::ZERO).await.unwrap().unwrap();
    let mut forged = held.clone();
    forged.owner = "someone-else".to_string();

    let err = lock.release(&forged).await.unwrap_err();
    match err {
        RunqError::LockRelease { name, owner, .. } => {
            assert_eq!(name, "jobs");
            assert_eq!(owner, "someone-else");
        }
        other => panic!("expected LockRelease, got {other:?}"),
    }

    // The real holder still holds it.
    assert!(lock.acquire("jobs", false, Duration::ZERO).await.unwrap().is_none());
    lock.release(&held).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn blocking_acquire_times_out() {
    init_tracing();
    let clock = MockClock::at_epoch();
    let lock = storage_lock(Arc::new(MemoryStore::new()), &clock);

    let _held = lock.acquire("busy", false, Duration::ZERO).await.unwrap().unwrap();

    let err = lock
        .acquire("busy", true, Duration::from_secs(2))
        .await
        .unwrap_err();
    match err {
        RunqError::LockTimeout { name, waited_ms } => {
            assert_eq!(name, "busy");
            assert!(waited_ms >= 2_000, "waited only {waited_ms}ms");
        }
        other => panic!("expected LockTimeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn blocking_acquire_succeeds_once_holder_releases() {
    init_tracing();
    let clock = MockClock::at_epoch();
    let lock = Arc::new(storage_lock(Arc::new(MemoryStore::new()), &clock));

    let held = lock.acquire("handoff", false, Duration::ZERO).await.unwrap().unwrap();

    let waiter = {
        let lock = lock.clone();
        tokio::spawn(async move { lock.acquire("handoff", true, Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(350)).await;
    lock.release(&held).await.unwrap();

    let acquired = waiter.await.unwrap().unwrap().expect("waiter gets the lock");
    assert_ne!(acquired.owner, held.owner);
}

#[tokio::test]
async fn abandoned_lock_expires_after_ttl() {
    init_tracing();
    let clock = MockClock::at_epoch();
    let store = Arc::new(MemoryStore::new());
    let lock = storage_lock(store.clone(), &clock);

    let crashed = lock.acquire("jobs", false, Duration::ZERO).await.unwrap().unwrap();
    assert!(lock.acquire("jobs", false, Duration::ZERO).await.unwrap().is_none());

    clock.advance(TTL);
    let fresh = lock
        .acquire("jobs", false, Duration::ZERO)
        .await
        .unwrap()
        .expect("expired row counts as absent");
    assert_ne!(fresh.owner, crashed.owner);

    // The crashed holder's late release must not remove the new holder's row.
    assert!(lock.release(&crashed).await.is_err());
    lock.release(&fresh).await.unwrap();
}

#[tokio::test]
async fn releasing_an_expired_unclaimed_lock_is_ok() {
    let clock = MockClock::at_epoch();
    let lock = storage_lock(Arc::new(MemoryStore::new()), &clock);

    let held: Lock = lock.acquire("jobs", false, Duration::ZERO).await.unwrap().unwrap();
    clock.advance(TTL * 2);
    lock.release(&held).await.unwrap();
}

#[tokio::test]
async fn sqlite_lock_is_shared_between_connections() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("locks.db");
    let clock = MockClock::at_epoch();

    let first = storage_lock(Arc::new(SqliteStore::open(&path).unwrap()), &clock);
    let second = storage_lock(Arc::new(SqliteStore::open(&path).unwrap()), &clock);

    let held = first.acquire("scheduling-rescheduler", false, Duration::ZERO).await.unwrap().unwrap();
    assert!(second
        .acquire("scheduling-rescheduler", false, Duration::ZERO)
        .await
        .unwrap()
        .is_none());

    // Non-owner release through the other connection is rejected.
    assert!(matches!(
        second.release(&Lock { owner: "intruder".into(), ..held.clone() }).await,
        Err(RunqError::LockRelease { .. })
    ));

    first.release(&held).await.unwrap();
    let taken = second.acquire("scheduling-rescheduler", false, Duration::ZERO).await.unwrap();
    assert!(taken.is_some());

    // Expiry works across connections too.
    clock.advance(TTL);
    assert!(first.acquire("scheduling-rescheduler", false, Duration::ZERO).await.unwrap().is_some());
}
