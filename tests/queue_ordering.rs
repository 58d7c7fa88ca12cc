// tests/queue_ordering.rs

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use runq::clock::mock::MockClock;
use runq::clock::Clock;
use runq::errors::RunqError;
use runq::model::request::MAX_DELAY_MILLIS;
use runq::model::{EnqueueOptions, LiveAction};
use runq::queue::ExecutionQueue;
use runq::storage::{MemoryStore, SqliteStore};
use serde_json::json;

fn memory_queue(clock: &MockClock) -> ExecutionQueue {
    ExecutionQueue::new(Arc::new(MemoryStore::new()), Arc::new(clock.clone()))
}

fn payload(clock: &MockClock, action: &str) -> LiveAction {
    LiveAction::new(action, json!({ "cmd": "true" }), clock.now())
}

fn pop_all(queue: &ExecutionQueue) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(request) = queue.pop_next().unwrap() {
        out.push(request.payload.action.clone());
    }
    out
}

#[test]
fn higher_priority_pops_first() {
    let clock = MockClock::at_epoch();
    let queue = memory_queue(&clock);

    queue.enqueue(payload(&clock, "low"), EnqueueOptions::default().priority(1)).unwrap();
    queue.enqueue(payload(&clock, "high"), EnqueueOptions::default().priority(5)).unwrap();
    queue.enqueue(payload(&clock, "mid"), EnqueueOptions::default().priority(3)).unwrap();

    assert_eq!(pop_all(&queue), vec!["high", "mid", "low"]);
    assert!(queue.is_empty().unwrap());
}

#[test]
fn equal_priority_pops_earliest_ready_at_then_shortest_delay() {
    let clock = MockClock::at_epoch();
    let queue = memory_queue(&clock);

    // ready_at = t0 + 300ms, delay 300ms
    queue
        .enqueue(payload(&clock, "late"), EnqueueOptions::default().delay(Duration::from_millis(300)))
        .unwrap();
    clock.advance(Duration::from_millis(200));
    // ready_at = t0 + 300ms as well, delay 100ms
    queue
        .enqueue(payload(&clock, "short-delay"), EnqueueOptions::default().delay(Duration::from_millis(100)))
        .unwrap();
    // ready_at = t0 + 200ms
    queue.enqueue(payload(&clock, "early"), EnqueueOptions::default()).unwrap();

    clock.advance(Duration::from_secs(1));
    assert_eq!(pop_all(&queue), vec!["early", "short-delay", "late"]);
}

#[test]
fn otherwise_equal_requests_stay_fifo() {
    let clock = MockClock::at_epoch();
    let queue = memory_queue(&clock);

    for name in ["a", "b", "c", "d"] {
        queue.enqueue(payload(&clock, name), EnqueueOptions::default()).unwrap();
    }

    assert_eq!(pop_all(&queue), vec!["a", "b", "c", "d"]);
}

#[test]
fn delayed_request_is_not_eligible_until_ready() {
    let clock = MockClock::at_epoch();
    let queue = memory_queue(&clock);

    let request = queue
        .enqueue(payload(&clock, "later"), EnqueueOptions::default().delay(Duration::from_secs(10)))
        .unwrap();
    assert_eq!(request.ready_at, clock.now() + chrono::Duration::seconds(10));

    assert!(queue.pop_next().unwrap().is_none());
    assert_eq!(queue.len().unwrap(), 1);

    clock.advance(Duration::from_secs(10));
    let popped = queue.pop_next().unwrap().expect("eligible at ready_at");
    assert_eq!(popped.id, request.id);
    assert!(queue.pop_next().unwrap().is_none());
}

#[test]
fn affinity_and_priority_survive_the_round_trip() {
    let clock = MockClock::at_epoch();
    let queue = ExecutionQueue::new(
        Arc::new(SqliteStore::open_in_memory().unwrap()),
        Arc::new(clock.clone()),
    );

    let request = queue
        .enqueue(
            payload(&clock, "routed"),
            EnqueueOptions::default().priority(-2).affinity("rack-7"),
        )
        .unwrap();

    let popped = queue.pop_next().unwrap().unwrap();
    assert_eq!(popped, request);
    assert_eq!(popped.affinity.as_deref(), Some("rack-7"));
    assert_eq!(popped.priority, -2);
}

#[test]
fn storage_outage_surfaces_as_retryable_error() {
    let clock = MockClock::at_epoch();
    let store = Arc::new(MemoryStore::new());
    let queue = ExecutionQueue::new(store.clone(), Arc::new(clock.clone()));

    store.set_available(false);
    let err = queue.pop_next().unwrap_err();
    assert!(err.is_retryable(), "unexpected error: {err:?}");

    store.set_available(true);
    assert!(queue.pop_next().unwrap().is_none());
}

fn check_huge_delay_never_ready(queue: &ExecutionQueue, clock: &MockClock) {
    let huge = Duration::from_secs(u64::MAX / 4);
    let parked = queue
        .enqueue(payload(clock, "parked"), EnqueueOptions::default().delay(huge))
        .unwrap();
    assert_eq!(parked.delay, Duration::from_millis(MAX_DELAY_MILLIS));
    assert!(parked.ready_at > clock.now() + chrono::Duration::days(365 * 1000));

    queue.enqueue(payload(clock, "now"), EnqueueOptions::default()).unwrap();
    assert_eq!(pop_all(queue), vec!["now"]);
    assert_eq!(queue.len().unwrap(), 1);

    clock.advance(Duration::from_secs(100 * 365 * 24 * 60 * 60));
    assert!(queue.pop_next().unwrap().is_none());
}

#[test]
fn huge_delay_saturates_instead_of_overflowing() {
    let clock = MockClock::at_epoch();
    check_huge_delay_never_ready(&memory_queue(&clock), &clock);

    let clock = MockClock::at_epoch();
    let sqlite = ExecutionQueue::new(
        Arc::new(SqliteStore::open_in_memory().unwrap()),
        Arc::new(clock.clone()),
    );
    check_huge_delay_never_ready(&sqlite, &clock);
}

#[test]
fn undecodable_sqlite_row_is_not_lost_on_pop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let clock = MockClock::at_epoch();
    let queue = ExecutionQueue::new(
        Arc::new(SqliteStore::open(&path).unwrap()),
        Arc::new(clock.clone()),
    );
    queue.enqueue(payload(&clock, "mangled"), EnqueueOptions::default()).unwrap();

    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute("UPDATE execution_queue SET payload = 'not json'", [])
        .unwrap();
    drop(raw);

    let err = queue.pop_next().unwrap_err();
    assert!(matches!(err, RunqError::Serialization(_)), "unexpected error: {err:?}");
    assert_eq!(queue.len().unwrap(), 1);
}

#[derive(Debug, Clone)]
struct Item {
    priority: i32,
    enqueue_offset_ms: u64,
    delay_ms: u64,
}

fn item_strategy() -> impl Strategy<Value = Item> {
    (-3..=3i32, 0..1_000u64, 0..1_000u64).prop_map(|(priority, enqueue_offset_ms, delay_ms)| Item {
        priority,
        enqueue_offset_ms,
        delay_ms,
    })
}

fn check_pop_order(queue: &ExecutionQueue, clock: &MockClock, items: &[Item]) {
    let start = clock.now();
    let mut sorted = items.to_vec();
    sorted.sort_by_key(|i| i.enqueue_offset_ms);

    for item in &sorted {
        clock.set(start + chrono::Duration::milliseconds(item.enqueue_offset_ms as i64));
        queue
            .enqueue(
                payload(clock, "prop"),
                EnqueueOptions::default()
                    .priority(item.priority)
                    .delay(Duration::from_millis(item.delay_ms)),
            )
            .unwrap();
    }

    clock.set(start + chrono::Duration::seconds(5));
    let mut popped = Vec::new();
    while let Some(request) = queue.pop_next().unwrap() {
        popped.push(request);
    }

    assert_eq!(popped.len(), items.len());
    for pair in popped.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.priority >= b.priority, "priority went up: {a:?} then {b:?}");
        if a.priority == b.priority {
            assert!(a.ready_at <= b.ready_at, "ready_at went back: {a:?} then {b:?}");
            if a.ready_at == b.ready_at {
                assert!(a.delay <= b.delay, "delay went back: {a:?} then {b:?}");
            }
        }
    }
}

proptest! {
    #[test]
    fn memory_queue_pops_in_schedule_order(items in proptest::collection::vec(item_strategy(), 1..40)) {
        let clock = MockClock::at_epoch();
        let queue = memory_queue(&clock);
        check_pop_order(&queue, &clock, &items);
    }

    #[test]
    fn sqlite_queue_pops_in_schedule_order(items in proptest::collection::vec(item_strategy(), 1..20)) {
        let clock = MockClock::at_epoch();
        let queue = ExecutionQueue::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(clock.clone()),
        );
        check_pop_order(&queue, &clock, &items);
    }
}
