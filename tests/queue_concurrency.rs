// tests/queue_concurrency.rs

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use runq::clock::mock::MockClock;
use runq::clock::Clock;
use runq::model::{EnqueueOptions, LiveAction};
use runq::queue::ExecutionQueue;
use runq::storage::{MemoryStore, QueueStore, SqliteStore};
use serde_json::json;
use tempfile::TempDir;

const ITEMS: usize = 200;
const WORKERS: usize = 8;

fn fill(queue: &ExecutionQueue, clock: &MockClock) -> HashSet<String> {
    (0..ITEMS)
        .map(|i| {
            let la = LiveAction::new(format!("job.{i}"), json!({}), clock.now());
            queue
                .enqueue(la, EnqueueOptions::default().priority((i % 3) as i32))
                .unwrap()
                .id
        })
        .collect()
}

/// Race `WORKERS` threads, each popping from its own queue handle until empty.
fn race(queues: Vec<ExecutionQueue>) -> Vec<String> {
    let handles: Vec<_> = queues
        .into_iter()
        .map(|queue| {
            thread::spawn(move || {
                let mut mine = Vec::new();
                while let Some(request) = queue.pop_next().unwrap() {
                    mine.push(request.id);
                }
                mine
            })
        })
        .collect();

    handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect()
}

fn assert_each_popped_once(expected: &HashSet<String>, popped: &[String]) {
    assert_eq!(popped.len(), expected.len(), "some item popped twice or lost");
    let unique: HashSet<_> = popped.iter().cloned().collect();
    assert_eq!(&unique, expected);
}

#[test]
fn memory_queue_hands_each_item_to_exactly_one_caller() {
    let clock = MockClock::at_epoch();
    let store = Arc::new(MemoryStore::new());
    let queue = ExecutionQueue::new(store.clone(), Arc::new(clock.clone()));
    let expected = fill(&queue, &clock);

    let queues = (0..WORKERS).map(|_| queue.clone()).collect();
    let popped = race(queues);

    assert_each_popped_once(&expected, &popped);
    assert_eq!(store.queued_count().unwrap(), 0);
}

#[test]
fn sqlite_queue_hands_each_item_to_exactly_one_connection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue.db");
    let clock = MockClock::at_epoch();

    let seed = ExecutionQueue::new(Arc::new(SqliteStore::open(&path).unwrap()), Arc::new(clock.clone()));
    let expected = fill(&seed, &clock);

    // One connection per worker, like separate scheduler processes.
    let queues = (0..WORKERS)
        .map(|_| {
            let store = SqliteStore::open(&path).unwrap();
            ExecutionQueue::new(Arc::new(store), Arc::new(clock.clone()))
        })
        .collect();
    let popped = race(queues);

    assert_each_popped_once(&expected, &popped);
    assert!(seed.is_empty().unwrap());
}
