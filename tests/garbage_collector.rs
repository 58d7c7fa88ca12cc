// tests/garbage_collector.rs

use std::time::Duration;

use chrono::{DateTime, Utc};
use runq::clock::Clock;
use runq::config::GarbageCollectorSection;
use runq::jobs::{GarbageCollector, PeriodicJob, TickOutcome};
use runq::model::LiveAction;
use runq::storage::{LiveActionStore, LockStore};
use runq::types::ExecutionStatus;
use runq_test_utils::builders::{ConfigFileBuilder, LiveActionBuilder};
use runq_test_utils::harness::Harness;
use runq_test_utils::init_tracing;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn record(h: &Harness, status: ExecutionStatus, started: DateTime<Utc>) -> LiveAction {
    let mut builder = LiveActionBuilder::new("core.local", started).status(status);
    if status.is_completed() {
        builder = builder.ended_at(started + chrono::Duration::seconds(5));
    }
    let liveaction = builder.build();
    h.services.liveactions.create(&liveaction).unwrap();
    liveaction
}

fn exists(h: &Harness, liveaction: &LiveAction) -> bool {
    h.store.get_liveaction(&liveaction.id).unwrap().is_some()
}

#[tokio::test]
async fn purges_old_finished_records_and_expired_locks() {
    init_tracing();
    let h = Harness::new(ConfigFileBuilder::new().executions_ttl(DAY * 3).build());
    let start = h.clock.now();

    let old_done = record(&h, ExecutionStatus::Succeeded, start);
    let old_failed = record(&h, ExecutionStatus::Failed, start);
    let old_running = record(&h, ExecutionStatus::Running, start);

    // Abandoned by a crashed process; expires after the lock ttl.
    let _abandoned = h
        .services
        .lock
        .acquire("core.http", false, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();

    h.clock.advance(DAY * 4);
    let recent_done = record(&h, ExecutionStatus::Succeeded, h.clock.now());

    let outcome = h.services.garbage_collector().tick().await.unwrap();
    // Two liveactions and one lock row.
    assert_eq!(outcome, TickOutcome::Completed { processed: 3, failed: 0 });

    assert!(!exists(&h, &old_done));
    assert!(!exists(&h, &old_failed));
    assert!(exists(&h, &old_running));
    assert!(exists(&h, &recent_done));
    assert!(h.store.live_lock("core.http", h.clock.now()).unwrap().is_none());
    assert_eq!(h.store.purge_expired_locks(h.clock.now()).unwrap(), 0);
}

#[tokio::test]
async fn purge_incomplete_also_removes_stuck_records() {
    let h = Harness::new(
        ConfigFileBuilder::new()
            .executions_ttl(DAY)
            .purge_incomplete(true)
            .build(),
    );
    let start = h.clock.now();
    let stuck = record(&h, ExecutionStatus::Running, start);
    let waiting = record(&h, ExecutionStatus::Delayed, start);

    h.clock.advance(DAY * 2);
    let fresh = record(&h, ExecutionStatus::Running, h.clock.now());

    let outcome = h.services.garbage_collector().tick().await.unwrap();
    assert_eq!(outcome, TickOutcome::Completed { processed: 2, failed: 0 });
    assert!(!exists(&h, &stuck));
    assert!(!exists(&h, &waiting));
    assert!(exists(&h, &fresh));
}

#[tokio::test]
async fn tick_is_skipped_while_the_job_lock_is_held() {
    let h = Harness::new(ConfigFileBuilder::new().executions_ttl(DAY).build());
    let old = record(&h, ExecutionStatus::Succeeded, h.clock.now());
    h.clock.advance(DAY * 2);

    let lock_name = h.services.config.garbage_collector.lock_name.clone();
    let held = h
        .services
        .lock
        .acquire(&lock_name, false, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();

    let gc = h.services.garbage_collector();
    assert_eq!(gc.tick().await.unwrap(), TickOutcome::Skipped);
    assert!(exists(&h, &old));

    h.services.lock.release(&held).await.unwrap();
    assert_eq!(
        gc.tick().await.unwrap(),
        TickOutcome::Completed { processed: 1, failed: 0 }
    );
}

#[tokio::test]
async fn ttl_below_one_day_is_raised_to_one_day() {
    init_tracing();
    let h = Harness::new(ConfigFileBuilder::new().build());
    let section = GarbageCollectorSection {
        executions_ttl: Duration::from_secs(60 * 60),
        ..GarbageCollectorSection::default()
    };
    let gc = GarbageCollector::new(
        h.services.stores.liveactions.clone(),
        h.services.stores.locks.clone(),
        h.services.clock.clone(),
        h.services.lock.clone(),
        section,
        Duration::from_secs(1),
    );

    let done = record(&h, ExecutionStatus::Succeeded, h.clock.now());

    // Older than the configured hour but younger than a day: kept.
    h.clock.advance(Duration::from_secs(2 * 60 * 60));
    assert_eq!(gc.tick().await.unwrap(), TickOutcome::Completed { processed: 0, failed: 0 });
    assert!(exists(&h, &done));

    h.clock.advance(DAY);
    assert_eq!(gc.tick().await.unwrap(), TickOutcome::Completed { processed: 1, failed: 0 });
    assert!(!exists(&h, &done));
}
