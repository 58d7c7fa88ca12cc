// src/jobs/mod.rs

//! Periodic maintenance jobs, each guarded by a named `DistributedLock` so
//! only one process in the fleet runs a given tick.
//!
//! - [`rescheduler`] requeues executions stuck in `delayed`.
//! - [`garbage_collector`] purges old liveactions and expired lock rows.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, RunqError};
use crate::lock::DistributedLock;

pub mod garbage_collector;
pub mod rescheduler;

pub use garbage_collector::GarbageCollector;
pub use rescheduler::Rescheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another process holds the job lock.
    Skipped,
    Completed { processed: usize, failed: usize },
}

#[async_trait]
pub trait PeriodicJob: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn tick(&self) -> Result<TickOutcome>;
}

/// Run `body` while holding the lock `name`; skip the tick if it is taken.
///
/// A failed release is returned even when `body` succeeded.
pub(crate) async fn with_job_lock<F>(
    lock: &dyn DistributedLock,
    name: &str,
    timeout: Duration,
    body: F,
) -> Result<TickOutcome>
where
    F: FnOnce() -> Result<TickOutcome> + Send,
{
    let held = match lock.acquire(name, false, timeout).await {
        Ok(Some(held)) => held,
        Ok(None) | Err(RunqError::LockTimeout { .. }) => {
            debug!(lock = %name, "job lock held elsewhere; skipping tick");
            return Ok(TickOutcome::Skipped);
        }
        Err(err) => return Err(err),
    };

    let outcome = body();

    if let Err(err) = lock.release(&held).await {
        error!(lock = %name, error = %err, "failed to release job lock");
        return Err(err);
    }
    outcome
}

/// Tick `job` every `job.interval()` until `shutdown` flips to `true`.
pub async fn run_periodic(job: Arc<dyn PeriodicJob>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(job.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(job = %job.name(), interval_ms = job.interval().as_millis() as u64, "periodic job started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        match job.tick().await {
            Ok(outcome) => debug!(job = %job.name(), ?outcome, "tick finished"),
            Err(err) => warn!(job = %job.name(), error = %err, "tick failed"),
        }
    }

    info!(job = %job.name(), "periodic job stopped");
}
