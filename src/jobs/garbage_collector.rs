// src/jobs/garbage_collector.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{with_job_lock, PeriodicJob, TickOutcome};
use crate::clock::{self, Clock};
use crate::config::validate::MINIMUM_EXECUTIONS_TTL;
use crate::config::GarbageCollectorSection;
use crate::errors::Result;
use crate::lock::DistributedLock;
use crate::storage::{LiveActionStore, LockStore};

/// Purges finished liveactions older than `executions_ttl` and lock rows
/// past their expiry.
#[derive(Debug, Clone)]
pub struct GarbageCollector {
    liveactions: Arc<dyn LiveActionStore>,
    locks: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    lock: Arc<dyn DistributedLock>,
    section: GarbageCollectorSection,
    lock_timeout: Duration,
}

impl GarbageCollector {
    pub fn new(
        liveactions: Arc<dyn LiveActionStore>,
        locks: Arc<dyn LockStore>,
        clock: Arc<dyn Clock>,
        lock: Arc<dyn DistributedLock>,
        mut section: GarbageCollectorSection,
        lock_timeout: Duration,
    ) -> Self {
        if section.executions_ttl < MINIMUM_EXECUTIONS_TTL {
            warn!(
                ttl_secs = section.executions_ttl.as_secs(),
                "executions_ttl below one day; using one day"
            );
            section.executions_ttl = MINIMUM_EXECUTIONS_TTL;
        }
        Self {
            liveactions,
            locks,
            clock,
            lock,
            section,
            lock_timeout,
        }
    }

    fn collect(&self) -> Result<TickOutcome> {
        let now = self.clock.now();
        let cutoff = clock::saturating_sub(now, self.section.executions_ttl);

        let mut processed = 0;
        let mut failed = 0;

        match self
            .liveactions
            .purge_liveactions(cutoff, self.section.purge_incomplete)
        {
            Ok(purged) => processed += purged,
            Err(err) => {
                failed += 1;
                warn!(error = %err, "failed to purge liveactions");
            }
        }

        match self.locks.purge_expired_locks(now) {
            Ok(purged) => processed += purged,
            Err(err) => {
                failed += 1;
                warn!(error = %err, "failed to purge expired locks");
            }
        }

        if processed > 0 {
            info!(processed, %cutoff, "garbage collected records");
        }
        Ok(TickOutcome::Completed { processed, failed })
    }
}

#[async_trait]
impl PeriodicJob for GarbageCollector {
    fn name(&self) -> &str {
        "garbage-collector"
    }

    fn interval(&self) -> Duration {
        self.section.interval
    }

    async fn tick(&self) -> Result<TickOutcome> {
        with_job_lock(
            self.lock.as_ref(),
            &self.section.lock_name,
            self.lock_timeout,
            || self.collect(),
        )
        .await
    }
}
