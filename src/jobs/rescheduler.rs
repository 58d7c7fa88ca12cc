// src/jobs/rescheduler.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{with_job_lock, PeriodicJob, TickOutcome};
use crate::clock;
use crate::config::ReschedulerSection;
use crate::errors::Result;
use crate::liveaction::LiveActionService;
use crate::lock::DistributedLock;
use crate::model::{EnqueueOptions, LiveAction};
use crate::queue::ExecutionQueue;
use crate::types::ExecutionStatus;

/// Returns executions that have sat in `delayed` longer than the recovery
/// threshold to the queue, as fresh `requested` work.
#[derive(Debug, Clone)]
pub struct Rescheduler {
    liveactions: LiveActionService,
    queue: ExecutionQueue,
    lock: Arc<dyn DistributedLock>,
    section: ReschedulerSection,
    lock_timeout: Duration,
}

impl Rescheduler {
    pub fn new(
        liveactions: LiveActionService,
        queue: ExecutionQueue,
        lock: Arc<dyn DistributedLock>,
        section: ReschedulerSection,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            liveactions,
            queue,
            lock,
            section,
            lock_timeout,
        }
    }

    fn recover(&self) -> Result<TickOutcome> {
        let now = self.liveactions.clock().now();
        let cutoff = clock::saturating_sub(now, self.section.recovery_threshold);
        let stale = self
            .liveactions
            .store()
            .query_liveactions(ExecutionStatus::Delayed, cutoff)?;

        let mut processed = 0;
        let mut failed = 0;
        for liveaction in stale {
            let liveaction_id = liveaction.id.clone();
            match self.reschedule(liveaction) {
                Ok(()) => processed += 1,
                Err(err) => {
                    failed += 1;
                    warn!(%liveaction_id, error = %err, "failed to reschedule delayed execution");
                }
            }
        }

        if processed + failed > 0 {
            info!(processed, failed, "rescheduled delayed executions");
        }
        Ok(TickOutcome::Completed { processed, failed })
    }

    fn reschedule(&self, mut liveaction: LiveAction) -> Result<()> {
        self.liveactions
            .update_status(&mut liveaction, ExecutionStatus::Requested)?;

        if let Err(err) = self
            .queue
            .enqueue(liveaction.clone(), EnqueueOptions::default())
        {
            // Only delayed records are scanned, so put it back for the next tick.
            if let Err(revert) = self
                .liveactions
                .update_status(&mut liveaction, ExecutionStatus::Delayed)
            {
                warn!(
                    liveaction_id = %liveaction.id,
                    error = %revert,
                    "failed to return execution to delayed"
                );
            }
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl PeriodicJob for Rescheduler {
    fn name(&self) -> &str {
        "rescheduler"
    }

    fn interval(&self) -> Duration {
        self.section.interval
    }

    async fn tick(&self) -> Result<TickOutcome> {
        with_job_lock(
            self.lock.as_ref(),
            &self.section.lock_name,
            self.lock_timeout,
            || self.recover(),
        )
        .await
    }
}
