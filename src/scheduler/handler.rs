// src/scheduler/handler.rs

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::scheduler_step::SchedulerStep;
use crate::config::SchedulerSection;
use crate::errors::{Result, RunqError};
use crate::liveaction::LiveActionService;
use crate::lock::DistributedLock;
use crate::model::{EnqueueOptions, ExecutionRequest, LiveAction};
use crate::policy::PolicyEngine;
use crate::queue::ExecutionQueue;
use crate::transport::ExecutionTransport;
use crate::types::ExecutionStatus;

/// Outcome of the policy stage for one liveaction.
enum Regulated {
    Ready(LiveAction),
    Delayed,
    Canceled,
}

/// Pops eligible requests, runs the pre-run policies and hands what is left
/// to the transport.
///
/// Several schedulers (tasks or processes) may share one queue; the atomic
/// pop is what keeps them from handling the same request twice.
pub struct Scheduler {
    queue: ExecutionQueue,
    liveactions: LiveActionService,
    policies: Arc<PolicyEngine>,
    lock: Arc<dyn DistributedLock>,
    transport: Arc<dyn ExecutionTransport>,
    options: SchedulerSection,
    dispatched: AtomicUsize,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queue", &self.queue)
            .field("policies", &self.policies)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        queue: ExecutionQueue,
        liveactions: LiveActionService,
        policies: Arc<PolicyEngine>,
        lock: Arc<dyn DistributedLock>,
        transport: Arc<dyn ExecutionTransport>,
        options: SchedulerSection,
    ) -> Self {
        Self {
            queue,
            liveactions,
            policies,
            lock,
            transport,
            options,
            dispatched: AtomicUsize::new(0),
        }
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    /// Number of requests handed to the transport so far.
    pub fn dispatched_count(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Pop and handle at most one request.
    pub async fn process_next(&self) -> Result<SchedulerStep> {
        match self.queue.pop_next()? {
            Some(request) => self.process(request).await,
            None => Ok(SchedulerStep::Idle),
        }
    }

    /// Handle an already popped request.
    ///
    /// A request that cannot be scheduled is put back on the queue rather than
    /// lost; only a failure to do even that is returned.
    pub async fn process(&self, request: ExecutionRequest) -> Result<SchedulerStep> {
        match self.schedule(&request).await {
            Ok(step) => Ok(step),
            Err(err) => {
                warn!(
                    execution_id = %request.id,
                    liveaction_id = %request.liveaction_id(),
                    error = %err,
                    "failed to schedule execution; re-enqueueing"
                );
                self.requeue(&request, request.payload.clone())?;
                Ok(SchedulerStep::Requeued {
                    liveaction_id: request.liveaction_id().to_string(),
                })
            }
        }
    }

    async fn schedule(&self, request: &ExecutionRequest) -> Result<SchedulerStep> {
        let resource_ref = request.resource_ref().to_string();
        let liveaction = self
            .liveactions
            .get(request.liveaction_id())?
            .unwrap_or_else(|| request.payload.clone());
        let liveaction_id = liveaction.id.clone();

        if liveaction.status.is_completed() {
            info!(
                execution_id = %request.id,
                %liveaction_id,
                status = %liveaction.status,
                "liveaction already completed; dropping request"
            );
            return Ok(SchedulerStep::Dropped { liveaction_id });
        }

        let regulated = if self.policies.requires_lock(&resource_ref) {
            self.regulate_locked(liveaction, &resource_ref).await?
        } else {
            self.regulate(liveaction, &resource_ref)?
        };

        match regulated {
            Regulated::Ready(liveaction) => self.dispatch(request, liveaction).await,
            Regulated::Delayed => Ok(SchedulerStep::Delayed { liveaction_id }),
            Regulated::Canceled => Ok(SchedulerStep::Canceled { liveaction_id }),
        }
    }

    /// Run the policy stage while holding the resource lock. When another
    /// scheduler holds it, the liveaction is delayed instead.
    async fn regulate_locked(&self, mut liveaction: LiveAction, resource_ref: &str) -> Result<Regulated> {
        let Some(lock) = self.lock.acquire(resource_ref, false, Duration::ZERO).await? else {
            debug!(
                liveaction_id = %liveaction.id,
                action = %resource_ref,
                "resource lock busy; delaying execution"
            );
            self.liveactions
                .update_status(&mut liveaction, ExecutionStatus::Delayed)?;
            return Ok(Regulated::Delayed);
        };

        let regulated = self.regulate(liveaction, resource_ref);

        if let Err(err) = self.lock.release(&lock).await {
            error!(lock = %lock.name, error = %err, "failed to release resource lock");
        }
        regulated
    }

    fn regulate(&self, liveaction: LiveAction, resource_ref: &str) -> Result<Regulated> {
        let previous = liveaction.status;
        let mut liveaction = self.policies.apply_before(liveaction, resource_ref);

        match liveaction.status {
            ExecutionStatus::Delayed => {
                self.liveactions.commit_status(&mut liveaction, previous)?;
                Ok(Regulated::Delayed)
            }
            status if status.is_completed() => {
                self.liveactions.commit_status(&mut liveaction, previous)?;
                Ok(Regulated::Canceled)
            }
            _ => {
                liveaction.status = previous;
                self.liveactions
                    .update_status(&mut liveaction, ExecutionStatus::Scheduled)?;
                Ok(Regulated::Ready(liveaction))
            }
        }
    }

    async fn dispatch(&self, request: &ExecutionRequest, mut liveaction: LiveAction) -> Result<SchedulerStep> {
        let liveaction_id = liveaction.id.clone();
        let mut outbound = request.clone();
        outbound.payload = liveaction.clone();

        match self.transport.dispatch(outbound).await {
            Ok(()) => {
                self.dispatched.fetch_add(1, Ordering::SeqCst);
                info!(
                    execution_id = %request.id,
                    %liveaction_id,
                    action = %liveaction.action,
                    "dispatched execution"
                );
                Ok(SchedulerStep::Dispatched { liveaction_id })
            }
            Err(err) => {
                warn!(
                    execution_id = %request.id,
                    %liveaction_id,
                    error = %err,
                    "dispatch failed; returning execution to the queue"
                );
                self.liveactions
                    .update_status(&mut liveaction, ExecutionStatus::Requested)?;
                self.requeue(request, liveaction)?;
                Ok(SchedulerStep::Requeued { liveaction_id })
            }
        }
    }

    /// Put `payload` back with no added delay, keeping priority and affinity.
    fn requeue(&self, request: &ExecutionRequest, payload: LiveAction) -> Result<()> {
        let options = EnqueueOptions {
            delay: Duration::ZERO,
            priority: request.priority,
            affinity: request.affinity.clone(),
        };
        self.queue.enqueue(payload, options)?;
        Ok(())
    }

    /// Apply the after-policies to a liveaction a runner reported as finished.
    pub fn handle_completion(&self, liveaction: LiveAction) -> Result<LiveAction> {
        let resource_ref = liveaction.resource_ref().to_string();
        let before = liveaction.clone();
        let after = self.policies.apply_after(liveaction, &resource_ref);

        if after != before {
            self.liveactions.store().update_liveaction(&after)?;
        }
        debug!(liveaction_id = %after.id, status = %after.status, "handled completion");
        Ok(after)
    }

    /// Handle requests until nothing is eligible. Returns how many were handled.
    pub async fn drain(&self) -> Result<usize> {
        let mut handled = 0;
        while !self.process_next().await?.is_idle() {
            handled += 1;
        }
        Ok(handled)
    }

    /// Main loop: at most `pool_size` requests in flight, polling every
    /// `poll_interval` when idle and backing off while storage is down.
    ///
    /// Returns once `shutdown` flips to `true` (or its sender is dropped) and
    /// the in-flight requests have finished.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.options.pool_size));
        let mut backoff = Backoff::from_config(&self.options);
        let mut workers = JoinSet::new();

        info!(pool_size = self.options.pool_size, "scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            while let Some(joined) = workers.try_join_next() {
                log_worker_exit(joined);
            }

            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => {
                    permit.map_err(|e| RunqError::Other(e.into()))?
                }
                _ = shutdown.changed() => break,
            };

            let wait = match self.queue.pop_next() {
                Ok(Some(request)) => {
                    backoff.reset();
                    let this = self.clone();
                    workers.spawn(async move {
                        let _permit = permit;
                        let execution_id = request.id.clone();
                        if let Err(err) = this.process(request).await {
                            error!(%execution_id, error = %err, "execution request lost");
                        }
                    });
                    continue;
                }
                Ok(None) => {
                    backoff.reset();
                    self.options.poll_interval
                }
                Err(err @ RunqError::StorageUnavailable(_)) => {
                    let wait = backoff.next_delay();
                    warn!(error = %err, wait_ms = wait.as_millis() as u64, "queue unavailable; backing off");
                    wait
                }
                Err(err) => {
                    error!(error = %err, "failed to pop from queue");
                    self.options.poll_interval
                }
            };
            drop(permit);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(in_flight = workers.len(), "scheduler stopping");
        while let Some(joined) = workers.join_next().await {
            log_worker_exit(joined);
        }
        info!("scheduler stopped");
        Ok(())
    }
}

fn log_worker_exit(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        error!(error = %err, "scheduler worker panicked");
    }
}
