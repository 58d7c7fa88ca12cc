// src/queue/mod.rs

//! Durable queue of pending execution requests.
//!
//! The queue itself holds no state: ordering and the atomic pop live in the
//! [`QueueStore`], so every task and every process sharing the store sees the
//! same queue.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::clock::Clock;
use crate::errors::Result;
use crate::model::{EnqueueOptions, ExecutionRequest, LiveAction};
use crate::storage::QueueStore;

#[derive(Debug, Clone)]
pub struct ExecutionQueue {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
}

impl ExecutionQueue {
    pub fn new(store: Arc<dyn QueueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persist a new request for `payload`, eligible at `now + options.delay`.
    pub fn enqueue(&self, payload: LiveAction, options: EnqueueOptions) -> Result<ExecutionRequest> {
        let request = ExecutionRequest::new(payload, options, self.clock.now());
        self.store.insert_request(&request)?;

        debug!(
            execution_id = %request.id,
            liveaction_id = %request.liveaction_id(),
            action = %request.resource_ref(),
            priority = request.priority,
            delay_ms = request.delay.as_millis() as u64,
            "enqueued execution request"
        );
        Ok(request)
    }

    /// Remove and return the next eligible request, if any.
    ///
    /// A request is handed out by exactly one successful call, across every
    /// caller sharing the underlying store.
    pub fn pop_next(&self) -> Result<Option<ExecutionRequest>> {
        let popped = self.store.pop_ready(self.clock.now())?;
        if let Some(request) = &popped {
            trace!(execution_id = %request.id, "popped execution request");
        }
        Ok(popped)
    }

    /// Number of queued requests, eligible or not.
    pub fn len(&self) -> Result<usize> {
        self.store.queued_count()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
