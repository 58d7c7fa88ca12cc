// src/model/request.rs

use std::cmp::{Ordering, Reverse};
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};

use super::LiveAction;
use crate::types::ExecutionStatus;

/// Largest delay kept on a request; storage encodes it as a signed integer.
pub const MAX_DELAY_MILLIS: u64 = i64::MAX as u64;

/// Knobs accepted by `ExecutionQueue::enqueue`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub delay: Duration,
    pub priority: i32,
    pub affinity: Option<String>,
}

impl EnqueueOptions {
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn affinity(mut self, affinity: impl Into<String>) -> Self {
        self.affinity = Some(affinity.into());
        self
    }
}

/// A snapshot of one unit of schedulable work.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub id: String,
    pub payload: LiveAction,
    /// Eligible only once `now >= ready_at`.
    pub ready_at: DateTime<Utc>,
    pub delay: Duration,
    /// Higher is scheduled first.
    pub priority: i32,
    /// Opaque routing hint for collaborating components.
    pub affinity: Option<String>,
}

impl ExecutionRequest {
    pub fn new(payload: LiveAction, options: EnqueueOptions, now: DateTime<Utc>) -> Self {
        // Delays at millisecond and timestamps at microsecond precision so
        // every backend orders them identically. Oversized delays saturate:
        // the request stays queued but never becomes ready.
        let millis = u64::try_from(options.delay.as_millis())
            .unwrap_or(u64::MAX)
            .min(MAX_DELAY_MILLIS);
        let delay = Duration::from_millis(millis);
        Self {
            id: super::new_id(),
            payload,
            ready_at: crate::clock::saturating_add(now, delay).trunc_subsecs(6),
            delay,
            priority: options.priority,
            affinity: options.affinity,
        }
    }

    pub fn liveaction_id(&self) -> &str {
        &self.payload.id
    }

    pub fn resource_ref(&self) -> &str {
        self.payload.resource_ref()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.payload.status
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.ready_at <= now
    }

    /// Scheduling order key: priority descending, then `ready_at` ascending,
    /// then `delay` ascending. Smaller keys are popped first.
    pub fn schedule_key(&self) -> (Reverse<i32>, DateTime<Utc>, Duration) {
        (Reverse(self.priority), self.ready_at, self.delay)
    }

    /// Compare two requests by scheduling order.
    pub fn schedule_cmp(&self, other: &Self) -> Ordering {
        self.schedule_key().cmp(&other.schedule_key())
    }
}
