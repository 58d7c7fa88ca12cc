// src/policy/retry.rs

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{PolicyContext, PolicyDriver};
use crate::errors::{Result, RunqError};
use crate::model::{EnqueueOptions, LiveAction, PolicyDescriptor};
use crate::types::RetryOn;

/// Context path holding the attempt counter of a retried liveaction.
pub const ATTEMPT_PATH: &str = "policies.retry.attempt";

/// Context path pointing a retry at the liveaction it replaces.
pub const PARENT_PATH: &str = "parent";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Parameters {
    retry_on: RetryOn,
    max_retry_count: u32,
    #[serde(default)]
    delay: u64,
}

/// Re-runs an action that ended in a matching terminal state, up to
/// `max_retry_count` times, by creating and enqueuing a fresh liveaction.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    name: String,
    retry_on: RetryOn,
    max_retry_count: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(name: impl Into<String>, retry_on: RetryOn, max_retry_count: u32, delay: Duration) -> Self {
        Self {
            name: name.into(),
            retry_on,
            max_retry_count,
            delay,
        }
    }

    pub fn factory(descriptor: &PolicyDescriptor) -> Result<Box<dyn PolicyDriver>> {
        let params: Parameters =
            serde_json::from_value(descriptor.parameters.clone()).map_err(|e| {
                RunqError::Config(format!(
                    "policy '{}': invalid retry parameters: {e}",
                    descriptor.name
                ))
            })?;

        Ok(Box::new(Self::new(
            descriptor.name.clone(),
            params.retry_on,
            params.max_retry_count,
            Duration::from_secs(params.delay),
        )))
    }
}

/// Attempt number recorded on `liveaction`; the first run is attempt 0.
pub fn attempt_of(liveaction: &LiveAction) -> u64 {
    liveaction
        .context_value(ATTEMPT_PATH)
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

impl PolicyDriver for RetryPolicy {
    fn policy_ref(&self) -> &str {
        &self.name
    }

    fn apply_after(&self, ctx: &PolicyContext, liveaction: &mut LiveAction) -> Result<()> {
        if !self.retry_on.matches(liveaction.status) {
            return Ok(());
        }

        let attempt = attempt_of(liveaction);
        if attempt >= u64::from(self.max_retry_count) {
            debug!(
                policy = %self.name,
                liveaction_id = %liveaction.id,
                attempt,
                "retry limit reached"
            );
            return Ok(());
        }

        let now = ctx.liveactions.clock().now();
        let mut retry = LiveAction::new(liveaction.action.clone(), liveaction.parameters.clone(), now);
        retry.context = liveaction.context.clone();
        retry.set_context_value(ATTEMPT_PATH, Value::from(attempt + 1));
        retry.set_context_value(PARENT_PATH, Value::from(liveaction.id.clone()));

        ctx.liveactions.create(&retry)?;
        ctx.queue
            .enqueue(retry.clone(), EnqueueOptions::default().delay(self.delay))?;

        info!(
            policy = %self.name,
            liveaction_id = %liveaction.id,
            retry_id = %retry.id,
            attempt = attempt + 1,
            delay_secs = self.delay.as_secs(),
            "retrying execution"
        );
        Ok(())
    }
}
