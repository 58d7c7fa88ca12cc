// src/policy/concurrency.rs

use serde::Deserialize;
use tracing::info;

use super::{PolicyContext, PolicyDriver};
use crate::errors::{Result, RunqError};
use crate::model::{LiveAction, PolicyDescriptor};
use crate::types::{ConcurrencyAction, ExecutionStatus};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Parameters {
    threshold: u64,
    #[serde(default)]
    action: ConcurrencyAction,
}

/// Caps how many executions of one action may be `scheduled` or `running`
/// at once. Executions over the cap are delayed (or canceled).
#[derive(Debug, Clone)]
pub struct ConcurrencyPolicy {
    name: String,
    threshold: u64,
    action: ConcurrencyAction,
}

impl ConcurrencyPolicy {
    pub fn new(name: impl Into<String>, threshold: u64, action: ConcurrencyAction) -> Self {
        Self {
            name: name.into(),
            threshold,
            action,
        }
    }

    pub fn factory(descriptor: &PolicyDescriptor) -> Result<Box<dyn PolicyDriver>> {
        let params: Parameters =
            serde_json::from_value(descriptor.parameters.clone()).map_err(|e| {
                RunqError::Config(format!(
                    "policy '{}': invalid concurrency parameters: {e}",
                    descriptor.name
                ))
            })?;

        if params.threshold == 0 {
            return Err(RunqError::Config(format!(
                "policy '{}': threshold must be at least 1",
                descriptor.name
            )));
        }

        Ok(Box::new(Self::new(
            descriptor.name.clone(),
            params.threshold,
            params.action,
        )))
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl PolicyDriver for ConcurrencyPolicy {
    fn policy_ref(&self) -> &str {
        &self.name
    }

    fn requires_lock(&self) -> bool {
        true
    }

    fn apply_before(&self, ctx: &PolicyContext, liveaction: &mut LiveAction) -> Result<()> {
        let active = ctx
            .liveactions
            .store()
            .count_liveactions(&liveaction.action, &ExecutionStatus::ACTIVE)?;

        if (active as u64) < self.threshold {
            return Ok(());
        }

        let status = match self.action {
            ConcurrencyAction::Delay => ExecutionStatus::Delayed,
            ConcurrencyAction::Cancel => ExecutionStatus::Canceled,
        };
        info!(
            policy = %self.name,
            liveaction_id = %liveaction.id,
            action = %liveaction.action,
            active,
            threshold = self.threshold,
            %status,
            "concurrency threshold reached"
        );
        liveaction.status = status;
        Ok(())
    }
}
