// src/policy/engine.rs

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use super::registry::PolicyRegistry;
use super::{PolicyContext, PolicyDriver};
use crate::errors::{Result, RunqError};
use crate::model::{LiveAction, PolicyDescriptor};

#[derive(Debug)]
struct Binding {
    resource_ref: String,
    driver: Box<dyn PolicyDriver>,
}

#[derive(Clone, Copy)]
enum Hook {
    Before,
    After,
}

impl Hook {
    fn as_str(self) -> &'static str {
        match self {
            Hook::Before => "apply_before",
            Hook::After => "apply_after",
        }
    }
}

/// Enabled policies, bound to their drivers in configuration order.
///
/// A driver that fails or panics is logged and skipped: its changes are
/// discarded and the remaining drivers still run.
#[derive(Debug)]
pub struct PolicyEngine {
    bindings: Vec<Binding>,
    ctx: PolicyContext,
}

impl PolicyEngine {
    /// Resolve every enabled descriptor. Unknown types and invalid parameters
    /// fail here, never during evaluation.
    pub fn load(
        descriptors: &[PolicyDescriptor],
        registry: &PolicyRegistry,
        ctx: PolicyContext,
    ) -> Result<Self> {
        let mut bindings = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if !descriptor.enabled {
                debug!(policy = %descriptor.name, "skipping disabled policy");
                continue;
            }
            let driver = registry.resolve(descriptor)?;
            bindings.push(Binding {
                resource_ref: descriptor.resource_ref.clone(),
                driver,
            });
        }

        debug!(count = bindings.len(), "policy engine loaded");
        Ok(Self { bindings, ctx })
    }

    /// Engine with no policies.
    pub fn empty(ctx: PolicyContext) -> Self {
        Self {
            bindings: Vec::new(),
            ctx,
        }
    }

    pub fn context(&self) -> &PolicyContext {
        &self.ctx
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn drivers_for<'a>(&'a self, resource_ref: &'a str) -> impl Iterator<Item = &'a dyn PolicyDriver> {
        self.bindings
            .iter()
            .filter(move |b| b.resource_ref == resource_ref)
            .map(|b| b.driver.as_ref())
    }

    pub fn requires_lock(&self, resource_ref: &str) -> bool {
        self.drivers_for(resource_ref).any(|d| d.requires_lock())
    }

    /// Run every before-hook for `resource_ref`. Any of them may move the
    /// liveaction to `delayed`; the rest still run.
    pub fn apply_before(&self, liveaction: LiveAction, resource_ref: &str) -> LiveAction {
        self.apply(Hook::Before, liveaction, resource_ref)
    }

    /// Run every after-hook for `resource_ref` on a terminal liveaction.
    pub fn apply_after(&self, liveaction: LiveAction, resource_ref: &str) -> LiveAction {
        self.apply(Hook::After, liveaction, resource_ref)
    }

    fn apply(&self, hook: Hook, mut liveaction: LiveAction, resource_ref: &str) -> LiveAction {
        for driver in self.drivers_for(resource_ref) {
            let mut candidate = liveaction.clone();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match hook {
                Hook::Before => driver.apply_before(&self.ctx, &mut candidate),
                Hook::After => driver.apply_after(&self.ctx, &mut candidate),
            }));

            let failure = match outcome {
                Ok(Ok(())) => {
                    liveaction = candidate;
                    continue;
                }
                Ok(Err(err @ RunqError::PolicyDriver { .. })) => err,
                Ok(Err(err)) => RunqError::PolicyDriver {
                    policy: driver.policy_ref().to_string(),
                    reason: err.to_string(),
                },
                Err(payload) => RunqError::PolicyDriver {
                    policy: driver.policy_ref().to_string(),
                    reason: format!("panicked: {}", panic_message(payload.as_ref())),
                },
            };

            warn!(
                policy = %driver.policy_ref(),
                hook = hook.as_str(),
                liveaction_id = %liveaction.id,
                action = %resource_ref,
                error = %failure,
                "policy driver failed; ignoring it for this execution"
            );
        }
        liveaction
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
