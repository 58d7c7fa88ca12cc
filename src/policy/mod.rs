// src/policy/mod.rs

//! Policy drivers applied right before an execution is dispatched and right
//! after a runner reports its terminal state.
//!
//! - [`registry`] maps `policy_type` identifiers to driver factories.
//! - [`engine`] binds configured descriptors to drivers and evaluates them.
//! - [`concurrency`] and [`retry`] are the built-in drivers.

use std::fmt::Debug;

use crate::errors::Result;
use crate::liveaction::LiveActionService;
use crate::model::LiveAction;
use crate::queue::ExecutionQueue;

pub mod concurrency;
pub mod engine;
pub mod registry;
pub mod retry;

pub use concurrency::ConcurrencyPolicy;
pub use engine::PolicyEngine;
pub use registry::{DriverFactory, PolicyRegistry};
pub use retry::RetryPolicy;

/// Collaborators a driver may use while evaluating.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub liveactions: LiveActionService,
    pub queue: ExecutionQueue,
}

impl PolicyContext {
    pub fn new(liveactions: LiveActionService, queue: ExecutionQueue) -> Self {
        Self { liveactions, queue }
    }
}

/// One policy bound to one resource.
///
/// Drivers change the liveaction in place; the engine persists the outcome.
/// Both hooks default to doing nothing.
pub trait PolicyDriver: Send + Sync + Debug {
    /// Name of the descriptor this driver was built from.
    fn policy_ref(&self) -> &str;

    /// Whether evaluation must happen under a per-resource lock so that two
    /// schedulers do not both admit work against the same limit.
    fn requires_lock(&self) -> bool {
        false
    }

    fn apply_before(&self, _ctx: &PolicyContext, _liveaction: &mut LiveAction) -> Result<()> {
        Ok(())
    }

    fn apply_after(&self, _ctx: &PolicyContext, _liveaction: &mut LiveAction) -> Result<()> {
        Ok(())
    }
}
