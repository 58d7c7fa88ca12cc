// src/policy/registry.rs

use std::collections::BTreeMap;

use super::concurrency::ConcurrencyPolicy;
use super::retry::RetryPolicy;
use super::PolicyDriver;
use crate::errors::{Result, RunqError};
use crate::model::PolicyDescriptor;

/// Builds a driver from its descriptor, rejecting bad parameters.
pub type DriverFactory = fn(&PolicyDescriptor) -> Result<Box<dyn PolicyDriver>>;

/// `policy_type` -> factory table, populated once at startup.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `concurrency` and `retry` drivers under both their
    /// short and `action.`-prefixed identifiers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("concurrency", ConcurrencyPolicy::factory);
        registry.register("action.concurrency", ConcurrencyPolicy::factory);
        registry.register("retry", RetryPolicy::factory);
        registry.register("action.retry", RetryPolicy::factory);
        registry
    }

    /// Add or replace the factory for `policy_type`.
    pub fn register(&mut self, policy_type: impl Into<String>, factory: DriverFactory) {
        self.factories.insert(policy_type.into(), factory);
    }

    pub fn policy_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn resolve(&self, descriptor: &PolicyDescriptor) -> Result<Box<dyn PolicyDriver>> {
        let factory = self.factories.get(&descriptor.policy_type).ok_or_else(|| {
            RunqError::Config(format!(
                "policy '{}' has unknown policy_type '{}'",
                descriptor.name, descriptor.policy_type
            ))
        })?;
        factory(descriptor)
    }
}
