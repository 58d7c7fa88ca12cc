// src/services.rs

//! The shared collaborators every component is built from, wired once from a
//! validated `ConfigFile`.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::ConfigFile;
use crate::errors::Result;
use crate::jobs::{GarbageCollector, Rescheduler};
use crate::liveaction::{LiveActionService, StatusBus};
use crate::lock::{build_lock, Coordinator, DistributedLock};
use crate::policy::{PolicyContext, PolicyEngine, PolicyRegistry};
use crate::queue::ExecutionQueue;
use crate::scheduler::Scheduler;
use crate::storage::Stores;
use crate::transport::ExecutionTransport;

#[derive(Debug, Clone)]
pub struct Services {
    pub config: ConfigFile,
    pub clock: Arc<dyn Clock>,
    pub stores: Stores,
    pub bus: StatusBus,
    pub liveactions: LiveActionService,
    pub queue: ExecutionQueue,
    pub coordinator: Arc<Coordinator>,
    pub lock: Arc<dyn DistributedLock>,
    pub policies: Arc<PolicyEngine>,
}

impl Services {
    /// Wire everything with the built-in policy registry.
    pub fn build(config: ConfigFile, stores: Stores, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::build_with_registry(config, stores, clock, &PolicyRegistry::with_builtin())
    }

    pub fn build_with_registry(
        config: ConfigFile,
        stores: Stores,
        clock: Arc<dyn Clock>,
        registry: &PolicyRegistry,
    ) -> Result<Self> {
        let bus = StatusBus::new();
        let liveactions = LiveActionService::new(stores.liveactions.clone(), bus.clone(), clock.clone());
        let queue = ExecutionQueue::new(stores.queue.clone(), clock.clone());
        let coordinator = Arc::new(Coordinator::from_config(&config.coordination)?);
        let lock = build_lock(
            &config.lock,
            stores.locks.clone(),
            clock.clone(),
            coordinator.clone(),
        );

        let ctx = PolicyContext::new(liveactions.clone(), queue.clone());
        let policies = Arc::new(PolicyEngine::load(&config.policy, registry, ctx)?);

        Ok(Self {
            config,
            clock,
            stores,
            bus,
            liveactions,
            queue,
            coordinator,
            lock,
            policies,
        })
    }

    pub fn scheduler(&self, transport: Arc<dyn ExecutionTransport>) -> Scheduler {
        Scheduler::new(
            self.queue.clone(),
            self.liveactions.clone(),
            self.policies.clone(),
            self.lock.clone(),
            transport,
            self.config.scheduler.clone(),
        )
    }

    pub fn rescheduler(&self) -> Rescheduler {
        Rescheduler::new(
            self.liveactions.clone(),
            self.queue.clone(),
            self.lock.clone(),
            self.config.rescheduler.clone(),
            self.config.lock.timeout,
        )
    }

    pub fn garbage_collector(&self) -> GarbageCollector {
        GarbageCollector::new(
            self.stores.liveactions.clone(),
            self.stores.locks.clone(),
            self.clock.clone(),
            self.lock.clone(),
            self.config.garbage_collector.clone(),
            self.config.lock.timeout,
        )
    }
}
