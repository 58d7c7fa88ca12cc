#![allow(dead_code)]

use std::sync::Arc;

use runq::clock::Clock;
use runq::clock::mock::MockClock;
use runq::config::ConfigFile;
use runq::model::{EnqueueOptions, ExecutionRequest, LiveAction};
use runq::policy::PolicyRegistry;
use runq::scheduler::Scheduler;
use runq::services::Services;
use runq::storage::{MemoryStore, Stores};

use crate::builders::LiveActionBuilder;
use crate::fake_transport::RecordingTransport;

/// Everything a scheduling test needs, over one in-memory store and a
/// manually driven clock.
pub struct Harness {
    pub clock: MockClock,
    pub store: Arc<MemoryStore>,
    pub services: Services,
    pub transport: RecordingTransport,
    pub scheduler: Scheduler,
}

impl Harness {
    pub fn new(config: ConfigFile) -> Self {
        Self::with_transport(config, RecordingTransport::new())
    }

    pub fn with_transport(config: ConfigFile, transport: RecordingTransport) -> Self {
        Self::build(config, transport, &PolicyRegistry::with_builtin())
    }

    pub fn build(config: ConfigFile, transport: RecordingTransport, registry: &PolicyRegistry) -> Self {
        let clock = MockClock::at_epoch();
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::from_backend(store.clone());
        let services = Services::build_with_registry(config, stores, Arc::new(clock.clone()), registry)
            .expect("services should build");
        let scheduler = services.scheduler(Arc::new(transport.clone()));

        Self {
            clock,
            store,
            services,
            transport,
            scheduler,
        }
    }

    /// Create a `requested` liveaction for `action` and enqueue it.
    pub fn submit(&self, action: &str, options: EnqueueOptions) -> (LiveAction, ExecutionRequest) {
        let liveaction = LiveActionBuilder::new(action, self.clock.now()).build();
        self.submit_liveaction(liveaction, options)
    }

    pub fn submit_liveaction(&self, liveaction: LiveAction, options: EnqueueOptions) -> (LiveAction, ExecutionRequest) {
        self.services
            .liveactions
            .create(&liveaction)
            .expect("create liveaction");
        let request = self
            .services
            .queue
            .enqueue(liveaction.clone(), options)
            .expect("enqueue");
        (liveaction, request)
    }

    pub fn liveaction(&self, id: &str) -> LiveAction {
        self.services
            .liveactions
            .get(id)
            .expect("get liveaction")
            .expect("liveaction exists")
    }
}
