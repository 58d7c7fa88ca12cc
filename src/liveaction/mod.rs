// src/liveaction/mod.rs

//! Status transitions for liveactions.
//!
//! Every transition goes through [`LiveActionService::update_status`], which
//! persists the new state and publishes a [`StatusChange`] on the
//! [`StatusBus`] so history/UI collaborators can follow progress.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::errors::Result;
use crate::model::{LiveAction, StatusChange};
use crate::storage::LiveActionStore;
use crate::types::ExecutionStatus;

const BUS_CAPACITY: usize = 1024;

/// Broadcast channel of status changes. Lagging subscribers lose the oldest
/// events; publishing never blocks.
#[derive(Debug, Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<StatusChange>,
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.tx.subscribe()
    }

    pub fn publish(&self, change: StatusChange) {
        // No subscribers is fine.
        let _ = self.tx.send(change);
    }
}

#[derive(Debug, Clone)]
pub struct LiveActionService {
    store: Arc<dyn LiveActionStore>,
    bus: StatusBus,
    clock: Arc<dyn Clock>,
}

impl LiveActionService {
    pub fn new(store: Arc<dyn LiveActionStore>, bus: StatusBus, clock: Arc<dyn Clock>) -> Self {
        Self { store, bus, clock }
    }

    pub fn store(&self) -> &Arc<dyn LiveActionStore> {
        &self.store
    }

    pub fn bus(&self) -> &StatusBus {
        &self.bus
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Persist a brand-new liveaction (front end entry point).
    pub fn create(&self, liveaction: &LiveAction) -> Result<()> {
        self.store.insert_liveaction(liveaction)?;
        debug!(
            liveaction_id = %liveaction.id,
            action = %liveaction.action,
            status = %liveaction.status,
            "created liveaction"
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<LiveAction>> {
        self.store.get_liveaction(id)
    }

    /// Transition `liveaction` to `status`, persist it and publish the change.
    ///
    /// Entering a terminal state stamps `end_timestamp`.
    pub fn update_status(&self, liveaction: &mut LiveAction, status: ExecutionStatus) -> Result<()> {
        let from = liveaction.status;
        let now = self.clock.now();

        liveaction.status = status;
        if status.is_completed() && liveaction.end_timestamp.is_none() {
            liveaction.end_timestamp = Some(now);
        }
        self.store.update_liveaction(liveaction)?;

        if from != status {
            info!(
                liveaction_id = %liveaction.id,
                action = %liveaction.action,
                %from,
                to = %status,
                "liveaction status changed"
            );
            self.bus.publish(StatusChange {
                liveaction_id: liveaction.id.clone(),
                action: liveaction.action.clone(),
                from,
                to: status,
                at: now,
            });
        }
        Ok(())
    }

    /// Persist a liveaction whose status was changed in place (e.g. by a
    /// policy driver), publishing the transition from `previous`.
    pub fn commit_status(&self, liveaction: &mut LiveAction, previous: ExecutionStatus) -> Result<()> {
        let target = liveaction.status;
        liveaction.status = previous;
        self.update_status(liveaction, target)
    }
}
