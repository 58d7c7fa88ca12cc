// src/lock/service.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, trace};

use super::coordinator::{Coordinator, ServiceLock};
use super::DistributedLock;
use crate::clock::{self, Clock};
use crate::errors::{Result, RunqError};
use crate::model::Lock;

/// `DistributedLock` backed by the coordination service.
///
/// Each successful acquire keeps the service handle, keyed by the returned
/// lock's owner token, until it is released. In degraded mode every acquire
/// succeeds and nothing is tracked.
#[derive(Debug)]
pub struct ServiceLockBackend {
    coordinator: Arc<Coordinator>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    held: Mutex<HashMap<String, Box<dyn ServiceLock>>>,
}

impl ServiceLockBackend {
    pub fn new(coordinator: Arc<Coordinator>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            coordinator,
            clock,
            ttl,
            held: Mutex::new(HashMap::new()),
        }
    }

    fn held(&self) -> MutexGuard<'_, HashMap<String, Box<dyn ServiceLock>>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_lock(&self, name: &str) -> Lock {
        Lock::new(name, clock::saturating_add(self.clock.now(), self.ttl))
    }
}

#[async_trait]
impl DistributedLock for ServiceLockBackend {
    async fn acquire(&self, name: &str, blocking: bool, timeout: Duration) -> Result<Option<Lock>> {
        let Some(service) = self.coordinator.service()? else {
            trace!(lock = %name, "coordinator degraded; granting lock");
            return Ok(Some(self.new_lock(name)));
        };

        let mut handle = service.get_lock(name);
        let acquired = if blocking {
            match tokio::time::timeout(timeout, handle.acquire(true)).await {
                Ok(res) => res?,
                Err(_) => {
                    return Err(RunqError::LockTimeout {
                        name: name.to_string(),
                        waited_ms: timeout.as_millis(),
                    });
                }
            }
        } else {
            handle.acquire(false).await?
        };

        if !acquired {
            trace!(lock = %name, "service lock busy");
            return Ok(None);
        }

        let lock = self.new_lock(name);
        self.held().insert(lock.owner.clone(), handle);
        debug!(lock = %name, owner = %lock.owner, "acquired service lock");
        Ok(Some(lock))
    }

    async fn release(&self, lock: &Lock) -> Result<()> {
        if self.coordinator.service()?.is_none() {
            return Ok(());
        }

        let handle = self.held().remove(&lock.owner);
        let Some(mut handle) = handle else {
            error!(lock = %lock.name, owner = %lock.owner, "release of a lock this process does not hold");
            return Err(RunqError::LockRelease {
                name: lock.name.clone(),
                owner: lock.owner.clone(),
                reason: "no service handle for this owner".to_string(),
            });
        };

        if !handle.release().await? {
            error!(lock = %lock.name, owner = %lock.owner, "coordination service lost the lock before release");
            return Err(RunqError::LockRelease {
                name: lock.name.clone(),
                owner: lock.owner.clone(),
                reason: "handle no longer held the lock".to_string(),
            });
        }

        debug!(lock = %lock.name, owner = %lock.owner, "released service lock");
        Ok(())
    }
}
