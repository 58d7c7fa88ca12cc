// src/lock/storage.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, trace};

use super::DistributedLock;
use crate::clock::{self, Clock};
use crate::errors::{Result, RunqError};
use crate::model::Lock;
use crate::storage::LockStore;

/// Lock rows in the shared store.
///
/// Acquire is "insert unless a live row exists"; release deletes by
/// `(name, owner)`. A holder that crashes leaves a row that stops counting
/// once `expiry` passes, so nothing has to reap it.
#[derive(Debug, Clone)]
pub struct StorageLock {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    ttl: Duration,
}

impl StorageLock {
    pub fn new(
        store: Arc<dyn LockStore>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            poll_interval,
            ttl,
        }
    }

    fn try_insert(&self, name: &str) -> Result<Option<Lock>> {
        let now = self.clock.now();
        let lock = Lock::new(name, clock::saturating_add(now, self.ttl));
        if self.store.insert_lock_if_absent(&lock, now)? {
            Ok(Some(lock))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl DistributedLock for StorageLock {
    async fn acquire(&self, name: &str, blocking: bool, timeout: Duration) -> Result<Option<Lock>> {
        let started = Instant::now();

        loop {
            if let Some(lock) = self.try_insert(name)? {
                debug!(lock = %name, owner = %lock.owner, "acquired storage lock");
                return Ok(Some(lock));
            }

            if !blocking {
                trace!(lock = %name, "storage lock busy");
                return Ok(None);
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(RunqError::LockTimeout {
                    name: name.to_string(),
                    waited_ms: waited.as_millis(),
                });
            }
            tokio::time::sleep(self.poll_interval.min(timeout - waited)).await;
        }
    }

    async fn release(&self, lock: &Lock) -> Result<()> {
        let deleted = self.store.delete_lock(&lock.name, &lock.owner)?;

        if let Some(survivor) = self.store.live_lock(&lock.name, self.clock.now())? {
            error!(
                lock = %lock.name,
                owner = %lock.owner,
                holder = %survivor.owner,
                holder_proc = %survivor.proc_info,
                "lock still held after release"
            );
            return Err(RunqError::LockRelease {
                name: lock.name.clone(),
                owner: lock.owner.clone(),
                reason: format!("live row owned by {} survived the delete", survivor.owner),
            });
        }

        if deleted {
            debug!(lock = %lock.name, owner = %lock.owner, "released storage lock");
        } else {
            debug!(lock = %lock.name, owner = %lock.owner, "storage lock had already expired");
        }
        Ok(())
    }
}
