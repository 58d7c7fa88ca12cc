// src/lock/mod.rs

//! Named, expiring mutual exclusion shared by every scheduler process.
//!
//! Two interchangeable implementations sit behind [`DistributedLock`]:
//!
//! - [`StorageLock`] conditional insert / owner-checked delete on the lock
//!   table of the shared store.
//! - [`ServiceLockBackend`] locks handed out by a coordination service through
//!   a [`Coordinator`]; best effort when the service is absent.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::config::LockSection;
use crate::errors::Result;
use crate::model::Lock;
use crate::storage::LockStore;
use crate::types::LockBackend;

pub mod coordinator;
pub mod service;
pub mod storage;

pub use coordinator::{
    CoordinationService, Coordinator, CoordinatorMode, LocalCoordinationService, ServiceLock,
};
pub use service::ServiceLockBackend;
pub use storage::StorageLock;

#[async_trait]
pub trait DistributedLock: Send + Sync + Debug {
    /// Try to take the lock called `name`.
    ///
    /// Non-blocking calls return `Ok(None)` straight away when the lock is
    /// held elsewhere. Blocking calls wait up to `timeout` and then fail with
    /// `RunqError::LockTimeout`.
    async fn acquire(&self, name: &str, blocking: bool, timeout: Duration) -> Result<Option<Lock>>;

    /// Give the lock back. Fails with `RunqError::LockRelease` when the lock
    /// is still held after the attempt.
    async fn release(&self, lock: &Lock) -> Result<()>;
}

/// Build the lock implementation selected by `[lock].backend`.
pub fn build_lock(
    section: &LockSection,
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    coordinator: Arc<Coordinator>,
) -> Arc<dyn DistributedLock> {
    match section.backend {
        LockBackend::Storage => Arc::new(StorageLock::new(
            store,
            clock,
            section.poll_interval,
            section.ttl,
        )),
        LockBackend::Service => Arc::new(ServiceLockBackend::new(coordinator, clock, section.ttl)),
    }
}
