// src/storage/mod.rs

//! Durable storage behind the queue, the lock records and the liveactions.
//!
//! Everything that must hold across scheduler processes is expressed as a
//! storage-level atomic operation here (conditional insert, conditional
//! delete, find-and-delete). Callers never hold an application lock across
//! one of these calls.
//!
//! - [`memory`] process-local backend, also used heavily by tests.
//! - [`sqlite`] file-backed backend shared by every process using the same path.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::StorageSection;
use crate::errors::{Result, RunqError};
use crate::model::{ExecutionRequest, LiveAction, Lock};
use crate::types::{ExecutionStatus, StorageBackend};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Pending execution requests.
pub trait QueueStore: Send + Sync + Debug {
    fn insert_request(&self, request: &ExecutionRequest) -> Result<()>;

    /// Select the next request with `ready_at <= now` (priority desc,
    /// `ready_at` asc, `delay` asc, insertion order) and remove it, as one
    /// indivisible operation.
    fn pop_ready(&self, now: DateTime<Utc>) -> Result<Option<ExecutionRequest>>;

    fn queued_count(&self) -> Result<usize>;
}

/// Lock records with expiry-on-timestamp semantics.
///
/// Rows whose `expiry <= now` are treated as absent by every operation.
pub trait LockStore: Send + Sync + Debug {
    /// Insert `lock` unless a live row with the same name exists.
    /// Returns whether the insert happened.
    fn insert_lock_if_absent(&self, lock: &Lock, now: DateTime<Utc>) -> Result<bool>;

    /// Delete the row keyed on `(name, owner)`. Returns whether a row was removed.
    fn delete_lock(&self, name: &str, owner: &str) -> Result<bool>;

    /// The live row for `name`, if any.
    fn live_lock(&self, name: &str, now: DateTime<Utc>) -> Result<Option<Lock>>;

    fn purge_expired_locks(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Liveaction records (owned jointly with the runners and the front end).
pub trait LiveActionStore: Send + Sync + Debug {
    fn insert_liveaction(&self, liveaction: &LiveAction) -> Result<()>;

    fn get_liveaction(&self, id: &str) -> Result<Option<LiveAction>>;

    /// Insert or replace.
    fn update_liveaction(&self, liveaction: &LiveAction) -> Result<()>;

    /// Liveactions in `status` with `start_timestamp <= started_before`,
    /// ordered by `start_timestamp` ascending.
    fn query_liveactions(
        &self,
        status: ExecutionStatus,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<LiveAction>>;

    /// Number of liveactions of `action` currently in one of `statuses`.
    fn count_liveactions(&self, action: &str, statuses: &[ExecutionStatus]) -> Result<usize>;

    /// Delete liveactions that started and ended before `cutoff` in a
    /// terminal state, or, with `include_incomplete`, every liveaction that
    /// started before `cutoff`. Returns the number deleted.
    fn purge_liveactions(&self, cutoff: DateTime<Utc>, include_incomplete: bool) -> Result<usize>;
}

/// The three store handles every component is built from.
///
/// They usually point at one backend, but tests swap individual handles.
#[derive(Debug, Clone)]
pub struct Stores {
    pub queue: Arc<dyn QueueStore>,
    pub locks: Arc<dyn LockStore>,
    pub liveactions: Arc<dyn LiveActionStore>,
}

impl Stores {
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }

    pub fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: QueueStore + LockStore + LiveActionStore + 'static,
    {
        Self {
            queue: store.clone(),
            locks: store.clone(),
            liveactions: store,
        }
    }
}

/// Open the backend selected by `[storage]`.
pub fn open_stores(section: &StorageSection) -> Result<Stores> {
    match section.backend {
        StorageBackend::Memory => Ok(Stores::memory()),
        StorageBackend::Sqlite => {
            let path = section.path.as_ref().ok_or_else(|| {
                RunqError::Config("[storage].path is required for sqlite".to_string())
            })?;
            let store = SqliteStore::open(path)?;
            Ok(Stores::from_backend(Arc::new(store)))
        }
    }
}
