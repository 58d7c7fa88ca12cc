// src/storage/memory.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{LiveActionStore, LockStore, QueueStore};
use crate::errors::{Result, RunqError};
use crate::model::{ExecutionRequest, LiveAction, Lock};
use crate::types::ExecutionStatus;

#[derive(Debug, Default)]
struct QueueState {
    next_seq: u64,
    items: Vec<(u64, ExecutionRequest)>,
}

/// In-memory store. Each collection sits behind its own mutex, which is what
/// makes `pop_ready` and `insert_lock_if_absent` atomic for every task in the
/// process.
#[derive(Debug)]
pub struct MemoryStore {
    queue: Mutex<QueueState>,
    locks: Mutex<HashMap<String, Lock>>,
    liveactions: Mutex<HashMap<String, LiveAction>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(QueueState::default()),
            locks: Mutex::new(HashMap::new()),
            liveactions: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every call fails with
    /// `StorageUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn guard<'a, T>(&self, mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(RunqError::StorageUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        mutex
            .lock()
            .map_err(|e| RunqError::StorageUnavailable(format!("poisoned store mutex: {e}")))
    }
}

impl QueueStore for MemoryStore {
    fn insert_request(&self, request: &ExecutionRequest) -> Result<()> {
        let mut state = self.guard(&self.queue)?;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.items.push((seq, request.clone()));
        Ok(())
    }

    fn pop_ready(&self, now: DateTime<Utc>) -> Result<Option<ExecutionRequest>> {
        let mut state = self.guard(&self.queue)?;

        let next = state
            .items
            .iter()
            .enumerate()
            .filter(|(_, (_, request))| request.is_ready(now))
            .min_by(|(_, (seq_a, a)), (_, (seq_b, b))| {
                a.schedule_cmp(b).then(seq_a.cmp(seq_b))
            })
            .map(|(idx, _)| idx);

        Ok(next.map(|idx| state.items.remove(idx).1))
    }

    fn queued_count(&self) -> Result<usize> {
        Ok(self.guard(&self.queue)?.items.len())
    }
}

impl LockStore for MemoryStore {
    fn insert_lock_if_absent(&self, lock: &Lock, now: DateTime<Utc>) -> Result<bool> {
        let mut locks = self.guard(&self.locks)?;

        if let Some(existing) = locks.get(&lock.name) {
            if existing.is_live(now) {
                return Ok(false);
            }
        }

        locks.insert(lock.name.clone(), lock.clone());
        Ok(true)
    }

    fn delete_lock(&self, name: &str, owner: &str) -> Result<bool> {
        let mut locks = self.guard(&self.locks)?;
        match locks.get(name) {
            Some(existing) if existing.owner == owner => {
                locks.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn live_lock(&self, name: &str, now: DateTime<Utc>) -> Result<Option<Lock>> {
        let mut locks = self.guard(&self.locks)?;
        match locks.get(name) {
            Some(lock) if lock.is_live(now) => Ok(Some(lock.clone())),
            Some(_) => {
                locks.remove(name);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn purge_expired_locks(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut locks = self.guard(&self.locks)?;
        let before = locks.len();
        locks.retain(|_, lock| lock.is_live(now));
        Ok(before - locks.len())
    }
}

impl LiveActionStore for MemoryStore {
    fn insert_liveaction(&self, liveaction: &LiveAction) -> Result<()> {
        let mut records = self.guard(&self.liveactions)?;
        if records.contains_key(&liveaction.id) {
            return Err(RunqError::Other(anyhow::anyhow!(
                "liveaction {} already exists",
                liveaction.id
            )));
        }
        records.insert(liveaction.id.clone(), liveaction.clone());
        Ok(())
    }

    fn get_liveaction(&self, id: &str) -> Result<Option<LiveAction>> {
        Ok(self.guard(&self.liveactions)?.get(id).cloned())
    }

    fn update_liveaction(&self, liveaction: &LiveAction) -> Result<()> {
        self.guard(&self.liveactions)?
            .insert(liveaction.id.clone(), liveaction.clone());
        Ok(())
    }

    fn query_liveactions(
        &self,
        status: ExecutionStatus,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<LiveAction>> {
        let records = self.guard(&self.liveactions)?;
        let mut found: Vec<LiveAction> = records
            .values()
            .filter(|la| la.status == status && la.start_timestamp <= started_before)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.start_timestamp
                .cmp(&b.start_timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(found)
    }

    fn count_liveactions(&self, action: &str, statuses: &[ExecutionStatus]) -> Result<usize> {
        let records = self.guard(&self.liveactions)?;
        Ok(records
            .values()
            .filter(|la| la.action == action && statuses.contains(&la.status))
            .count())
    }

    fn purge_liveactions(&self, cutoff: DateTime<Utc>, include_incomplete: bool) -> Result<usize> {
        let mut records = self.guard(&self.liveactions)?;
        let before = records.len();
        records.retain(|_, la| !is_purgeable(la, cutoff, include_incomplete));
        Ok(before - records.len())
    }
}

pub(crate) fn is_purgeable(la: &LiveAction, cutoff: DateTime<Utc>, include_incomplete: bool) -> bool {
    if la.start_timestamp >= cutoff {
        return false;
    }
    if include_incomplete {
        return true;
    }
    la.status.is_completed() && la.end_timestamp.is_some_and(|end| end < cutoff)
}
