use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of one execution.
///
/// `Delayed` is the transient status a policy may impose before `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Requested,
    Scheduled,
    Delayed,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Canceled,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 8] = [
        ExecutionStatus::Requested,
        ExecutionStatus::Scheduled,
        ExecutionStatus::Delayed,
        ExecutionStatus::Running,
        ExecutionStatus::Succeeded,
        ExecutionStatus::Failed,
        ExecutionStatus::TimedOut,
        ExecutionStatus::Canceled,
    ];

    /// Terminal states reported by a runner.
    pub const COMPLETED: [ExecutionStatus; 4] = [
        ExecutionStatus::Succeeded,
        ExecutionStatus::Failed,
        ExecutionStatus::TimedOut,
        ExecutionStatus::Canceled,
    ];

    /// States that occupy a concurrency slot.
    pub const ACTIVE: [ExecutionStatus; 2] =
        [ExecutionStatus::Scheduled, ExecutionStatus::Running];

    pub fn is_completed(self) -> bool {
        Self::COMPLETED.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Requested => "requested",
            ExecutionStatus::Scheduled => "scheduled",
            ExecutionStatus::Delayed => "delayed",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::TimedOut => "timed_out",
            ExecutionStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ExecutionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| format!("invalid execution status: {s}"))
    }
}

/// Which store backs the queue, locks and liveactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local, lost on restart.
    Memory,
    /// SQLite file shared by every process pointing at the same path.
    Sqlite,
}

impl Default for StorageBackend {
    fn default() -> Self {
        StorageBackend::Memory
    }
}

/// Which `DistributedLock` implementation guards periodic jobs and policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    Storage,
    Service,
}

impl Default for LockBackend {
    fn default() -> Self {
        LockBackend::Storage
    }
}

/// What the concurrency policy does with an execution over the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyAction {
    Delay,
    Cancel,
}

impl Default for ConcurrencyAction {
    fn default() -> Self {
        ConcurrencyAction::Delay
    }
}

/// Terminal condition the retry policy reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryOn {
    Failure,
    Timeout,
}

impl RetryOn {
    pub fn matches(self, status: ExecutionStatus) -> bool {
        match self {
            RetryOn::Failure => status == ExecutionStatus::Failed,
            RetryOn::Timeout => status == ExecutionStatus::TimedOut,
        }
    }
}
