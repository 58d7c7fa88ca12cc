// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::model::PolicyDescriptor;
use crate::types::{LockBackend, StorageBackend};

use super::duration;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [scheduler]
/// poll_interval = "100ms"
///
/// [storage]
/// backend = "sqlite"
/// path = ".runq/runq.db"
///
/// [[policy]]
/// name = "http.concurrency"
/// resource_ref = "core.http"
/// policy_type = "concurrency"
/// parameters = { threshold = 2 }
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub rescheduler: ReschedulerSection,

    #[serde(default)]
    pub garbage_collector: GarbageCollectorSection,

    #[serde(default)]
    pub lock: LockSection,

    #[serde(default)]
    pub coordination: CoordinationSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub transport: TransportSection,

    /// `[[policy]]` tables, kept in file order (evaluation order).
    #[serde(default)]
    pub policy: Vec<PolicyDescriptor>,
}

/// Validated configuration. Only obtainable through `ConfigFile::try_from`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerSection,
    pub rescheduler: ReschedulerSection,
    pub garbage_collector: GarbageCollectorSection,
    pub lock: LockSection,
    pub coordination: CoordinationSection,
    pub storage: StorageSection,
    pub transport: TransportSection,
    pub policy: Vec<PolicyDescriptor>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            scheduler: raw.scheduler,
            rescheduler: raw.rescheduler,
            garbage_collector: raw.garbage_collector,
            lock: raw.lock,
            coordination: raw.coordination,
            storage: raw.storage,
            transport: raw.transport,
            policy: raw.policy,
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Sleep between polls when the queue has nothing eligible.
    #[serde(default = "default_poll_interval", deserialize_with = "duration::deserialize")]
    pub poll_interval: Duration,

    /// Maximum number of queue items handled concurrently by one process.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// First wait after a `StorageUnavailable` error.
    #[serde(default = "default_backoff_initial", deserialize_with = "duration::deserialize")]
    pub backoff_initial: Duration,

    /// Growth factor applied on each consecutive storage failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for the backoff wait.
    #[serde(default = "default_backoff_max", deserialize_with = "duration::deserialize")]
    pub backoff_max: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_pool_size() -> usize {
    10
}

fn default_backoff_initial() -> Duration {
    Duration::from_millis(100)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(10)
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            pool_size: default_pool_size(),
            backoff_initial: default_backoff_initial(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_max: default_backoff_max(),
        }
    }
}

/// `[rescheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ReschedulerSection {
    #[serde(default = "default_rescheduler_interval", deserialize_with = "duration::deserialize")]
    pub interval: Duration,

    /// How long an execution may sit in `delayed` before it is requeued.
    #[serde(default = "default_recovery_threshold", deserialize_with = "duration::deserialize")]
    pub recovery_threshold: Duration,

    #[serde(default = "default_rescheduler_lock")]
    pub lock_name: String,
}

fn default_rescheduler_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_recovery_threshold() -> Duration {
    Duration::from_secs(60)
}

fn default_rescheduler_lock() -> String {
    "scheduling-rescheduler".to_string()
}

impl Default for ReschedulerSection {
    fn default() -> Self {
        Self {
            interval: default_rescheduler_interval(),
            recovery_threshold: default_recovery_threshold(),
            lock_name: default_rescheduler_lock(),
        }
    }
}

/// `[garbage_collector]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GarbageCollectorSection {
    #[serde(default = "default_gc_interval", deserialize_with = "duration::deserialize")]
    pub interval: Duration,

    /// Completed executions older than this are purged. Must be at least one day.
    #[serde(default = "default_executions_ttl", deserialize_with = "duration::deserialize")]
    pub executions_ttl: Duration,

    /// Also purge executions that never reached a terminal state.
    #[serde(default)]
    pub purge_incomplete: bool,

    #[serde(default = "default_gc_lock")]
    pub lock_name: String,
}

fn default_gc_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_executions_ttl() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_gc_lock() -> String {
    "scheduling-garbage-collector".to_string()
}

impl Default for GarbageCollectorSection {
    fn default() -> Self {
        Self {
            interval: default_gc_interval(),
            executions_ttl: default_executions_ttl(),
            purge_incomplete: false,
            lock_name: default_gc_lock(),
        }
    }
}

/// `[lock]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LockSection {
    #[serde(default)]
    pub backend: LockBackend,

    /// Upper bound for a blocking acquire.
    #[serde(default = "default_lock_timeout", deserialize_with = "duration::deserialize")]
    pub timeout: Duration,

    /// Retry interval while a blocking acquire waits.
    #[serde(default = "default_lock_poll_interval", deserialize_with = "duration::deserialize")]
    pub poll_interval: Duration,

    /// Lifetime of a storage lock row; abandoned rows expire after this.
    #[serde(default = "default_lock_ttl", deserialize_with = "duration::deserialize")]
    pub ttl: Duration,
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_lock_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_lock_ttl() -> Duration {
    Duration::from_secs(60)
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            backend: LockBackend::default(),
            timeout: default_lock_timeout(),
            poll_interval: default_lock_poll_interval(),
            ttl: default_lock_ttl(),
        }
    }
}

/// `[coordination]` section.
///
/// When `url` is absent the coordinator runs in degraded (best-effort) mode.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoordinationSection {
    #[serde(default)]
    pub url: Option<String>,
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database file for the `sqlite` backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `[transport]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSection {
    /// Number of broker nodes requests are dispatched over.
    #[serde(default = "default_cluster_size")]
    pub cluster_size: usize,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_cluster_size() -> usize {
    1
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            cluster_size: default_cluster_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}
