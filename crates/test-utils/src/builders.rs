#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use runq::config::{ConfigFile, RawConfigFile};
use runq::model::{LiveAction, PolicyDescriptor};
use runq::types::{ExecutionStatus, LockBackend, StorageBackend};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_policy(mut self, policy: PolicyDescriptor) -> Self {
        self.config.policy.push(policy);
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.scheduler.pool_size = size;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.scheduler.poll_interval = interval;
        self
    }

    pub fn recovery_threshold(mut self, threshold: Duration) -> Self {
        self.config.rescheduler.recovery_threshold = threshold;
        self
    }

    pub fn executions_ttl(mut self, ttl: Duration) -> Self {
        self.config.garbage_collector.executions_ttl = ttl;
        self
    }

    pub fn purge_incomplete(mut self, val: bool) -> Self {
        self.config.garbage_collector.purge_incomplete = val;
        self
    }

    pub fn lock_backend(mut self, backend: LockBackend) -> Self {
        self.config.lock.backend = backend;
        self
    }

    pub fn lock_timing(mut self, timeout: Duration, poll_interval: Duration, ttl: Duration) -> Self {
        self.config.lock.timeout = timeout;
        self.config.lock.poll_interval = poll_interval;
        self.config.lock.ttl = ttl;
        self
    }

    pub fn coordination_url(mut self, url: &str) -> Self {
        self.config.coordination.url = Some(url.to_string());
        self
    }

    pub fn sqlite(mut self, path: &Path) -> Self {
        self.config.storage.backend = StorageBackend::Sqlite;
        self.config.storage.path = Some(path.to_path_buf());
        self
    }

    pub fn cluster_size(mut self, size: usize) -> Self {
        self.config.transport.cluster_size = size;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `concurrency` policy on `resource_ref` with the given threshold.
pub fn concurrency_policy(name: &str, resource_ref: &str, threshold: u64) -> PolicyDescriptor {
    PolicyDescriptor::new(name, resource_ref, "concurrency", json!({ "threshold": threshold }))
}

/// `retry` policy on `resource_ref`.
pub fn retry_policy(name: &str, resource_ref: &str, retry_on: &str, max_retry_count: u32) -> PolicyDescriptor {
    PolicyDescriptor::new(
        name,
        resource_ref,
        "retry",
        json!({ "retry_on": retry_on, "max_retry_count": max_retry_count }),
    )
}

/// Builder for `LiveAction`.
pub struct LiveActionBuilder {
    liveaction: LiveAction,
}

impl LiveActionBuilder {
    pub fn new(action: &str, now: DateTime<Utc>) -> Self {
        Self {
            liveaction: LiveAction::new(action, json!({ "cmd": "true" }), now),
        }
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.liveaction.parameters["cmd"] = Value::from(cmd);
        self
    }

    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.liveaction.parameters["timeout"] = Value::from(secs);
        self
    }

    pub fn status(mut self, status: ExecutionStatus) -> Self {
        self.liveaction.status = status;
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.liveaction.start_timestamp = at;
        self
    }

    pub fn ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.liveaction.end_timestamp = Some(at);
        self
    }

    pub fn context(mut self, path: &str, value: Value) -> Self {
        self.liveaction.set_context_value(path, value);
        self
    }

    pub fn build(self) -> LiveAction {
        self.liveaction
    }
}
