// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, RunqError};
use crate::lock::coordinator::LOCAL_SCHEME;
use crate::policy::PolicyRegistry;
use crate::types::StorageBackend;

/// Executions younger than this are never purged, whatever the config says.
pub const MINIMUM_EXECUTIONS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound for every configured duration (ten years).
pub const MAXIMUM_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

fn check_upper_bound(field: &str, value: Duration) -> Result<()> {
    if value > MAXIMUM_DURATION {
        return Err(RunqError::Config(format!(
            "{field} must be at most 3650d (got {value:?})"
        )));
    }
    Ok(())
}

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RunqError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_scheduler(cfg)?;
    validate_jobs(cfg)?;
    validate_lock_and_coordination(cfg)?;
    validate_storage_and_transport(cfg)?;
    validate_policies(cfg)?;
    Ok(())
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.scheduler;

    if s.pool_size == 0 {
        return Err(RunqError::Config(
            "[scheduler].pool_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if s.poll_interval.is_zero() {
        return Err(RunqError::Config(
            "[scheduler].poll_interval must be greater than zero".to_string(),
        ));
    }
    if !(s.backoff_multiplier >= 1.0) {
        return Err(RunqError::Config(format!(
            "[scheduler].backoff_multiplier must be >= 1.0 (got {})",
            s.backoff_multiplier
        )));
    }
    check_upper_bound("[scheduler].poll_interval", s.poll_interval)?;
    check_upper_bound("[scheduler].backoff_max", s.backoff_max)?;
    if s.backoff_max < s.backoff_initial {
        return Err(RunqError::Config(format!(
            "[scheduler].backoff_max ({:?}) must not be smaller than backoff_initial ({:?})",
            s.backoff_max, s.backoff_initial
        )));
    }
    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.rescheduler.interval.is_zero() || cfg.garbage_collector.interval.is_zero() {
        return Err(RunqError::Config(
            "[rescheduler].interval and [garbage_collector].interval must be greater than zero"
                .to_string(),
        ));
    }
    check_upper_bound("[rescheduler].interval", cfg.rescheduler.interval)?;
    check_upper_bound("[rescheduler].recovery_threshold", cfg.rescheduler.recovery_threshold)?;
    check_upper_bound("[garbage_collector].interval", cfg.garbage_collector.interval)?;
    check_upper_bound("[garbage_collector].executions_ttl", cfg.garbage_collector.executions_ttl)?;
    if cfg.garbage_collector.executions_ttl < MINIMUM_EXECUTIONS_TTL {
        return Err(RunqError::Config(format!(
            "[garbage_collector].executions_ttl must be at least 1d (got {:?})",
            cfg.garbage_collector.executions_ttl
        )));
    }
    if cfg.rescheduler.lock_name.trim().is_empty()
        || cfg.garbage_collector.lock_name.trim().is_empty()
    {
        return Err(RunqError::Config("job lock names must not be empty".to_string()));
    }
    if cfg.rescheduler.lock_name == cfg.garbage_collector.lock_name {
        return Err(RunqError::Config(format!(
            "rescheduler and garbage collector cannot share lock '{}'",
            cfg.rescheduler.lock_name
        )));
    }
    Ok(())
}

fn validate_lock_and_coordination(cfg: &RawConfigFile) -> Result<()> {
    if cfg.lock.poll_interval.is_zero() || cfg.lock.ttl.is_zero() {
        return Err(RunqError::Config(
            "[lock].poll_interval and [lock].ttl must be greater than zero".to_string(),
        ));
    }
    check_upper_bound("[lock].poll_interval", cfg.lock.poll_interval)?;
    check_upper_bound("[lock].ttl", cfg.lock.ttl)?;
    check_upper_bound("[lock].timeout", cfg.lock.timeout)?;

    if let Some(url) = &cfg.coordination.url {
        if !url.starts_with(LOCAL_SCHEME) {
            return Err(RunqError::Config(format!(
                "unsupported [coordination].url '{url}' (expected {LOCAL_SCHEME})"
            )));
        }
    }
    Ok(())
}

fn validate_storage_and_transport(cfg: &RawConfigFile) -> Result<()> {
    if cfg.storage.backend == StorageBackend::Sqlite && cfg.storage.path.is_none() {
        return Err(RunqError::Config(
            "[storage].path is required when backend = \"sqlite\"".to_string(),
        ));
    }
    if cfg.transport.cluster_size == 0 {
        return Err(RunqError::Config(
            "[transport].cluster_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.transport.channel_capacity == 0 {
        return Err(RunqError::Config(
            "[transport].channel_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_policies(cfg: &RawConfigFile) -> Result<()> {
    let registry = PolicyRegistry::with_builtin();
    let mut seen = HashSet::new();

    for descriptor in cfg.policy.iter() {
        if !seen.insert(descriptor.name.as_str()) {
            return Err(RunqError::Config(format!(
                "duplicate policy name '{}'",
                descriptor.name
            )));
        }
        if descriptor.resource_ref.trim().is_empty() {
            return Err(RunqError::Config(format!(
                "policy '{}' has an empty resource_ref",
                descriptor.name
            )));
        }
        registry.resolve(descriptor)?;
    }
    Ok(())
}
