// tests/config_loading.rs

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use runq::cli::{CliArgs, Command};
use runq::config::{load_and_validate, load_from_path};
use runq::errors::RunqError;
use runq::types::{LockBackend, StorageBackend};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str, needle: &str) {
    let file = write_config(contents);
    match load_and_validate(file.path()) {
        Err(RunqError::Config(msg)) => {
            assert!(msg.contains(needle), "expected '{needle}' in: {msg}");
        }
        Err(e) => panic!("Expected Config error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_full_config_is_parsed() {
    let file = write_config(
        r#"
[scheduler]
poll_interval = "250ms"
pool_size = 4
backoff_initial = "50ms"
backoff_multiplier = 3.0
backoff_max = "5s"

[rescheduler]
interval = "30s"
recovery_threshold = "2m"

[garbage_collector]
executions_ttl = "2d"
purge_incomplete = true

[lock]
backend = "service"
timeout = "10s"

[coordination]
url = "memory://local"

[storage]
backend = "sqlite"
path = "/tmp/runq-test.db"

[transport]
cluster_size = 3

[[policy]]
name = "http.concurrency"
resource_ref = "core.http"
policy_type = "concurrency"
parameters = { threshold = 2, action = "cancel" }

[[policy]]
name = "flaky.retry"
resource_ref = "core.flaky"
policy_type = "action.retry"
enabled = false
parameters = { retry_on = "timeout", max_retry_count = 3, delay = 5 }
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.scheduler.poll_interval, Duration::from_millis(250));
    assert_eq!(cfg.scheduler.pool_size, 4);
    assert_eq!(cfg.scheduler.backoff_multiplier, 3.0);
    assert_eq!(cfg.rescheduler.recovery_threshold, Duration::from_secs(120));
    assert_eq!(cfg.garbage_collector.executions_ttl, Duration::from_secs(2 * 24 * 60 * 60));
    assert!(cfg.garbage_collector.purge_incomplete);
    assert_eq!(cfg.lock.backend, LockBackend::Service);
    assert_eq!(cfg.lock.timeout, Duration::from_secs(10));
    assert_eq!(cfg.coordination.url.as_deref(), Some("memory://local"));
    assert_eq!(cfg.storage.backend, StorageBackend::Sqlite);
    assert_eq!(cfg.transport.cluster_size, 3);

    assert_eq!(cfg.policy.len(), 2);
    assert_eq!(cfg.policy[0].name, "http.concurrency");
    assert!(cfg.policy[0].enabled);
    assert!(!cfg.policy[1].enabled);
}

#[test]
fn test_missing_sections_use_defaults() {
    let file = write_config("");
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.scheduler.pool_size, 10);
    assert_eq!(cfg.scheduler.poll_interval, Duration::from_millis(100));
    assert_eq!(cfg.rescheduler.recovery_threshold, Duration::from_secs(60));
    assert_eq!(cfg.rescheduler.lock_name, "scheduling-rescheduler");
    assert_eq!(cfg.garbage_collector.lock_name, "scheduling-garbage-collector");
    assert_eq!(cfg.lock.backend, LockBackend::Storage);
    assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    assert!(cfg.coordination.url.is_none());
    assert_eq!(cfg.transport.cluster_size, 1);
    assert!(cfg.policy.is_empty());
}

#[test]
fn test_zero_pool_size_is_rejected() {
    expect_config_error("[scheduler]\npool_size = 0\n", "pool_size");
}

#[test]
fn test_backoff_multiplier_below_one_is_rejected() {
    expect_config_error("[scheduler]\nbackoff_multiplier = 0.5\n", "backoff_multiplier");
}

#[test]
fn test_executions_ttl_below_one_day_is_rejected() {
    expect_config_error("[garbage_collector]\nexecutions_ttl = \"12h\"\n", "executions_ttl");
}

#[test]
fn test_sqlite_without_path_is_rejected() {
    expect_config_error("[storage]\nbackend = \"sqlite\"\n", "[storage].path");
}

#[test]
fn test_unknown_coordination_scheme_is_rejected() {
    expect_config_error("[coordination]\nurl = \"redis://cache:6379\"\n", "redis://cache:6379");
}

#[test]
fn test_zero_cluster_size_is_rejected() {
    expect_config_error("[transport]\ncluster_size = 0\n", "cluster_size");
}

#[test]
fn test_unknown_policy_type_is_rejected() {
    expect_config_error(
        r#"
[[policy]]
name = "mystery"
resource_ref = "core.http"
policy_type = "action.mystery"
"#,
        "action.mystery",
    );
}

#[test]
fn test_duplicate_policy_names_are_rejected() {
    expect_config_error(
        r#"
[[policy]]
name = "limit"
resource_ref = "core.http"
policy_type = "concurrency"
parameters = { threshold = 1 }

[[policy]]
name = "limit"
resource_ref = "core.ssh"
policy_type = "concurrency"
parameters = { threshold = 2 }
"#,
        "duplicate policy name",
    );
}

#[test]
fn test_invalid_policy_parameters_are_rejected() {
    expect_config_error(
        r#"
[[policy]]
name = "limit"
resource_ref = "core.http"
policy_type = "concurrency"
parameters = { threshold = 0 }
"#,
        "limit",
    );
}

#[test]
fn test_bad_duration_is_a_parse_error() {
    let file = write_config("[scheduler]\npoll_interval = \"fast\"\n");
    match load_from_path(file.path()) {
        Err(RunqError::Toml(_)) => {}
        other => panic!("Expected Toml error, got: {:?}", other),
    }
}

#[test]
fn test_enqueue_arguments_are_parsed() {
    let args = CliArgs::try_parse_from([
        "runq",
        "--log-level",
        "debug",
        "enqueue",
        "--action",
        "core.http",
        "--cmd",
        "curl -sf localhost",
        "--priority",
        "-2",
        "--delay",
        "1500ms",
        "--affinity",
        "rack-a",
    ])
    .unwrap();

    match args.command {
        Command::Enqueue(enqueue) => {
            assert_eq!(enqueue.action, "core.http");
            assert_eq!(enqueue.priority, -2);
            assert_eq!(enqueue.delay, Some(Duration::from_millis(1500)));
            assert_eq!(enqueue.affinity.as_deref(), Some("rack-a"));
            assert_eq!(enqueue.timeout, None);
        }
        other => panic!("Expected enqueue, got: {:?}", other),
    }
}

#[test]
fn test_serve_flags_are_parsed() {
    let args = CliArgs::try_parse_from(["runq", "serve", "--once", "--config", "Other.toml"]).unwrap();
    assert_eq!(args.config.as_deref(), Some(std::path::Path::new("Other.toml")));
    match args.command {
        Command::Serve(serve) => {
            assert!(serve.once);
            assert!(!serve.dry_run);
        }
        other => panic!("Expected serve, got: {:?}", other),
    }
}

#[test]
fn test_durations_beyond_ten_years_are_rejected() {
    expect_config_error("[rescheduler]\nrecovery_threshold = \"4000d\"\n", "recovery_threshold");
    expect_config_error("[lock]\nttl = \"4000d\"\n", "[lock].ttl");
}

#[test]
fn test_overflowing_duration_is_a_parse_error() {
    let file = write_config("[garbage_collector]\nexecutions_ttl = \"18446744073709551615d\"\n");
    match load_from_path(file.path()) {
        Err(RunqError::Toml(_)) => {}
        other => panic!("Expected Toml error, got: {:?}", other),
    }
}
