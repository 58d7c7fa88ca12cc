// tests/local_runner.rs
#![cfg(unix)]

use runq::clock::Clock;
use runq::exec::runner::EXIT_CODE_PATH;
use runq::exec::LocalRunner;
use runq::model::{EnqueueOptions, LiveAction};
use runq::transport::ClusterTransport;
use runq::transport::ExecutionTransport;
use runq::types::ExecutionStatus;
use runq_test_utils::builders::{ConfigFileBuilder, LiveActionBuilder};
use runq_test_utils::harness::Harness;
use runq_test_utils::{init_tracing, with_timeout};
use serde_json::Value;
use tokio::sync::mpsc;

async fn run_to_completion(h: &Harness, liveaction: LiveAction) -> LiveAction {
    let (tx, mut rx) = mpsc::channel(4);
    let runner = LocalRunner::new(h.services.liveactions.clone(), tx);
    let (_, request) = h.submit_liveaction(liveaction, EnqueueOptions::default());

    with_timeout(runner.run(request)).await;
    with_timeout(rx.recv()).await.expect("completion reported")
}

#[tokio::test]
async fn successful_command_ends_succeeded() {
    init_tracing();
    let h = Harness::new(ConfigFileBuilder::new().build());
    let la = LiveActionBuilder::new("core.local", h.clock.now()).cmd("echo hello").build();

    let done = run_to_completion(&h, la.clone()).await;

    assert_eq!(done.id, la.id);
    assert_eq!(done.status, ExecutionStatus::Succeeded);
    assert_eq!(done.context_value(EXIT_CODE_PATH), Some(&Value::from(0)));
    assert!(done.end_timestamp.is_some());
    assert_eq!(h.liveaction(&la.id).status, ExecutionStatus::Succeeded);
}

#[tokio::test]
async fn non_zero_exit_ends_failed_with_exit_code() {
    init_tracing();
    let h = Harness::new(ConfigFileBuilder::new().build());
    let la = LiveActionBuilder::new("core.local", h.clock.now()).cmd("exit 3").build();

    let done = run_to_completion(&h, la).await;

    assert_eq!(done.status, ExecutionStatus::Failed);
    assert_eq!(done.context_value(EXIT_CODE_PATH), Some(&Value::from(3)));
}

#[tokio::test]
async fn slow_command_is_killed_and_times_out() {
    init_tracing();
    let h = Harness::new(ConfigFileBuilder::new().build());
    let la = LiveActionBuilder::new("core.local", h.clock.now())
        .cmd("sleep 5")
        .timeout_secs(0.2)
        .build();

    let done = run_to_completion(&h, la).await;

    assert_eq!(done.status, ExecutionStatus::TimedOut);
    assert_eq!(done.context_value(EXIT_CODE_PATH), None);
}

#[tokio::test]
async fn missing_command_ends_failed() {
    let h = Harness::new(ConfigFileBuilder::new().build());
    let mut la = LiveActionBuilder::new("core.local", h.clock.now()).build();
    la.parameters = serde_json::json!({});

    let done = run_to_completion(&h, la).await;
    assert_eq!(done.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn spawned_runner_consumes_cluster_nodes() {
    init_tracing();
    let h = Harness::new(ConfigFileBuilder::new().build());
    let (transport, nodes) = ClusterTransport::new(2, 4);
    let (tx, mut rx) = mpsc::channel(4);
    let handles = LocalRunner::new(h.services.liveactions.clone(), tx).spawn(nodes);
    assert_eq!(handles.len(), 2);

    let la = LiveActionBuilder::new("core.local", h.clock.now()).cmd("true").build();
    let (_, request) = h.submit_liveaction(la.clone(), EnqueueOptions::default());
    transport.dispatch(request).await.unwrap();

    let done = with_timeout(rx.recv()).await.unwrap();
    assert_eq!(done.id, la.id);
    assert_eq!(done.status, ExecutionStatus::Succeeded);

    // Dropping the transport closes every node channel.
    drop(transport);
    for handle in handles {
        with_timeout(handle).await.unwrap();
    }
}
