// tests/cluster_retry.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use runq::clock::mock::MockClock;
use runq::clock::Clock;
use runq::errors::RunqError;
use runq::model::{EnqueueOptions, ExecutionRequest, LiveAction};
use runq::transport::{ClusterRetryContext, ClusterTransport, ConnectionRetryWrapper, ExecutionTransport};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn drive(ctx: &mut ClusterRetryContext, calls: usize) -> Vec<(bool, i64)> {
    (0..calls).map(|_| ctx.test_should_stop()).collect()
}

fn request() -> ExecutionRequest {
    let clock = MockClock::at_epoch();
    let la = LiveAction::new("core.local", json!({ "cmd": "true" }), clock.now());
    ExecutionRequest::new(la, EnqueueOptions::default(), clock.now())
}

#[test]
fn single_node_cluster_waits_between_each_attempt_then_stops() {
    let mut ctx = ClusterRetryContext::new(1);
    assert_eq!(drive(&mut ctx, 3), vec![(false, 10), (false, 10), (true, -1)]);
}

#[test]
fn three_node_cluster_waits_after_each_full_pass() {
    let mut ctx = ClusterRetryContext::new(3);
    assert_eq!(
        drive(&mut ctx, 7),
        vec![
            (false, 0),
            (false, 0),
            (false, 10),
            (false, 0),
            (false, 0),
            (false, 10),
            (true, -1),
        ]
    );
    // Stays stopped.
    assert_eq!(ctx.test_should_stop(), (true, -1));
}

#[test]
fn empty_cluster_stops_immediately() {
    let mut ctx = ClusterRetryContext::new(0);
    assert_eq!(ctx.test_should_stop(), (true, -1));
}

#[tokio::test(start_paused = true)]
async fn wrapper_rotates_nodes_and_sleeps_between_passes() {
    let wrapper = ConnectionRetryWrapper::new(2);
    let visited = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    let result = wrapper
        .run("exec-1", |node| {
            let visited = visited.clone();
            async move {
                visited.lock().unwrap().push(node);
                if visited.lock().unwrap().len() < 4 {
                    Err(RunqError::StorageUnavailable(format!("node {node} down")))
                } else {
                    Ok(node)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(result, 1);
    assert_eq!(*visited.lock().unwrap(), vec![0, 1, 0, 1]);
    // One full pass over 2 nodes finished before success: one 10s wait.
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn wrapper_gives_up_with_dispatch_error() {
    let wrapper = ConnectionRetryWrapper::new(1);
    let calls = Arc::new(AtomicUsize::new(0));

    let err = wrapper
        .run("exec-2", |_node| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RunqError::StorageUnavailable("refused".to_string()))
            }
        })
        .await
        .unwrap_err();

    // First try plus two retries allowed by the context.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match err {
        RunqError::Dispatch { execution_id, reason } => {
            assert_eq!(execution_id, "exec-2");
            assert!(reason.contains("refused"));
        }
        other => panic!("expected Dispatch, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cluster_transport_fails_over_to_live_node() {
    let (transport, mut receivers) = ClusterTransport::new(3, 4);
    // Nodes 0 and 1 are gone.
    let mut live = receivers.pop().unwrap();
    drop(receivers);

    let sent = request();
    transport.dispatch(sent.clone()).await.unwrap();

    let delivered = live.recv().await.unwrap();
    assert_eq!(delivered.id, sent.id);
}

#[tokio::test(start_paused = true)]
async fn cluster_transport_reports_dispatch_error_when_every_node_is_down() {
    let (tx, rx) = mpsc::channel::<ExecutionRequest>(1);
    drop(rx);
    let transport = ClusterTransport::from_senders(vec![tx], ConnectionRetryWrapper::new(1));

    let sent = request();
    let err = transport.dispatch(sent.clone()).await.unwrap_err();
    assert!(matches!(err, RunqError::Dispatch { ref execution_id, .. } if *execution_id == sent.id));
}
