use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use runq::errors::{Result, RunqError};
use runq::model::ExecutionRequest;
use runq::transport::ExecutionTransport;

/// A fake transport that:
/// - records every dispatched request
/// - fails the first `fail_first` dispatches with `RunqError::Dispatch`.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    dispatched: Arc<Mutex<Vec<ExecutionRequest>>>,
    fail_first: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose first `n` dispatches fail.
    pub fn failing_first(n: usize) -> Self {
        let transport = Self::default();
        transport.fail_first.store(n, Ordering::SeqCst);
        transport
    }

    pub fn dispatched(&self) -> Vec<ExecutionRequest> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn dispatched_ids(&self) -> Vec<String> {
        self.dispatched()
            .iter()
            .map(|r| r.liveaction_id().to_string())
            .collect()
    }

    /// Dispatch calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ExecutionTransport for RecordingTransport {
    fn dispatch(
        &self,
        request: ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let dispatched = Arc::clone(&self.dispatched);
        let fail_first = Arc::clone(&self.fail_first);
        let attempts = Arc::clone(&self.attempts);

        Box::pin(async move {
            attempts.fetch_add(1, Ordering::SeqCst);

            let should_fail = fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(RunqError::Dispatch {
                    execution_id: request.id.clone(),
                    reason: "broker unreachable (fake)".to_string(),
                });
            }

            dispatched.lock().unwrap().push(request);
            Ok(())
        })
    }
}
