// src/transport/retry.rs

//! Reconnect policy for a clustered message broker.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::{Result, RunqError};

/// Full passes over the cluster before giving up.
pub const DEFAULT_CLUSTER_RETRY: usize = 2;

/// Seconds to wait after each full pass over the cluster.
pub const DEFAULT_WAIT_BETWEEN_CLUSTER: i64 = 10;

/// Decides, after each failed connection attempt, whether to stop and how
/// long to wait before the next attempt.
///
/// With `N` nodes, attempts `0..2N` are allowed. The attempt that completes a
/// pass over the cluster waits `wait_between_cluster` seconds, the others
/// retry immediately. Once the attempts are used up, or when `N == 0`, the
/// answer is `(true, -1)`.
#[derive(Debug, Clone)]
pub struct ClusterRetryContext {
    cluster_size: usize,
    cluster_retry: usize,
    wait_between_cluster: i64,
    attempt: usize,
}

impl ClusterRetryContext {
    pub fn new(cluster_size: usize) -> Self {
        Self::with_policy(cluster_size, DEFAULT_CLUSTER_RETRY, DEFAULT_WAIT_BETWEEN_CLUSTER)
    }

    pub fn with_policy(cluster_size: usize, cluster_retry: usize, wait_between_cluster: i64) -> Self {
        Self {
            cluster_size,
            cluster_retry,
            wait_between_cluster,
            attempt: 0,
        }
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    /// Returns `(should_stop, wait_seconds)`; `wait_seconds` is `-1` when stopping.
    pub fn test_should_stop(&mut self) -> (bool, i64) {
        if self.cluster_size == 0 {
            return (true, -1);
        }
        if self.attempt >= self.cluster_size * self.cluster_retry {
            return (true, -1);
        }

        let i = self.attempt;
        self.attempt += 1;

        if (i + 1) % self.cluster_size == 0 {
            (false, self.wait_between_cluster)
        } else {
            (false, 0)
        }
    }
}

/// Runs an operation against the nodes of a cluster, moving to the next node
/// on every failure as directed by a fresh [`ClusterRetryContext`].
#[derive(Debug, Clone)]
pub struct ConnectionRetryWrapper {
    cluster_size: usize,
    cluster_retry: usize,
    wait_between_cluster: i64,
}

impl ConnectionRetryWrapper {
    pub fn new(cluster_size: usize) -> Self {
        Self {
            cluster_size,
            cluster_retry: DEFAULT_CLUSTER_RETRY,
            wait_between_cluster: DEFAULT_WAIT_BETWEEN_CLUSTER,
        }
    }

    pub fn with_policy(cluster_size: usize, cluster_retry: usize, wait_between_cluster: i64) -> Self {
        Self {
            cluster_size,
            cluster_retry,
            wait_between_cluster,
        }
    }

    /// Call `op(node)` until it succeeds or the retry context says stop.
    ///
    /// `target` names what is being delivered; it ends up in the
    /// `RunqError::Dispatch` returned when every attempt failed.
    pub async fn run<T, F, Fut>(&self, target: &str, mut op: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut ctx = ClusterRetryContext::with_policy(
            self.cluster_size,
            self.cluster_retry,
            self.wait_between_cluster,
        );

        if self.cluster_size == 0 {
            return Err(RunqError::Dispatch {
                execution_id: target.to_string(),
                reason: "cluster has no nodes".to_string(),
            });
        }

        let mut attempt = 0usize;
        loop {
            let node = attempt % self.cluster_size;
            let err = match op(node).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let (should_stop, wait_seconds) = ctx.test_should_stop();
            if should_stop {
                warn!(%target, attempts = attempt + 1, error = %err, "giving up on cluster");
                return Err(RunqError::Dispatch {
                    execution_id: target.to_string(),
                    reason: err.to_string(),
                });
            }

            debug!(%target, node, wait_seconds, error = %err, "cluster node failed; retrying");
            if wait_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(wait_seconds as u64)).await;
            }
            attempt += 1;
        }
    }
}
