// src/transport/cluster.rs

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::debug;

use super::retry::ConnectionRetryWrapper;
use super::ExecutionTransport;
use crate::config::TransportSection;
use crate::errors::{Result, RunqError};
use crate::model::ExecutionRequest;

/// Transport over a cluster of broker nodes, one bounded channel per node.
///
/// Each dispatch starts at node 0 and moves on to the next node whenever a
/// send fails, waiting between full passes as [`ConnectionRetryWrapper`]
/// dictates.
#[derive(Debug, Clone)]
pub struct ClusterTransport {
    nodes: Vec<mpsc::Sender<ExecutionRequest>>,
    retry: ConnectionRetryWrapper,
}

impl ClusterTransport {
    /// Create the transport together with the receiving end of every node.
    pub fn new(cluster_size: usize, capacity: usize) -> (Self, Vec<mpsc::Receiver<ExecutionRequest>>) {
        let (nodes, receivers): (Vec<_>, Vec<_>) =
            (0..cluster_size).map(|_| mpsc::channel(capacity.max(1))).unzip();
        let transport = Self::from_senders(nodes, ConnectionRetryWrapper::new(cluster_size));
        (transport, receivers)
    }

    pub fn from_config(section: &TransportSection) -> (Self, Vec<mpsc::Receiver<ExecutionRequest>>) {
        Self::new(section.cluster_size, section.channel_capacity)
    }

    /// Build from existing node senders and a custom retry policy.
    pub fn from_senders(nodes: Vec<mpsc::Sender<ExecutionRequest>>, retry: ConnectionRetryWrapper) -> Self {
        Self { nodes, retry }
    }

    pub fn cluster_size(&self) -> usize {
        self.nodes.len()
    }
}

impl ExecutionTransport for ClusterTransport {
    fn dispatch(
        &self,
        request: ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let execution_id = request.id.clone();
            self.retry
                .run(&execution_id, |node| {
                    let tx = self.nodes.get(node).cloned();
                    let request = request.clone();
                    async move {
                        let tx = tx.ok_or_else(|| RunqError::Dispatch {
                            execution_id: request.id.clone(),
                            reason: format!("no broker node {node}"),
                        })?;
                        tx.send(request).await.map_err(|err| RunqError::Dispatch {
                            execution_id: err.0.id.clone(),
                            reason: format!("broker node {node} closed"),
                        })?;
                        debug!(node, "delivered execution request");
                        Ok(())
                    }
                })
                .await
        })
    }
}
