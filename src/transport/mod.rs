// src/transport/mod.rs

//! Delivery of scheduled executions to runners.
//!
//! The scheduler talks to an `ExecutionTransport` rather than to a channel
//! directly, so tests can swap in a recording or failing transport.
//!
//! - [`retry`] the cluster reconnect policy and the wrapper driving it.
//! - [`cluster`] a transport over N broker-node channels.

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::model::ExecutionRequest;

pub mod cluster;
pub mod retry;

pub use cluster::ClusterTransport;
pub use retry::{ClusterRetryContext, ConnectionRetryWrapper};

/// Hands a scheduled request to whatever runs it.
pub trait ExecutionTransport: Send + Sync {
    /// Fails with `RunqError::Dispatch` when the request could not be delivered.
    fn dispatch(
        &self,
        request: ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
