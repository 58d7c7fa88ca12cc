// src/model/mod.rs

//! Records shared by the queue, the stores and the policy layer.
//!
//! - [`liveaction`] the mutable state of one execution plus status events.
//! - [`request`] the queued, schedulable snapshot of a liveaction.
//! - [`lock`] a named exclusive-ownership record.
//! - [`policy`] policy descriptors as loaded from configuration.

pub mod liveaction;
pub mod lock;
pub mod policy;
pub mod request;

pub use liveaction::{LiveAction, StatusChange};
pub use lock::Lock;
pub use policy::PolicyDescriptor;
pub use request::{EnqueueOptions, ExecutionRequest};

/// Fresh random identifier (UUID v4, hyphenated).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
