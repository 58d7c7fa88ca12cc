// src/scheduler/mod.rs

//! The scheduling control loop.
//!
//! - [`handler`] the `Scheduler`: single steps, the pooled loop, completions.
//! - [`scheduler_step`] what one step did.
//! - [`backoff`] the wait curve used while storage is unavailable.

pub mod backoff;
pub mod handler;
pub mod scheduler_step;

pub use backoff::Backoff;
pub use handler::Scheduler;
pub use scheduler_step::SchedulerStep;
