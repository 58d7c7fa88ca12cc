// src/exec/mod.rs

//! Process execution layer.
//!
//! Stands in for the remote runners: [`runner`] consumes what the transport
//! delivers, runs the command with `tokio::process::Command`, and reports the
//! terminal liveaction back so the scheduler can apply after-policies.

pub mod runner;

pub use runner::LocalRunner;
