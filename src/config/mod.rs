// src/config/mod.rs

//! Configuration loading and validation for runq.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Parse human duration strings (`duration.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants such as backoff sanity and policy types (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, CoordinationSection, GarbageCollectorSection, LockSection, RawConfigFile,
    ReschedulerSection, SchedulerSection, StorageSection, TransportSection,
};
