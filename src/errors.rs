// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunqError {
    /// Transient storage failure; callers retry with backoff.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Timed out after {waited_ms}ms waiting for lock '{name}'")]
    LockTimeout { name: String, waited_ms: u128 },

    /// A lock row survived an owner-checked delete. Two holders believed they
    /// owned the same lock.
    #[error("Failed to release lock '{name}' (owner {owner}): {reason}")]
    LockRelease {
        name: String,
        owner: String,
        reason: String,
    },

    #[error("Policy '{policy}' failed: {reason}")]
    PolicyDriver { policy: String, reason: String },

    #[error("Dispatch of execution {execution_id} failed: {reason}")]
    Dispatch { execution_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunqError {
    /// Whether the failure is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RunqError::StorageUnavailable(_) | RunqError::Dispatch { .. }
        )
    }
}

impl From<rusqlite::Error> for RunqError {
    fn from(err: rusqlite::Error) -> Self {
        RunqError::StorageUnavailable(err.to_string())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RunqError>;
