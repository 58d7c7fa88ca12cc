// src/model/lock.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named exclusive-ownership record.
///
/// At most one live (non-expired) `Lock` exists per `name`. Only the holder of
/// the matching `owner` token can delete it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub name: String,
    /// Random per-acquisition token.
    pub owner: String,
    /// After this instant the row counts as abandoned.
    pub expiry: DateTime<Utc>,
    /// `hostname:pid` of the holder; diagnostic only.
    pub proc_info: String,
}

impl Lock {
    pub fn new(name: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            owner: super::new_id(),
            expiry,
            proc_info: proc_info(),
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now
    }
}

/// `hostname:pid` for the current process.
pub fn proc_info() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{host}:{}", std::process::id())
}
