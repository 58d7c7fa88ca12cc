// src/model/liveaction.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::ExecutionStatus;

/// The mutable record representing the current state of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveAction {
    pub id: String,
    /// Action reference (e.g. `"core.http"`); policies are keyed on it.
    pub action: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub context: Value,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
}

impl LiveAction {
    /// New liveaction in `requested` state.
    pub fn new(action: impl Into<String>, parameters: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: super::new_id(),
            action: action.into(),
            status: ExecutionStatus::Requested,
            parameters,
            context: Value::Object(Map::new()),
            start_timestamp: now,
            end_timestamp: None,
        }
    }

    /// Resource reference used for policy lookup.
    pub fn resource_ref(&self) -> &str {
        &self.action
    }

    /// Look up a value in `context` by a dotted path such as `"policies.retry.attempt"`.
    pub fn context_value(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.context, |node, key| node.as_object()?.get(key))
    }

    /// Set a value in `context` by dotted path, creating intermediate objects.
    pub fn set_context_value(&mut self, path: &str, value: Value) {
        if !self.context.is_object() {
            self.context = Value::Object(Map::new());
        }

        let mut keys: Vec<&str> = path.split('.').collect();
        let Some(last) = keys.pop() else {
            return;
        };

        let mut node = &mut self.context;
        for key in keys {
            let Some(obj) = node.as_object_mut() else {
                return;
            };
            node = obj
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
        }

        if let Some(obj) = node.as_object_mut() {
            obj.insert(last.to_string(), value);
        }
    }
}

/// Published on every status transition so observers can follow progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub liveaction_id: String,
    pub action: String,
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
    pub at: DateTime<Utc>,
}
