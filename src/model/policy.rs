// src/model/policy.rs

use serde::Deserialize;
use serde_json::{Map, Value};

/// One `[[policy]]` entry: which driver applies to which resource, with what
/// parameters. Immutable for the duration of an evaluation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PolicyDescriptor {
    pub name: String,
    pub resource_ref: String,
    pub policy_type: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_parameters")]
    pub parameters: Value,
}

fn default_enabled() -> bool {
    true
}

fn default_parameters() -> Value {
    Value::Object(Map::new())
}

impl PolicyDescriptor {
    pub fn new(
        name: impl Into<String>,
        resource_ref: impl Into<String>,
        policy_type: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            resource_ref: resource_ref.into(),
            policy_type: policy_type.into(),
            enabled: true,
            parameters,
        }
    }
}
