//! Graph state.
//!
//! State is a JSON object valid only under a graph's compiled
//! [`StateSchema`]. Unlike the kernel's earlier generic-over-value-type
//! state trait, state here is fixed to `serde_json::Value`: the DSL's state
//! fields are dynamically typed (declared by `kind`, not by a Rust type).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::reducer::ReducerType;
use crate::error::{GraphError, GraphResult};

/// Reserved state keys every compiled graph seeds regardless of authored
/// `state_variables`.
pub const RESERVED_KEYS: &[&str] = &[
    "messages",
    "user_input",
    "last_response",
    "last_response_id",
    "node_responses",
    "metadata",
    "session",
    "exec_context",
    "current_node_id",
    "parent_agent",
    "node_structured",
    "approval_result",
    "end_structured_output",
];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// A single state update to be applied through a field's reducer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdate {
    pub key: String,
    pub value: Value,
}

impl StateUpdate {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl From<(String, Value)> for StateUpdate {
    fn from((key, value): (String, Value)) -> Self {
        Self::new(key, value)
    }
}

impl From<(&str, Value)> for StateUpdate {
    fn from((key, value): (&str, Value)) -> Self {
        Self::new(key, value)
    }
}

/// Describes one field of a compiled graph's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateField {
    pub name: String,
    pub type_name: String,
    pub reducer: ReducerType,
    pub default: Option<Value>,
    pub required: bool,
}

impl StateField {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            reducer: ReducerType::Overwrite,
            default: None,
            required: false,
        }
    }

    pub fn with_reducer(mut self, reducer: ReducerType) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// A compiled graph's full state schema: `field_name -> descriptor`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSchema {
    pub fields: HashMap<String, StateField>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(mut self, field: StateField) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&StateField> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(|s| s.as_str()).collect()
    }

    /// The reducer configured for a field, or [`ReducerType::Overwrite`] for
    /// any field not explicitly declared (matching the default reducer
    /// contract: "Replace").
    pub fn reducer_for(&self, name: &str) -> ReducerType {
        self.fields
            .get(name)
            .map(|f| f.reducer.clone())
            .unwrap_or(ReducerType::Overwrite)
    }
}

/// Mutable graph state: a JSON object plus whatever schema it was last
/// validated against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphState {
    data: serde_json::Map<String, Value>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: serde_json::Map<String, Value>) -> Self {
        Self { data }
    }

    pub fn from_value(value: Value) -> GraphResult<Self> {
        match value {
            Value::Object(map) => Ok(Self { data: map }),
            other => Err(GraphError::State(format!(
                "state must be a JSON object, got {other}"
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn keys(&self) -> Vec<&str> {
        self.data.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn as_map(&self) -> &serde_json::Map<String, Value> {
        &self.data
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// Validate against a schema: every `required` field must be present.
    pub fn validate(&self, schema: &StateSchema) -> GraphResult<()> {
        for field in schema.fields.values() {
            if field.required && !self.has_key(&field.name) {
                return Err(GraphError::State(format!(
                    "missing required state field: {}",
                    field.name
                )));
            }
        }
        Ok(())
    }
}
