//! Reducers: deterministic `(old, delta) -> new` merge functions applied
//! per state field at the end of a superstep.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GraphError, GraphResult};

/// The five reducer kinds the DSL's `state_variables[].reducer` can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReducerType {
    /// Replace. The default reducer for any field with none declared.
    #[default]
    Overwrite,
    /// Concatenate ordered sequences. Commutative only for disjoint writers
    /// in the same superstep.
    Append,
    /// Recursive object merge; later writer wins on conflicting scalar keys
    /// within a superstep.
    Merge,
    /// Append-to-conversation with deduplication of equal adjacent
    /// assistant/tool messages.
    Message,
    /// Deduplicated, order-preserving union of string sequences.
    StringSlice,
}

impl std::fmt::Display for ReducerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Overwrite => "default",
            Self::Append => "append",
            Self::Merge => "merge",
            Self::Message => "message",
            Self::StringSlice => "string_slice",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ReducerType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" | "overwrite" => Ok(Self::Overwrite),
            "append" => Ok(Self::Append),
            "merge" => Ok(Self::Merge),
            "message" => Ok(Self::Message),
            "string_slice" => Ok(Self::StringSlice),
            other => Err(GraphError::ValidationFailed(format!(
                "unknown_reducer: {other}"
            ))),
        }
    }
}

impl ReducerType {
    /// Apply this reducer's merge contract. `current` is `None` when the
    /// field has never been written.
    pub fn reduce(&self, current: Option<&Value>, delta: &Value) -> GraphResult<Value> {
        match self {
            Self::Overwrite => Ok(delta.clone()),
            Self::Append => reduce_append(current, delta),
            Self::Merge => reduce_merge(current, delta),
            Self::Message => reduce_message(current, delta),
            Self::StringSlice => reduce_string_slice(current, delta),
        }
    }
}

fn as_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn reduce_append(current: Option<&Value>, delta: &Value) -> GraphResult<Value> {
    let mut items = current.map(as_array).unwrap_or_default();
    items.extend(as_array(delta));
    Ok(Value::Array(items))
}

fn reduce_merge(current: Option<&Value>, delta: &Value) -> GraphResult<Value> {
    let base = match current {
        Some(Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    };
    let patch = match delta {
        Value::Object(map) => map,
        other => {
            return Err(GraphError::State(format!(
                "merge reducer requires an object delta, got {other}"
            )))
        }
    };
    let mut merged = base;
    for (key, value) in patch {
        match (merged.get(key), value) {
            (Some(Value::Object(_)), Value::Object(_)) => {
                let nested = reduce_merge(merged.get(key), value)?;
                merged.insert(key.clone(), nested);
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(Value::Object(merged))
}

fn message_key(message: &Value) -> (Option<&str>, Option<&str>) {
    let role = message.get("role").and_then(Value::as_str);
    let content = message.get("content").and_then(Value::as_str);
    (role, content)
}

fn reduce_message(current: Option<&Value>, delta: &Value) -> GraphResult<Value> {
    let mut messages = current.map(as_array).unwrap_or_default();
    for message in as_array(delta) {
        let duplicate = messages
            .last()
            .map(|last| message_key(last) == message_key(&message))
            .unwrap_or(false);
        let is_assistant_or_tool = matches!(
            message.get("role").and_then(Value::as_str),
            Some("assistant") | Some("tool")
        );
        if duplicate && is_assistant_or_tool {
            continue;
        }
        messages.push(message);
    }
    Ok(Value::Array(messages))
}

fn reduce_string_slice(current: Option<&Value>, delta: &Value) -> GraphResult<Value> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in current
        .map(as_array)
        .unwrap_or_default()
        .into_iter()
        .chain(as_array(delta))
    {
        let Some(s) = value.as_str().map(str::to_string) else {
            return Err(GraphError::State(format!(
                "string_slice reducer requires string items, got {value}"
            )));
        };
        if seen.insert(s.clone()) {
            out.push(Value::String(s));
        }
    }
    Ok(Value::Array(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overwrite_replaces() {
        let result = ReducerType::Overwrite
            .reduce(Some(&json!("old")), &json!("new"))
            .unwrap();
        assert_eq!(result, json!("new"));
    }

    #[test]
    fn append_concatenates() {
        let result = ReducerType::Append
            .reduce(Some(&json!([1, 2])), &json!([3, 4]))
            .unwrap();
        assert_eq!(result, json!([1, 2, 3, 4]));
    }

    #[test]
    fn append_to_absent_field_creates_list() {
        let result = ReducerType::Append.reduce(None, &json!([1])).unwrap();
        assert_eq!(result, json!([1]));
    }

    #[test]
    fn merge_is_recursive_and_later_writer_wins() {
        let current = json!({"a": {"x": 1, "y": 2}, "b": 10});
        let delta = json!({"a": {"y": 99, "z": 3}, "c": 20});
        let result = ReducerType::Merge.reduce(Some(&current), &delta).unwrap();
        assert_eq!(
            result,
            json!({"a": {"x": 1, "y": 99, "z": 3}, "b": 10, "c": 20})
        );
    }

    #[test]
    fn message_appends_and_dedups_adjacent_assistant() {
        let current = json!([{"role": "user", "content": "hi"}]);
        let delta = json!([{"role": "assistant", "content": "hello"}]);
        let result = ReducerType::Message.reduce(Some(&current), &delta).unwrap();
        assert_eq!(
            result,
            json!([
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ])
        );

        let result2 = ReducerType::Message.reduce(Some(&result), &delta).unwrap();
        // Exact duplicate adjacent assistant message is not appended again.
        assert_eq!(result2, result);
    }

    #[test]
    fn message_does_not_dedup_user_messages() {
        let current = json!([{"role": "user", "content": "hi"}]);
        let delta = json!([{"role": "user", "content": "hi"}]);
        let result = ReducerType::Message.reduce(Some(&current), &delta).unwrap();
        assert_eq!(result.as_array().unwrap().len(), 2);
    }

    #[test]
    fn string_slice_dedups_preserving_order() {
        let current = json!(["a", "b"]);
        let delta = json!(["b", "c"]);
        let result = ReducerType::StringSlice
            .reduce(Some(&current), &delta)
            .unwrap();
        assert_eq!(result, json!(["a", "b", "c"]));
    }

    #[test]
    fn reducer_type_from_str_rejects_unknown() {
        use std::str::FromStr;
        assert_eq!(
            ReducerType::from_str("append").unwrap(),
            ReducerType::Append
        );
        assert!(ReducerType::from_str("bogus").is_err());
    }

    #[test]
    fn reducer_type_display_matches_dsl_names() {
        assert_eq!(ReducerType::Overwrite.to_string(), "default");
        assert_eq!(ReducerType::StringSlice.to_string(), "string_slice");
    }
}
