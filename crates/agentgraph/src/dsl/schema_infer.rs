//! State schema inference: union of declared `state_variables`, fields
//! implicitly produced by node kinds (e.g. `builtin.llmagent`'s
//! `output_field`), and the reserved keys every compiled graph seeds.

use super::ast::{GraphDescription, NodeKind};
use agentgraph_kernel::workflow::{is_reserved_key, StateField, StateSchema};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema_conflict: field `{0}` is declared with reducer `{1}` but node `{2}` implies reducer `{3}`")]
    Conflict(String, String, String, String),
    #[error("unknown_reducer: {0}")]
    UnknownReducer(String),
}

/// Infer the full state schema for a graph description.
///
/// Precedence: an explicitly declared `state_variables` entry always wins;
/// a node-implied field (e.g. an llmagent's `output_field`, defaulted to
/// `overwrite`) is added only if not already declared, and conflicts with
/// a *different* node-implied reducer for the same field are rejected.
pub fn infer_schema(graph: &GraphDescription) -> Result<StateSchema, SchemaError> {
    let mut schema = StateSchema::new();
    let mut declared = std::collections::HashSet::new();

    for var in &graph.state_variables {
        let reducer = agentgraph_kernel::workflow::ReducerType::from_str(&var.reducer)
            .map_err(|_| SchemaError::UnknownReducer(var.reducer.clone()))?;
        let mut field = StateField::new(&var.name, &var.type_name)
            .with_reducer(reducer)
            .with_required(var.required);
        if let Some(default) = &var.default {
            field = field.with_default(default.clone());
        }
        schema = schema.add_field(field);
        declared.insert(var.name.clone());
    }

    let mut implied: HashMap<String, String> = HashMap::new();
    for node in &graph.nodes {
        collect_implied_fields(&node.kind, &mut implied)?;
    }
    for (name, reducer_name) in implied {
        if declared.contains(&name) {
            continue;
        }
        let reducer = agentgraph_kernel::workflow::ReducerType::from_str(&reducer_name)
            .map_err(|_| SchemaError::UnknownReducer(reducer_name.clone()))?;
        schema = schema.add_field(StateField::new(&name, "any").with_reducer(reducer));
    }

    for key in agentgraph_kernel::workflow::RESERVED_KEYS {
        if !is_reserved_key(key) || schema.get_field(key).is_some() {
            continue;
        }
        let reducer = match *key {
            "messages" => "message",
            "node_responses" => "merge",
            "metadata" | "exec_context" | "node_structured" => "merge",
            _ => "default",
        };
        schema = schema.add_field(
            StateField::new(*key, "any")
                .with_reducer(agentgraph_kernel::workflow::ReducerType::from_str(reducer).unwrap()),
        );
    }

    Ok(schema)
}

fn collect_implied_fields(
    kind: &NodeKind,
    out: &mut HashMap<String, String>,
) -> Result<(), SchemaError> {
    match kind {
        NodeKind::Llmagent { output_field, .. } => {
            if let Some(field) = output_field {
                insert_implied(out, field, "default")?;
            }
        }
        NodeKind::Transform { set_state } => {
            for field in set_state.keys() {
                insert_implied(out, field, "default")?;
            }
        }
        NodeKind::UserApproval { approval_field, .. } => {
            insert_implied(out, approval_field, "default")?;
        }
        NodeKind::While { body, .. } => {
            for node in body {
                collect_implied_fields(&node.kind, out)?;
            }
        }
        // MCP results land in the already reserved, merge-reducer-backed
        // `node_structured` key rather than a declared field of their own.
        NodeKind::Start | NodeKind::Mcp { .. } | NodeKind::End { .. } => {}
    }
    Ok(())
}

fn insert_implied(
    out: &mut HashMap<String, String>,
    field: &str,
    reducer: &str,
) -> Result<(), SchemaError> {
    match out.get(field) {
        Some(existing) if existing != reducer => Err(SchemaError::Conflict(
            field.to_string(),
            existing.clone(),
            field.to_string(),
            reducer.to_string(),
        )),
        _ => {
            out.insert(field.to_string(), reducer.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parser::{parse, ParseMode};

    #[test]
    fn declared_state_variable_is_preserved() {
        let g = parse(
            r#"{"id":"g","entry_point":"node_0","state_variables":[
                {"name":"counter","type":"number","reducer":"default"}
            ],"nodes":[{"builtin":"end"}]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let schema = infer_schema(&g).unwrap();
        assert!(schema.get_field("counter").is_some());
    }

    #[test]
    fn reserved_keys_always_present() {
        let g = parse(
            r#"{"id":"g","entry_point":"node_0","nodes":[{"builtin":"end"}]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let schema = infer_schema(&g).unwrap();
        assert!(schema.get_field("messages").is_some());
        assert_eq!(
            schema.get_field("messages").unwrap().reducer,
            agentgraph_kernel::workflow::ReducerType::Message
        );
    }

    #[test]
    fn llmagent_output_field_is_implied() {
        let g = parse(
            r#"{"id":"g","entry_point":"node_0","nodes":[
                {"builtin":"llmagent","model":"m1","output_field":"answer"}
            ]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let schema = infer_schema(&g).unwrap();
        assert!(schema.get_field("answer").is_some());
    }

    #[test]
    fn unknown_reducer_name_is_rejected() {
        let g = parse(
            r#"{"id":"g","entry_point":"node_0","state_variables":[
                {"name":"x","reducer":"bogus"}
            ],"nodes":[{"builtin":"end"}]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        assert!(infer_schema(&g).is_err());
    }
}
