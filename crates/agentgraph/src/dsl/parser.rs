//! Graph description parsing: JSON decode plus auto-id assignment.
//!
//! Strict mode rejects unknown fields and missing node ids outright;
//! lenient mode (the default for interactive authoring tools) fills in
//! missing node ids deterministically and tolerates unknown top-level
//! fields by ignoring them.

use super::ast::{GraphDescription, NodeDef};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("parse_error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("parse_error: unknown field `{0}` (strict mode)")]
    UnknownField(String),
    #[error("parse_error: node at index {0} has no id and auto-id assignment is disabled")]
    MissingNodeId(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    Strict,
    #[default]
    Lenient,
}

/// Parse a graph description from JSON text.
pub fn parse(input: &str, mode: ParseMode) -> Result<GraphDescription, ParseError> {
    if mode == ParseMode::Strict {
        reject_unknown_fields(input)?;
    }
    let mut graph: GraphDescription = serde_json::from_str(input)?;
    match mode {
        ParseMode::Strict => {
            for (i, node) in graph.nodes.iter().enumerate() {
                if node.id.is_none() {
                    return Err(ParseError::MissingNodeId(i));
                }
            }
        }
        ParseMode::Lenient => assign_auto_ids(&mut graph.nodes),
    }
    Ok(graph)
}

const KNOWN_TOP_LEVEL_FIELDS: &[&str] = &[
    "id",
    "name",
    "description",
    "state_variables",
    "nodes",
    "edges",
    "entry_point",
    "finish_points",
    "recursion_limit",
];

fn reject_unknown_fields(input: &str) -> Result<(), ParseError> {
    let value: serde_json::Value = serde_json::from_str(input)?;
    if let serde_json::Value::Object(map) = &value {
        for key in map.keys() {
            if !KNOWN_TOP_LEVEL_FIELDS.contains(&key.as_str()) {
                return Err(ParseError::UnknownField(key.clone()));
            }
        }
    }
    Ok(())
}

/// Assign `node_{index}` to any node missing an explicit id, in document
/// order. Existing ids are left untouched, so mixed explicit/implicit ids
/// are supported.
fn assign_auto_ids(nodes: &mut [NodeDef]) {
    for (i, node) in nodes.iter_mut().enumerate() {
        if node.id.is_none() {
            node.id = Some(format!("node_{i}"));
        }
        if let super::ast::NodeKind::While { body, .. } = &mut node.kind {
            assign_auto_ids(body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(nodes_json: &str) -> String {
        format!(
            r#"{{"id": "g1", "entry_point": "n0", "nodes": [{nodes_json}]}}"#
        )
    }

    #[test]
    fn lenient_mode_fills_missing_ids_in_order() {
        let json = sample(r#"{"builtin": "end"}"#);
        let graph = parse(&json, ParseMode::Lenient).unwrap();
        assert_eq!(graph.nodes[0].id.as_deref(), Some("node_0"));
    }

    #[test]
    fn strict_mode_rejects_missing_id() {
        let json = sample(r#"{"builtin": "end"}"#);
        let err = parse(&json, ParseMode::Strict).unwrap_err();
        assert!(matches!(err, ParseError::MissingNodeId(0)));
    }

    #[test]
    fn strict_mode_rejects_unknown_top_level_field() {
        let json = r#"{"id": "g1", "entry_point": "n0", "nodes": [], "bogus": 1}"#;
        let err = parse(json, ParseMode::Strict).unwrap_err();
        assert!(matches!(err, ParseError::UnknownField(ref f) if f == "bogus"));
    }

    #[test]
    fn lenient_mode_ignores_unknown_top_level_field() {
        let json = r#"{"id": "g1", "entry_point": "n0", "nodes": [], "bogus": 1}"#;
        assert!(parse(json, ParseMode::Lenient).is_ok());
    }

    #[test]
    fn auto_ids_recurse_into_while_body() {
        let json = sample(
            r#"{"builtin": "while", "condition": "state.i < 3", "body": [{"builtin": "end"}]}"#,
        );
        let graph = parse(&json, ParseMode::Lenient).unwrap();
        if let super::super::ast::NodeKind::While { body, .. } = &graph.nodes[0].kind {
            assert_eq!(body[0].id.as_deref(), Some("node_0"));
        } else {
            panic!("expected while node");
        }
    }
}
