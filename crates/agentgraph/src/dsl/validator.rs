//! Structural, component, and topology validation of a parsed graph
//! description, performed after parsing and before schema inference.

use super::ast::{EdgeDef, GraphDescription, NodeKind};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("validation_error: duplicate node id `{0}`")]
    DuplicateNodeId(String),
    #[error("validation_error: entry point `{0}` does not reference a known node")]
    UnknownEntryPoint(String),
    #[error("validation_error: finish point `{0}` does not reference a known node")]
    UnknownFinishPoint(String),
    #[error("validation_error: edge from `{0}` references unknown node `{1}`")]
    UnknownEdgeEndpoint(String, String),
    #[error("validation_error: node `{0}` of kind `{1}` is unreachable from the entry point")]
    UnreachableNode(String, String),
    #[error("validation_error: conditional edge from `{0}` has no fallback (final) arm")]
    ConditionalEdgeMissingFallback(String),
    #[error("validation_error: conditional edge from `{0}` has a fallback arm that is not last")]
    FallbackArmNotLast(String),
    #[error("validation_error: mcp node `{0}` has {1} incoming edges, at most one is allowed")]
    McpTooManyIncomingEdges(String, usize),
}

pub fn validate(graph: &GraphDescription) -> Result<(), ValidationError> {
    let mut ids: HashMap<&str, &NodeKind> = HashMap::new();
    for node in &graph.nodes {
        let id = node.id.as_deref().expect("auto-id assignment already ran");
        if ids.insert(id, &node.kind).is_some() {
            return Err(ValidationError::DuplicateNodeId(id.to_string()));
        }
    }

    if !ids.contains_key(graph.entry_point.as_str()) {
        return Err(ValidationError::UnknownEntryPoint(graph.entry_point.clone()));
    }
    for fp in &graph.finish_points {
        if !ids.contains_key(fp.as_str()) {
            return Err(ValidationError::UnknownFinishPoint(fp.clone()));
        }
    }

    validate_edges(&graph.edges, &ids)?;
    validate_node_kinds(graph, &ids)?;
    validate_reachability(graph, &ids)?;
    Ok(())
}

fn validate_edges(
    edges: &[EdgeDef],
    ids: &HashMap<&str, &NodeKind>,
) -> Result<(), ValidationError> {
    for edge in edges {
        if !ids.contains_key(edge.from.as_str()) {
            return Err(ValidationError::UnknownEdgeEndpoint(
                edge.from.clone(),
                edge.from.clone(),
            ));
        }
        if let Some(to) = &edge.to {
            if !ids.contains_key(to.as_str()) {
                return Err(ValidationError::UnknownEdgeEndpoint(
                    edge.from.clone(),
                    to.clone(),
                ));
            }
        }
        if !edge.conditions.is_empty() {
            let last_idx = edge.conditions.len() - 1;
            for (i, arm) in edge.conditions.iter().enumerate() {
                if !ids.contains_key(arm.to.as_str()) {
                    return Err(ValidationError::UnknownEdgeEndpoint(
                        edge.from.clone(),
                        arm.to.clone(),
                    ));
                }
                if arm.when.is_none() && i != last_idx {
                    return Err(ValidationError::FallbackArmNotLast(edge.from.clone()));
                }
            }
            if edge.conditions[last_idx].when.is_some() {
                return Err(ValidationError::ConditionalEdgeMissingFallback(
                    edge.from.clone(),
                ));
            }
        }
    }
    Ok(())
}

/// `builtin.mcp` nodes bind `input.*` to a single upstream node's structured
/// output, so a second incoming edge would make that binding ambiguous.
fn validate_node_kinds(
    graph: &GraphDescription,
    _ids: &HashMap<&str, &NodeKind>,
) -> Result<(), ValidationError> {
    let incoming = count_incoming_edges(&graph.edges);
    for node in &graph.nodes {
        let id = node.id.as_deref().unwrap();
        if matches!(node.kind, NodeKind::Mcp { .. }) {
            let count = incoming.get(id).copied().unwrap_or(0);
            if count > 1 {
                return Err(ValidationError::McpTooManyIncomingEdges(
                    id.to_string(),
                    count,
                ));
            }
        }
    }
    Ok(())
}

fn count_incoming_edges<'a>(edges: &'a [EdgeDef]) -> HashMap<&'a str, usize> {
    let mut incoming: HashMap<&str, usize> = HashMap::new();
    for edge in edges {
        if let Some(to) = &edge.to {
            *incoming.entry(to.as_str()).or_default() += 1;
        }
        for arm in &edge.conditions {
            *incoming.entry(arm.to.as_str()).or_default() += 1;
        }
    }
    incoming
}

/// Every node must be reachable from the entry point by following edges
/// (including multiple plain edges fanning out from the same source) and
/// while-loop bodies. Unreachable nodes are almost always an authoring
/// mistake (dangling node left after a rewire).
fn validate_reachability(
    graph: &GraphDescription,
    ids: &HashMap<&str, &NodeKind>,
) -> Result<(), ValidationError> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        if let Some(to) = &edge.to {
            adjacency.entry(&edge.from).or_default().push(to);
        }
        for arm in &edge.conditions {
            adjacency.entry(&edge.from).or_default().push(&arm.to);
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![graph.entry_point.as_str()];
    while let Some(cur) = stack.pop() {
        if !visited.insert(cur) {
            continue;
        }
        if let Some(next) = adjacency.get(cur) {
            stack.extend(next.iter().copied());
        }
    }

    for node in &graph.nodes {
        let id = node.id.as_deref().unwrap();
        if !visited.contains(id) {
            return Err(ValidationError::UnreachableNode(
                id.to_string(),
                node_kind_name(ids[id]),
            ));
        }
    }
    Ok(())
}

fn node_kind_name(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Start => "start",
        NodeKind::Llmagent { .. } => "llmagent",
        NodeKind::Transform { .. } => "transform",
        NodeKind::Mcp { .. } => "mcp",
        NodeKind::UserApproval { .. } => "user_approval",
        NodeKind::End { .. } => "end",
        NodeKind::While { .. } => "while",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parser::{parse, ParseMode};

    fn graph(json: &str) -> GraphDescription {
        parse(json, ParseMode::Lenient).unwrap()
    }

    #[test]
    fn rejects_unknown_entry_point() {
        let g = graph(r#"{"id":"g","entry_point":"nope","nodes":[{"builtin":"end"}]}"#);
        assert_eq!(
            validate(&g),
            Err(ValidationError::UnknownEntryPoint("nope".into()))
        );
    }

    #[test]
    fn rejects_conditional_edge_missing_fallback() {
        let g = graph(
            r#"{"id":"g","entry_point":"node_0","nodes":[
                {"builtin":"start"},
                {"builtin":"end"}
            ],"edges":[
                {"from":"node_0","conditions":[{"when":"state.x","to":"node_1"}]}
            ]}"#,
        );
        assert_eq!(
            validate(&g),
            Err(ValidationError::ConditionalEdgeMissingFallback(
                "node_0".into()
            ))
        );
    }

    #[test]
    fn rejects_unreachable_node() {
        let g = graph(
            r#"{"id":"g","entry_point":"node_0","nodes":[
                {"builtin":"end"},
                {"builtin":"end"}
            ]}"#,
        );
        assert!(matches!(
            validate(&g),
            Err(ValidationError::UnreachableNode(ref id, _)) if id == "node_1"
        ));
    }

    #[test]
    fn accepts_well_formed_graph() {
        let g = graph(
            r#"{"id":"g","entry_point":"node_0","finish_points":["node_1"],"nodes":[
                {"builtin":"start"},
                {"builtin":"end"}
            ],"edges":[
                {"from":"node_0","conditions":[{"to":"node_1"}]}
            ]}"#,
        );
        assert!(validate(&g).is_ok());
    }

    #[test]
    fn rejects_mcp_node_with_multiple_incoming_edges() {
        let g = graph(
            r#"{"id":"g","entry_point":"node_0","nodes":[
                {"builtin":"start"},
                {"builtin":"mcp","server":{"url":"https://tools.example.com","transport":"sse"},"tool":"search"},
                {"builtin":"end"}
            ],"edges":[
                {"from":"node_0","to":"node_1"},
                {"from":"node_2","to":"node_1"},
                {"from":"node_1","to":"node_2"}
            ]}"#,
        );
        assert_eq!(
            validate(&g),
            Err(ValidationError::McpTooManyIncomingEdges("node_1".into(), 2))
        );
    }
}
