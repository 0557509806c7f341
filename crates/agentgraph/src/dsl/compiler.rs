//! Compiles a validated [`GraphDescription`] into a [`CompiledGraphDef`]:
//! loop flattening, node lowering for every builtin kind, conditional edge
//! lowering, and reference resolution against the model registry.
//!
//! Grounded on the teacher's `workflow/state_graph.rs` builder (node/edge
//! registration shape) generalized from a hand-built Rust API to a
//! data-driven compile step, since the DSL builds graphs from JSON rather
//! than builder calls.

use super::ast::{EdgeDef, GraphDescription, NodeDef, NodeKind};
use super::cel::{self, Expr, ExprError};
use super::schema_infer::{self, SchemaError};
use super::validator::{self, ValidationError};
use agentgraph_kernel::workflow::StateSchema;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Expression(#[from] ExprError),
    #[error("resolution_error: node `{node}` references unknown model `{name}`")]
    UnknownModel { node: String, name: String },
    #[error("resolution_error: while node `{0}` has no outgoing edge to resume after the loop")]
    WhileMissingExit(String),
}

/// A node after loop-flattening and expression compilation. IDs are stable
/// across invocations for the same input graph.
#[derive(Debug, Clone)]
pub struct CompiledNode {
    pub id: String,
    pub kind: CompiledKind,
}

#[derive(Debug, Clone)]
pub enum CompiledKind {
    Start,
    Llmagent {
        model: String,
        system_prompt: Option<String>,
        prompt_template: Option<String>,
        output_field: Option<String>,
        output_schema: Option<serde_json::Value>,
        tools: Vec<String>,
        env: Option<String>,
    },
    Transform {
        set_state: Vec<(String, Expr)>,
    },
    Mcp {
        server: agentgraph_kernel::McpServerConfig,
        tool: String,
        arguments: Vec<(String, Expr)>,
    },
    UserApproval {
        prompt: Option<String>,
        approval_field: String,
    },
    End {
        output: Option<Expr>,
    },
}

#[derive(Debug, Clone)]
pub enum EdgeRoute {
    Single(String),
    /// Ordered arms; an arm with `None` guard is the fallback and is always
    /// last (enforced by `validator::validate`).
    Conditional(Vec<(Option<Expr>, String)>),
}

#[derive(Debug, Clone)]
pub struct CompiledEdge {
    pub from: String,
    pub route: EdgeRoute,
}

#[derive(Debug, Clone)]
pub struct CompiledGraphDef {
    pub id: String,
    pub nodes: Vec<CompiledNode>,
    pub edges: Vec<CompiledEdge>,
    pub entry_point: String,
    pub finish_points: Vec<String>,
    pub schema: StateSchema,
    pub recursion_limit: u32,
}

const DEFAULT_RECURSION_LIMIT: u32 = 25;
const LOOP_SEP: &str = "__";

/// Compile a parsed, validated graph description. `known_models` is the set
/// of model names the runtime can actually resolve (via `ModelProvider`);
/// an `llmagent` node referencing anything else is a resolution_error.
pub fn compile(
    graph: &GraphDescription,
    known_models: &[&str],
) -> Result<CompiledGraphDef, CompileError> {
    validator::validate(graph)?;
    let schema = schema_infer::infer_schema(graph)?;

    let (flat_nodes, flat_edges) = flatten_loops(&graph.nodes, &graph.edges)?;

    let mut nodes = Vec::with_capacity(flat_nodes.len());
    for node in &flat_nodes {
        nodes.push(lower_node(node, known_models)?);
    }

    let mut edges = Vec::with_capacity(flat_edges.len());
    for edge in &flat_edges {
        edges.push(lower_edge(edge)?);
    }

    Ok(CompiledGraphDef {
        id: graph.id.clone(),
        nodes,
        edges,
        entry_point: graph.entry_point.clone(),
        finish_points: graph.finish_points.clone(),
        schema,
        recursion_limit: graph.recursion_limit.unwrap_or(DEFAULT_RECURSION_LIMIT),
    })
}

/// Flattens every `builtin.while` node into a promoted body chain plus a
/// router node (reusing the while node's own id) that re-evaluates the
/// loop condition each pass: `true` re-enters the body, `false` takes the
/// while node's original single outgoing edge.
fn flatten_loops(
    nodes: &[NodeDef],
    edges: &[EdgeDef],
) -> Result<(Vec<NodeDef>, Vec<EdgeDef>), CompileError> {
    let mut out_nodes = Vec::new();
    let mut out_edges = edges.to_vec();

    for node in nodes {
        let id = node.id.clone().expect("auto-id assignment already ran");
        if let NodeKind::While { condition, body } = &node.kind {
            let exit_to = edges
                .iter()
                .find(|e| e.from == id)
                .and_then(|e| e.to.clone())
                .ok_or_else(|| CompileError::WhileMissingExit(id.clone()))?;
            out_edges.retain(|e| e.from != id);

            let (body_nodes, body_edges) = flatten_loops(body, &[])?;
            let prefixed: Vec<NodeDef> = body_nodes
                .iter()
                .map(|n| NodeDef {
                    id: Some(format!("{id}{LOOP_SEP}{}", n.id.as_ref().unwrap())),
                    name: n.name.clone(),
                    kind: n.kind.clone(),
                })
                .collect();

            out_nodes.push(NodeDef {
                id: Some(id.clone()),
                name: node.name.clone(),
                kind: NodeKind::Start,
            });
            out_edges.push(EdgeDef {
                from: id.clone(),
                to: None,
                conditions: vec![
                    super::ast::ConditionalEdgeDef {
                        when: Some(condition.clone()),
                        to: prefixed
                            .first()
                            .map(|n| n.id.clone().unwrap())
                            .unwrap_or_else(|| exit_to.clone()),
                    },
                    super::ast::ConditionalEdgeDef {
                        when: None,
                        to: exit_to,
                    },
                ],
            });

            for (i, n) in prefixed.iter().enumerate() {
                out_nodes.push(n.clone());
                let next = prefixed
                    .get(i + 1)
                    .map(|n| n.id.clone().unwrap())
                    .unwrap_or_else(|| id.clone());
                if !body_edges.iter().any(|e| e.from == body[i].id.clone().unwrap()) {
                    out_edges.push(EdgeDef {
                        from: n.id.clone().unwrap(),
                        to: Some(next),
                        conditions: vec![],
                    });
                }
            }
            for e in body_edges {
                out_edges.push(EdgeDef {
                    from: format!("{id}{LOOP_SEP}{}", e.from),
                    to: e.to.map(|t| format!("{id}{LOOP_SEP}{t}")),
                    conditions: e
                        .conditions
                        .into_iter()
                        .map(|c| super::ast::ConditionalEdgeDef {
                            when: c.when,
                            to: format!("{id}{LOOP_SEP}{}", c.to),
                        })
                        .collect(),
                });
            }
        } else {
            out_nodes.push(node.clone());
        }
    }

    Ok((out_nodes, out_edges))
}

fn lower_node(node: &NodeDef, known_models: &[&str]) -> Result<CompiledNode, CompileError> {
    let id = node.id.clone().expect("auto-id assignment already ran");
    let kind = match &node.kind {
        NodeKind::Llmagent {
            model,
            system_prompt,
            prompt_template,
            output_field,
            output_schema,
            tools,
            env,
        } => {
            if !known_models.is_empty() && !known_models.contains(&model.as_str()) {
                return Err(CompileError::UnknownModel {
                    node: id.clone(),
                    name: model.clone(),
                });
            }
            CompiledKind::Llmagent {
                model: model.clone(),
                system_prompt: system_prompt.clone(),
                prompt_template: prompt_template.clone(),
                output_field: output_field.clone(),
                output_schema: output_schema.clone(),
                tools: tools.clone(),
                env: env.clone(),
            }
        }
        NodeKind::Transform { set_state } => {
            let mut compiled = Vec::with_capacity(set_state.len());
            for (field, expr_src) in set_state {
                compiled.push((field.clone(), cel::compile(expr_src)?));
            }
            CompiledKind::Transform { set_state: compiled }
        }
        NodeKind::Start => CompiledKind::Start,
        NodeKind::Mcp {
            server,
            tool,
            arguments,
        } => {
            let mut compiled = Vec::with_capacity(arguments.len());
            for (field, expr_src) in arguments {
                compiled.push((field.clone(), cel::compile(expr_src)?));
            }
            CompiledKind::Mcp {
                server: server.clone(),
                tool: tool.clone(),
                arguments: compiled,
            }
        }
        NodeKind::UserApproval {
            prompt,
            approval_field,
        } => CompiledKind::UserApproval {
            prompt: prompt.clone(),
            approval_field: approval_field.clone(),
        },
        NodeKind::End { output } => CompiledKind::End {
            output: output.as_deref().map(cel::compile).transpose()?,
        },
        NodeKind::While { .. } => unreachable!("while nodes are flattened before lowering"),
    };
    Ok(CompiledNode { id, kind })
}

fn lower_edge(edge: &EdgeDef) -> Result<CompiledEdge, CompileError> {
    let route = if edge.conditions.is_empty() {
        EdgeRoute::Single(
            edge.to
                .clone()
                .expect("validator guarantees `to` or `conditions` is set"),
        )
    } else {
        let mut arms = Vec::with_capacity(edge.conditions.len());
        for arm in &edge.conditions {
            let guard = arm.when.as_deref().map(cel::compile).transpose()?;
            arms.push((guard, arm.to.clone()));
        }
        EdgeRoute::Conditional(arms)
    };
    Ok(CompiledEdge {
        from: edge.from.clone(),
        route,
    })
}

/// Evaluate every outgoing edge from `from` against compiled state,
/// returning all chosen target ids. A node may have several plain edges to
/// different targets (static fan-out) and/or one conditional-edge group;
/// each conditional group contributes at most the single arm whose guard
/// matched first. Used by the engine at routing time.
pub fn route_targets(
    edges: &[CompiledEdge],
    from: &str,
    root: &HashMap<String, serde_json::Value>,
) -> Vec<String> {
    let mut targets = Vec::new();
    for edge in edges.iter().filter(|e| e.from == from) {
        match &edge.route {
            EdgeRoute::Single(to) => targets.push(to.clone()),
            EdgeRoute::Conditional(arms) => {
                for (guard, to) in arms {
                    match guard {
                        Some(expr) if expr.eval_bool(root) => {
                            targets.push(to.clone());
                            break;
                        }
                        None => {
                            targets.push(to.clone());
                            break;
                        }
                        _ => continue,
                    }
                }
            }
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parser::{parse, ParseMode};
    use serde_json::json;

    fn compile_json(json: &str) -> Result<CompiledGraphDef, CompileError> {
        let g = parse(json, ParseMode::Lenient).unwrap();
        compile(&g, &["gpt-4o"])
    }

    #[test]
    fn llmagent_node_lowers_with_resolved_model() {
        let def = compile_json(
            r#"{"id":"g","entry_point":"node_0","finish_points":["node_1"],"nodes":[
                {"builtin":"llmagent","model":"gpt-4o","output_field":"answer"},
                {"builtin":"end"}
            ],"edges":[{"from":"node_0","to":"node_1"}]}"#,
        )
        .unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert!(matches!(def.nodes[0].kind, CompiledKind::Llmagent { .. }));
    }

    #[test]
    fn unknown_model_is_a_resolution_error() {
        let err = compile_json(
            r#"{"id":"g","entry_point":"node_0","nodes":[
                {"builtin":"llmagent","model":"not-registered"}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnknownModel { .. }));
    }

    #[test]
    fn while_loop_flattens_into_start_and_promoted_body() {
        let def = compile_json(
            r#"{"id":"g","entry_point":"node_0","finish_points":["node_1"],"nodes":[
                {"builtin":"while","condition":"state.i < 3","body":[
                    {"builtin":"transform","set_state":{"i":"state.i"}}
                ]},
                {"builtin":"end"}
            ],"edges":[{"from":"node_0","to":"node_1"}]}"#,
        )
        .unwrap();
        assert!(def.nodes.iter().any(|n| matches!(n.kind, CompiledKind::Start)));
        assert!(def.nodes.iter().any(|n| n.id == "node_0__node_0"));
    }

    #[test]
    fn conditional_routing_picks_first_matching_arm() {
        let def = compile_json(
            r#"{"id":"g","entry_point":"node_0","finish_points":["node_1","node_2"],"nodes":[
                {"builtin":"start"},
                {"builtin":"end"},
                {"builtin":"end"}
            ],"edges":[
                {"from":"node_0","conditions":[
                    {"when":"state.go == \"a\"","to":"node_1"},
                    {"to":"node_2"}
                ]}
            ]}"#,
        )
        .unwrap();
        let mut root = HashMap::new();
        root.insert("state".to_string(), json!({"go": "a"}));
        assert_eq!(route_targets(&def.edges, "node_0", &root), vec!["node_1".to_string()]);

        root.insert("state".to_string(), json!({"go": "b"}));
        assert_eq!(route_targets(&def.edges, "node_0", &root), vec!["node_2".to_string()]);
    }

    #[test]
    fn multiple_plain_edges_from_one_node_all_route() {
        let def = compile_json(
            r#"{"id":"g","entry_point":"node_0","finish_points":["node_1","node_2"],"nodes":[
                {"builtin":"start"},
                {"builtin":"end"},
                {"builtin":"end"}
            ],"edges":[
                {"from":"node_0","to":"node_1"},
                {"from":"node_0","to":"node_2"}
            ]}"#,
        )
        .unwrap();
        let root = HashMap::new();
        let mut targets = route_targets(&def.edges, "node_0", &root);
        targets.sort();
        assert_eq!(targets, vec!["node_1".to_string(), "node_2".to_string()]);
    }
}
