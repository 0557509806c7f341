//! Standalone-program codegen backend: turns a [`CompiledGraphDef`] into
//! source text for a self-contained runner, independent of the in-process
//! engine in `crate::engine`.
//!
//! The generated program embeds real node and edge structure — `switch`-
//! shaped routing for single-field `==` conditionals, a transform/end
//! `set_state` evaluator compiled from each node's CEL expression — rather
//! than delegating back to this crate at runtime; that is what makes it a
//! standalone program and not a thin shim. It still never embeds a concrete
//! LLM SDK call or MCP transport (the caller wires those in, same as the
//! in-process engine does).

use super::cel::Expr;
use super::compiler::{CompiledGraphDef, CompiledKind, EdgeRoute};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use thiserror::Error;

/// The four ways a generated program can be invoked, per the code
/// generation backend's run-mode contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// A REPL-style terminal session: read a line, run the graph, print
    /// the resulting state, repeat.
    InteractiveCli,
    /// An AG-UI-compatible HTTP server exposing the graph as an agent.
    AguiHttpServer,
    /// An A2A-compatible server exposing the graph as an agent card.
    A2aServer,
    /// An OpenAI chat-completions-compatible HTTP server.
    OpenAiCompatibleApi,
}

impl RunMode {
    pub fn flag(self) -> &'static str {
        match self {
            RunMode::InteractiveCli => "cli",
            RunMode::AguiHttpServer => "agui",
            RunMode::A2aServer => "a2a",
            RunMode::OpenAiCompatibleApi => "openai",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodegenError {
    /// `input.output_parsed`/`input.output_raw` appeared outside a routing
    /// function's conditional-edge guard.
    #[error("codegen_error: node `{node}` uses `input.{field}` in a {context} expression; that binding is only valid in a routing function")]
    RoutingOnlyBinding {
        node: String,
        field: &'static str,
        context: &'static str,
    },
}

/// Allocates one environment variable name per distinct model referenced by
/// an `llmagent` node: an explicit `env:X` (stored on the node as `env`) is
/// honored as-is; otherwise `<PROVIDER>_API_KEY`, with a numeric suffix for
/// additional distinct models under the same provider. The provider is the
/// portion of the model id before its first `/` or `:` (e.g. `openai` from
/// `openai/gpt-4o`), falling back to the whole model id.
pub fn allocate_env_vars(_graph_id: &str, def: &CompiledGraphDef) -> Vec<(String, String)> {
    let mut per_model: BTreeMap<String, Option<String>> = BTreeMap::new();
    for node in &def.nodes {
        if let CompiledKind::Llmagent { model, env, .. } = &node.kind {
            per_model.entry(model.clone()).or_insert_with(|| env.clone());
        }
    }
    let mut provider_counts: HashMap<String, u32> = HashMap::new();
    per_model
        .into_iter()
        .map(|(model, explicit)| {
            let var = match explicit {
                Some(name) => sanitize_env_name(&name),
                None => {
                    let provider = provider_of(&model);
                    let count = provider_counts.entry(provider.to_string()).or_insert(0);
                    *count += 1;
                    let suffix = if *count > 1 {
                        format!("_{count}")
                    } else {
                        String::new()
                    };
                    sanitize_env_name(&format!("{provider}_API_KEY{suffix}"))
                }
            };
            (model, var)
        })
        .collect()
}

fn provider_of(model: &str) -> &str {
    model.split(['/', ':']).next().unwrap_or(model)
}

fn sanitize_env_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// A restricted evaluation context is used when compiling `input.*`
/// expressions for a routing function (conditional edge guards): only
/// `input.output_parsed` and `input.output_raw` may appear there, since a
/// routing function sees the *previous* node's output, not a general state
/// snapshot. Detection walks the compiled expression's AST (see
/// `Expr::references_field`), not its source text.
pub fn routing_function_reads_raw_output(expr: &Expr) -> bool {
    expr.references_field("input", "output_raw")
}

pub fn routing_function_reads_parsed_output(expr: &Expr) -> bool {
    expr.references_field("input", "output_parsed")
}

/// Enforces that `input.output_parsed`/`input.output_raw` appear only in
/// routing functions (conditional-edge guards): a `builtin.transform`'s
/// `set_state` expressions and a `builtin.end`'s `output` expression may
/// not reference them, since those contexts have no single upstream node
/// to resolve `input.*` against.
pub fn check_run_context(def: &CompiledGraphDef) -> Result<(), CodegenError> {
    for node in &def.nodes {
        match &node.kind {
            CompiledKind::Transform { set_state } => {
                for (_, expr) in set_state {
                    reject_input_binding(&node.id, expr, "set_state")?;
                }
            }
            CompiledKind::End { output: Some(expr) } => {
                reject_input_binding(&node.id, expr, "end")?;
            }
            CompiledKind::Mcp { arguments, .. } => {
                for (_, expr) in arguments {
                    reject_input_binding(&node.id, expr, "mcp arguments")?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn reject_input_binding(node: &str, expr: &Expr, context: &'static str) -> Result<(), CodegenError> {
    if routing_function_reads_parsed_output(expr) {
        return Err(CodegenError::RoutingOnlyBinding {
            node: node.to_string(),
            field: "output_parsed",
            context,
        });
    }
    if routing_function_reads_raw_output(expr) {
        return Err(CodegenError::RoutingOnlyBinding {
            node: node.to_string(),
            field: "output_raw",
            context,
        });
    }
    Ok(())
}

/// Render the compiled graph as pretty-printed JSON IR, falling back to
/// compact JSON if pretty-printing fails (it cannot, for a `Serialize`
/// value built entirely from this module's own types, but codegen callers
/// should not have to special-case an `Err` they'll never see in practice).
pub fn render_ir(def: &CompiledGraphDef) -> String {
    let ir = GraphIr::from(def);
    serde_json::to_string_pretty(&ir).unwrap_or_else(|_| {
        serde_json::to_string(&ir).unwrap_or_else(|_| "{}".to_string())
    })
}

/// Emit a standalone Rust program that builds and runs this exact graph:
/// one function per node (transform/end nodes evaluate their real compiled
/// expressions; llmagent/mcp nodes call out to a caller-supplied handle,
/// same seam as the in-process engine), one routing function per edge
/// group (switch-shaped when every arm compares the same field with `==`),
/// and a `main` shaped by `mode`. Fails with [`CodegenError`] if the graph
/// uses `input.output_parsed`/`input.output_raw` outside a routing
/// function.
pub fn render_program(def: &CompiledGraphDef, mode: RunMode) -> Result<String, CodegenError> {
    check_run_context(def)?;
    let env_vars = allocate_env_vars(&def.id, def);
    let mut out = String::new();
    let _ = writeln!(out, "// generated from graph `{}`; do not edit by hand", def.id);
    let _ = writeln!(out, "#![allow(unused)]");
    let _ = writeln!(out, "use serde_json::Value;");
    let _ = writeln!(out);
    let _ = writeln!(out, "fn is_truthy(v: &Value) -> bool {{");
    let _ = writeln!(out, "    match v {{");
    let _ = writeln!(out, "        Value::Null => false,");
    let _ = writeln!(out, "        Value::Bool(b) => *b,");
    let _ = writeln!(out, "        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),");
    let _ = writeln!(out, "        Value::String(s) => !s.is_empty(),");
    let _ = writeln!(out, "        Value::Array(a) => !a.is_empty(),");
    let _ = writeln!(out, "        Value::Object(o) => !o.is_empty(),");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);

    for node in &def.nodes {
        render_node_fn(&mut out, &node.id, &node.kind);
    }
    for edge in &def.edges {
        render_routing_fn(&mut out, edge);
    }

    let _ = writeln!(out, "fn main() {{");
    for (model, var) in &env_vars {
        let _ = writeln!(
            out,
            "    let _{} = std::env::var(\"{}\").expect(\"missing API key for model `{}`\");",
            sanitize_ident(model),
            var,
            model
        );
    }
    let _ = writeln!(out, "    let entry_point = \"{}\";", def.entry_point);
    let _ = writeln!(out, "    let recursion_limit: u32 = {};", def.recursion_limit);
    match mode {
        RunMode::InteractiveCli => {
            let _ = writeln!(out, "    // interactive CLI: read one line per turn, run the graph, print state");
            let _ = writeln!(out, "    agentgraph_runtime::run_interactive_cli(entry_point, recursion_limit);");
        }
        RunMode::AguiHttpServer => {
            let _ = writeln!(out, "    // AG-UI-compatible HTTP server exposing this graph as an agent");
            let _ = writeln!(out, "    agentgraph_runtime::serve_agui(entry_point, recursion_limit);");
        }
        RunMode::A2aServer => {
            let _ = writeln!(out, "    // A2A-compatible server exposing this graph's agent card");
            let _ = writeln!(out, "    agentgraph_runtime::serve_a2a(entry_point, recursion_limit);");
        }
        RunMode::OpenAiCompatibleApi => {
            let _ = writeln!(out, "    // OpenAI chat-completions-compatible HTTP server");
            let _ = writeln!(out, "    agentgraph_runtime::serve_openai_compatible(entry_point, recursion_limit);");
        }
    }
    let _ = writeln!(out, "}}");
    Ok(out)
}

fn render_node_fn(out: &mut String, id: &str, kind: &CompiledKind) {
    let ident = sanitize_ident(id);
    match kind {
        CompiledKind::Start => {
            let _ = writeln!(out, "fn node_{ident}(state: &Value) -> Value {{ state.clone() }}");
        }
        CompiledKind::Transform { set_state } => {
            let _ = writeln!(out, "fn node_{ident}(state: &Value) -> Value {{");
            let _ = writeln!(out, "    let mut next = state.clone();");
            let _ = writeln!(out, "    let obj = next.as_object_mut().expect(\"state is always an object\");");
            for (field, expr) in set_state {
                let _ = writeln!(out, "    obj.insert({field:?}.to_string(), {});", expr.to_rust_expr());
            }
            let _ = writeln!(out, "    next");
            let _ = writeln!(out, "}}");
        }
        CompiledKind::End { output } => {
            let _ = writeln!(out, "fn node_{ident}(state: &Value) -> Value {{");
            match output {
                Some(expr) => {
                    let _ = writeln!(out, "    let mut next = state.clone();");
                    let _ = writeln!(
                        out,
                        "    next.as_object_mut().unwrap().insert(\"end_structured_output\".to_string(), {});",
                        expr.to_rust_expr()
                    );
                    let _ = writeln!(out, "    next");
                }
                None => {
                    let _ = writeln!(out, "    state.clone()");
                }
            }
            let _ = writeln!(out, "}}");
        }
        CompiledKind::Llmagent { model, output_field, .. } => {
            let _ = writeln!(out, "fn node_{ident}(state: &Value) -> Value {{");
            let _ = writeln!(
                out,
                "    // invokes model `{model}` through the caller-supplied handle; same seam as the in-process engine",
            );
            if let Some(field) = output_field {
                let _ = writeln!(
                    out,
                    "    agentgraph_runtime::call_llmagent(\"{ident}\", \"{model}\", state, Some({field:?}))",
                );
            } else {
                let _ = writeln!(
                    out,
                    "    agentgraph_runtime::call_llmagent(\"{ident}\", \"{model}\", state, None)",
                );
            }
            let _ = writeln!(out, "}}");
        }
        CompiledKind::Mcp { tool, arguments, .. } => {
            let _ = writeln!(out, "fn node_{ident}(state: &Value) -> Value {{");
            let _ = writeln!(out, "    let mut args = serde_json::Map::new();");
            for (field, expr) in arguments {
                let _ = writeln!(out, "    args.insert({field:?}.to_string(), {});", expr.to_rust_expr());
            }
            let _ = writeln!(
                out,
                "    agentgraph_runtime::call_mcp(\"{ident}\", \"{tool}\", Value::Object(args), state)",
            );
            let _ = writeln!(out, "}}");
        }
        CompiledKind::UserApproval { approval_field, .. } => {
            let _ = writeln!(out, "fn node_{ident}(state: &Value) -> Value {{");
            let _ = writeln!(out, "    agentgraph_runtime::suspend_for_approval(\"{ident}\", {approval_field:?}, state)");
            let _ = writeln!(out, "}}");
        }
    }
    let _ = writeln!(out);
}

/// Renders the routing function for every edge from one source node. Per
/// the switch-optimization rule: when every arm of a conditional group
/// compares the *same* field path with `==`, emit one `match` on that
/// path's value instead of a chain of `if`s.
fn render_routing_fn(out: &mut String, edge: &super::compiler::CompiledEdge) {
    let ident = sanitize_ident(&edge.from);
    let _ = writeln!(
        out,
        "fn route_{ident}(state: &Value, input_output_parsed: &Value, input_output_raw: &Value) -> Vec<String> {{"
    );
    match &edge.route {
        EdgeRoute::Single(to) => {
            let _ = writeln!(out, "    vec![{to:?}.to_string()]");
        }
        EdgeRoute::Conditional(arms) => {
            if let Some(switched) = render_as_switch(arms) {
                out.push_str(&switched);
            } else {
                render_as_if_chain(out, arms);
            }
        }
    }
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);
}

/// Returns the rendered `match` body when every non-fallback arm compares
/// the same field path with `==` against a literal, `None` otherwise.
fn render_as_switch(arms: &[(Option<Expr>, String)]) -> Option<String> {
    let mut common_path: Option<&[String]> = None;
    for (guard, _) in arms {
        let Some(guard) = guard else { continue };
        let (path, _) = guard.as_single_field_eq()?;
        match common_path {
            Some(existing) if existing != path => return None,
            _ => common_path = Some(path),
        }
    }
    let path = common_path?;
    let path_expr = super::cel::compile(&path.join("."))
        .expect("path segments recombine into a valid field-path expression")
        .to_rust_expr();

    let mut body = String::new();
    let _ = writeln!(body, "    let scrutinee = {path_expr};");
    let _ = writeln!(body, "    match scrutinee {{");
    let mut saw_fallback = false;
    for (guard, to) in arms {
        match guard {
            Some(guard) => {
                let (_, lit) = guard.as_single_field_eq()?;
                let lit_rust = format!(
                    "serde_json::from_str::<Value>({:?}).unwrap()",
                    lit.to_string()
                );
                let _ = writeln!(body, "        v if v == {lit_rust} => vec![{to:?}.to_string()],");
            }
            None => {
                saw_fallback = true;
                let _ = writeln!(body, "        _ => vec![{to:?}.to_string()],");
            }
        }
    }
    if !saw_fallback {
        let _ = writeln!(body, "        _ => vec![],");
    }
    let _ = writeln!(body, "    }}");
    Some(body)
}

fn render_as_if_chain(out: &mut String, arms: &[(Option<Expr>, String)]) {
    let _ = writeln!(out, "    #[allow(clippy::never_loop)]");
    let _ = writeln!(out, "    loop {{");
    for (guard, to) in arms {
        match guard {
            Some(expr) => {
                let _ = writeln!(out, "        if is_truthy(&{}) {{", expr.to_rust_expr());
                let _ = writeln!(out, "            return vec![{to:?}.to_string()];");
                let _ = writeln!(out, "        }}");
            }
            None => {
                let _ = writeln!(out, "        return vec![{to:?}.to_string()];");
            }
        }
    }
    let _ = writeln!(out, "        return vec![];");
    let _ = writeln!(out, "    }}");
}

fn sanitize_ident(raw: &str) -> String {
    let mut ident: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if ident.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

#[derive(Debug, serde::Serialize)]
struct GraphIr {
    id: String,
    entry_point: String,
    finish_points: Vec<String>,
    recursion_limit: u32,
    nodes: Vec<NodeIr>,
    edges: Vec<EdgeIr>,
}

#[derive(Debug, serde::Serialize)]
struct NodeIr {
    id: String,
    kind: String,
}

#[derive(Debug, serde::Serialize)]
struct EdgeIr {
    from: String,
    targets: Vec<String>,
    conditional: bool,
}

impl From<&CompiledGraphDef> for GraphIr {
    fn from(def: &CompiledGraphDef) -> Self {
        GraphIr {
            id: def.id.clone(),
            entry_point: def.entry_point.clone(),
            finish_points: def.finish_points.clone(),
            recursion_limit: def.recursion_limit,
            nodes: def
                .nodes
                .iter()
                .map(|n| NodeIr {
                    id: n.id.clone(),
                    kind: kind_name(&n.kind).to_string(),
                })
                .collect(),
            edges: def
                .edges
                .iter()
                .map(|e| match &e.route {
                    EdgeRoute::Single(to) => EdgeIr {
                        from: e.from.clone(),
                        targets: vec![to.clone()],
                        conditional: false,
                    },
                    EdgeRoute::Conditional(arms) => EdgeIr {
                        from: e.from.clone(),
                        targets: arms.iter().map(|(_, to)| to.clone()).collect(),
                        conditional: true,
                    },
                })
                .collect(),
        }
    }
}

fn kind_name(kind: &CompiledKind) -> &'static str {
    match kind {
        CompiledKind::Start => "start",
        CompiledKind::Llmagent { .. } => "llmagent",
        CompiledKind::Transform { .. } => "transform",
        CompiledKind::Mcp { .. } => "mcp",
        CompiledKind::UserApproval { .. } => "user_approval",
        CompiledKind::End { .. } => "end",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::cel::compile as compile_expr;
    use crate::dsl::compiler::compile;
    use crate::dsl::parser::{parse, ParseMode};

    fn sample_def() -> CompiledGraphDef {
        let g = parse(
            r#"{"id":"g1","entry_point":"node_0","finish_points":["node_1"],"nodes":[
                {"builtin":"llmagent","model":"openai/gpt-4o","output_field":"answer"},
                {"builtin":"end"}
            ],"edges":[{"from":"node_0","to":"node_1"}]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        compile(&g, &["openai/gpt-4o"]).unwrap()
    }

    #[test]
    fn env_var_allocation_is_deterministic_and_sanitized() {
        let def = sample_def();
        let vars = allocate_env_vars("g1", &def);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].1, "OPENAI_API_KEY");
    }

    #[test]
    fn explicit_env_override_is_honored() {
        let g = parse(
            r#"{"id":"g1","entry_point":"node_0","finish_points":["node_1"],"nodes":[
                {"builtin":"llmagent","model":"openai/gpt-4o","env":"CUSTOM_KEY"},
                {"builtin":"end"}
            ],"edges":[{"from":"node_0","to":"node_1"}]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let def = compile(&g, &["openai/gpt-4o"]).unwrap();
        let vars = allocate_env_vars("g1", &def);
        assert_eq!(vars, vec![("openai/gpt-4o".to_string(), "CUSTOM_KEY".to_string())]);
    }

    #[test]
    fn distinct_models_under_one_provider_get_sequence_numbers() {
        let g = parse(
            r#"{"id":"g1","entry_point":"node_0","finish_points":["node_2"],"nodes":[
                {"builtin":"llmagent","model":"openai/gpt-4o"},
                {"builtin":"llmagent","model":"openai/gpt-4o-mini"},
                {"builtin":"end"}
            ],"edges":[{"from":"node_0","to":"node_1"},{"from":"node_1","to":"node_2"}]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let def = compile(&g, &["openai/gpt-4o", "openai/gpt-4o-mini"]).unwrap();
        let vars = allocate_env_vars("g1", &def);
        assert_eq!(vars.len(), 2);
        assert!(vars.iter().any(|(_, v)| v == "OPENAI_API_KEY"));
        assert!(vars.iter().any(|(_, v)| v == "OPENAI_API_KEY_2"));
    }

    #[test]
    fn routing_expression_raw_vs_parsed_detection_is_ast_based() {
        let raw = compile_expr("input.output_raw == \"x\"").unwrap();
        let parsed = compile_expr("input.output_parsed.status == \"ok\"").unwrap();
        let unrelated = compile_expr("state.x == 1").unwrap();
        assert!(routing_function_reads_raw_output(&raw));
        assert!(routing_function_reads_parsed_output(&parsed));
        assert!(!routing_function_reads_raw_output(&unrelated));
        assert!(!routing_function_reads_parsed_output(&unrelated));
    }

    #[test]
    fn run_context_rejects_output_parsed_in_set_state() {
        let g = parse(
            r#"{"id":"g1","entry_point":"node_0","finish_points":["node_1"],"nodes":[
                {"builtin":"transform","set_state":{"x":"input.output_parsed.status"}},
                {"builtin":"end"}
            ],"edges":[{"from":"node_0","to":"node_1"}]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let def = compile(&g, &[]).unwrap();
        assert_eq!(
            check_run_context(&def),
            Err(CodegenError::RoutingOnlyBinding {
                node: "node_0".to_string(),
                field: "output_parsed",
                context: "set_state",
            })
        );
    }

    #[test]
    fn run_context_allows_output_parsed_in_a_routing_guard() {
        let g = parse(
            r#"{"id":"g1","entry_point":"node_0","finish_points":["node_1","node_2"],"nodes":[
                {"builtin":"start"},
                {"builtin":"end"},
                {"builtin":"end"}
            ],"edges":[
                {"from":"node_0","conditions":[
                    {"when":"input.output_parsed.status == \"ok\"","to":"node_1"},
                    {"to":"node_2"}
                ]}
            ]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let def = compile(&g, &[]).unwrap();
        assert!(check_run_context(&def).is_ok());
    }

    #[test]
    fn ir_round_trips_through_json() {
        let def = sample_def();
        let rendered = render_ir(&def);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["id"], "g1");
        assert_eq!(value["nodes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn program_includes_env_var_load_for_every_model() {
        let def = sample_def();
        let program = render_program(&def, RunMode::InteractiveCli).unwrap();
        assert!(program.contains("OPENAI_API_KEY"));
        assert!(program.contains("run_interactive_cli"));
    }

    #[test]
    fn program_rejects_out_of_context_output_parsed_usage() {
        let g = parse(
            r#"{"id":"g1","entry_point":"node_0","finish_points":["node_1"],"nodes":[
                {"builtin":"end","output":"input.output_raw"},
                {"builtin":"end"}
            ],"edges":[{"from":"node_0","to":"node_1"}]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let def = compile(&g, &[]).unwrap();
        assert!(render_program(&def, RunMode::InteractiveCli).is_err());
    }

    #[test]
    fn switch_optimized_conditional_emits_a_match() {
        let g = parse(
            r#"{"id":"g1","entry_point":"node_0","finish_points":["node_1","node_2","node_3"],"nodes":[
                {"builtin":"start"},
                {"builtin":"end"},
                {"builtin":"end"},
                {"builtin":"end"}
            ],"edges":[
                {"from":"node_0","conditions":[
                    {"when":"state.status == \"a\"","to":"node_1"},
                    {"when":"state.status == \"b\"","to":"node_2"},
                    {"to":"node_3"}
                ]}
            ]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let def = compile(&g, &[]).unwrap();
        let program = render_program(&def, RunMode::InteractiveCli).unwrap();
        assert!(program.contains("match scrutinee"));
    }

    #[test]
    fn mixed_field_conditional_falls_back_to_if_chain() {
        let g = parse(
            r#"{"id":"g1","entry_point":"node_0","finish_points":["node_1","node_2"],"nodes":[
                {"builtin":"start"},
                {"builtin":"end"},
                {"builtin":"end"}
            ],"edges":[
                {"from":"node_0","conditions":[
                    {"when":"state.status == \"a\" && state.flag == true","to":"node_1"},
                    {"to":"node_2"}
                ]}
            ]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let def = compile(&g, &[]).unwrap();
        let program = render_program(&def, RunMode::InteractiveCli).unwrap();
        assert!(program.contains("is_truthy"));
        assert!(!program.contains("match scrutinee"));
    }

    #[test]
    fn all_four_run_modes_render_distinct_entrypoints() {
        let def = sample_def();
        let cli = render_program(&def, RunMode::InteractiveCli).unwrap();
        let agui = render_program(&def, RunMode::AguiHttpServer).unwrap();
        let a2a = render_program(&def, RunMode::A2aServer).unwrap();
        let openai = render_program(&def, RunMode::OpenAiCompatibleApi).unwrap();
        assert!(cli.contains("run_interactive_cli"));
        assert!(agui.contains("serve_agui"));
        assert!(a2a.contains("serve_a2a"));
        assert!(openai.contains("serve_openai_compatible"));
    }
}
