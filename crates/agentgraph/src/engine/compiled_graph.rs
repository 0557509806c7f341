//! The Pregel-style execution engine: barrier-separated supersteps over an
//! active node frontier, per-field reducer-merged state, suspend/resume via
//! [`super::interrupt_resume`].
//!
//! Grounded on the teacher's `workflow/state_graph.rs` (`CompiledGraphImpl`):
//! the same snapshot-isolation-per-superstep and `JoinSet`-based concurrent
//! execution, generalized from a Rust-builder graph to one driven by
//! [`CompiledGraphDef`] and with conditional routing evaluated through the
//! CEL-subset compiler instead of the teacher's update-key-matching
//! shortcut.

use crate::dsl::compiler::{self, CompiledGraphDef, CompiledKind};
use crate::engine::interrupt_resume;
use agentgraph_kernel::workflow::{
    Command, CompiledGraph as CompiledGraphTrait, ControlFlow, GraphState, GraphStream,
    RuntimeContext, StateSchema, StateUpdate, StepResult, StreamEvent,
};
use agentgraph_kernel::{GraphError, GraphResult, InterruptOutcome, McpClient, ModelProvider};
use futures::{stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;

/// A compiled graph ready to execute. Constructed from the DSL compiler's
/// output plus whatever model provider and MCP client the host application
/// wires in (this crate never bundles a concrete LLM SDK or MCP transport,
/// per scope).
pub struct PregelGraph {
    id: String,
    nodes: HashMap<String, CompiledKind>,
    edges: Vec<compiler::CompiledEdge>,
    entry_point: String,
    finish_points: HashSet<String>,
    schema: StateSchema,
    recursion_limit: u32,
    model_provider: Option<Arc<dyn ModelProvider>>,
    mcp_client: Option<Arc<dyn McpClient>>,
}

impl PregelGraph {
    pub fn new(
        def: CompiledGraphDef,
        model_provider: Option<Arc<dyn ModelProvider>>,
        mcp_client: Option<Arc<dyn McpClient>>,
    ) -> Self {
        let nodes = def
            .nodes
            .into_iter()
            .map(|n| (n.id, n.kind))
            .collect::<HashMap<_, _>>();
        Self {
            id: def.id,
            nodes,
            edges: def.edges,
            entry_point: def.entry_point,
            finish_points: def.finish_points.into_iter().collect(),
            schema: def.schema,
            recursion_limit: def.recursion_limit,
            model_provider,
            mcp_client,
        }
    }

    fn kind(&self, id: &str) -> GraphResult<&CompiledKind> {
        self.nodes.get(id).ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    /// Run one superstep over `frontier`, returning the commands produced
    /// (in frontier-iteration order) and the node ids that actually ran.
    async fn execute_frontier(
        &self,
        frontier: &HashSet<String>,
        snapshot: &GraphState,
        ctx: &RuntimeContext,
    ) -> GraphResult<Vec<(String, Command)>> {
        let mut set = JoinSet::new();
        for node_id in frontier {
            let node_id = node_id.clone();
            let kind = self.kind(&node_id)?.clone();
            let state = snapshot.clone();
            let ctx = ctx.clone();
            let provider = self.model_provider.clone();
            let mcp = self.mcp_client.clone();
            set.spawn(async move {
                let cmd = execute_node(&node_id, &kind, &state, &ctx, provider, mcp).await;
                (node_id, cmd)
            });
        }
        let mut results = Vec::with_capacity(frontier.len());
        while let Some(joined) = set.join_next().await {
            let (node_id, cmd) = joined.map_err(|e| GraphError::other(e.to_string()))?;
            results.push((node_id, cmd?));
        }
        Ok(results)
    }

    fn apply_updates(&self, state: &mut GraphState, updates: &[StateUpdate]) -> GraphResult<()> {
        for update in updates {
            let reducer = self.schema.reducer_for(&update.key);
            let merged = reducer.reduce(state.get(&update.key), &update.value)?;
            state.set(update.key.clone(), merged);
        }
        Ok(())
    }

    /// Determine the next frontier from this superstep's results. A target
    /// reached by more than one predecessor in the same superstep is
    /// deduplicated into `next` automatically by `HashSet` insertion — this
    /// is the join barrier: the node still runs exactly once next
    /// superstep, after every predecessor that routes to it has been
    /// applied to state.
    fn next_frontier(
        &self,
        results: &[(String, Command)],
        state: &GraphState,
    ) -> GraphResult<HashSet<String>> {
        let mut next = HashSet::new();
        for (node_id, cmd) in results {
            match &cmd.control {
                ControlFlow::Return => {}
                ControlFlow::Goto(target) => {
                    next.insert(target.clone());
                }
                ControlFlow::Continue => {
                    let root = routing_root(state, node_id);
                    for target in compiler::route_targets(&self.edges, node_id, &root) {
                        next.insert(target);
                    }
                }
                ControlFlow::Send(sends) => {
                    for send in sends {
                        next.insert(send.target.clone());
                    }
                }
            }
        }
        Ok(next)
    }

    /// A node of kind `user_approval` that is not currently resuming halts
    /// the whole superstep: the engine records which node suspended and
    /// returns the state as-is, to be re-entered later once the caller
    /// supplies `approval_result` and replays `invoke`/`step`.
    fn pending_suspend(&self, frontier: &HashSet<String>, state: &GraphState) -> Option<String> {
        frontier.iter().find(|id| {
            matches!(self.nodes.get(id.as_str()), Some(CompiledKind::UserApproval { .. }))
                && !interrupt_resume::interrupt_for_node(state, id).is_resuming()
        }).cloned()
    }
}

fn expr_root(state: &GraphState) -> HashMap<String, serde_json::Value> {
    let mut root = HashMap::new();
    root.insert("state".to_string(), state.to_value());
    root
}

/// The expression root used to evaluate a node's *own* `set_state`/`end`
/// expressions (`state.*` only) is not the same root used to evaluate the
/// conditional edges leading *out* of it: routing guards additionally see
/// `input.*`, a view of that specific upstream node's own structured
/// output, per field path (`input.output_parsed`, `input.output_raw`).
fn routing_root(state: &GraphState, from_node: &str) -> HashMap<String, serde_json::Value> {
    let mut root = expr_root(state);
    let output_parsed = state
        .get("node_structured")
        .and_then(|v| v.get(from_node))
        .and_then(|v| v.get("output_parsed").or_else(|| v.get("results")))
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    let output_raw = state
        .get("node_responses")
        .and_then(|v| v.get(from_node))
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    root.insert(
        "input".to_string(),
        serde_json::json!({ "output_parsed": output_parsed, "output_raw": output_raw }),
    );
    root
}

/// Scans `text` for the first balanced `{...}`/`[...]` span and parses it.
/// Returns `None` — rather than an error — when no balanced span parses as
/// JSON, since an llmagent node's raw response is plain prose more often
/// than not.
fn extract_first_json(text: &str) -> Option<serde_json::Value> {
    let bytes: Vec<char> = text.chars().collect();
    for (i, &c) in bytes.iter().enumerate() {
        let (open, close) = match c {
            '{' => ('{', '}'),
            '[' => ('[', ']'),
            _ => continue,
        };
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escaped = false;
        for j in i..bytes.len() {
            let cur = bytes[j];
            if in_string {
                if escaped {
                    escaped = false;
                } else if cur == '\\' {
                    escaped = true;
                } else if cur == '"' {
                    in_string = false;
                }
                continue;
            }
            match cur {
                '"' => in_string = true,
                c if c == open => depth += 1,
                c if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate: String = bytes[i..=j].iter().collect();
                        if let Ok(value) = serde_json::from_str(&candidate) {
                            return Some(value);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

async fn execute_node(
    node_id: &str,
    kind: &CompiledKind,
    state: &GraphState,
    _ctx: &RuntimeContext,
    model_provider: Option<Arc<dyn ModelProvider>>,
    mcp_client: Option<Arc<dyn McpClient>>,
) -> GraphResult<Command> {
    match kind {
        CompiledKind::Start => Ok(Command::new().continue_()),
        CompiledKind::Llmagent {
            model,
            system_prompt,
            prompt_template,
            output_field,
            output_schema,
            ..
        } => {
            let provider = model_provider
                .ok_or_else(|| GraphError::Model("no ModelProvider configured".to_string()))?;
            let handle = provider.get(model).await?;
            let instruction = render_template(prompt_template.as_deref().unwrap_or(""), state);
            let mut messages = Vec::new();
            if let Some(sys) = system_prompt {
                messages.push(serde_json::json!({"role": "system", "content": sys}));
            }
            let request = agentgraph_kernel::model::GenerateRequest {
                instruction,
                messages,
                tools: Vec::new(),
                temperature: None,
                max_tokens: None,
                response_schema: output_schema.clone(),
            };
            let mut chunks = handle.generate_content(request).await?;
            let mut raw = String::new();
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                if let Some(delta) = chunk.delta_content {
                    raw.push_str(&delta);
                }
            }
            let parsed = extract_first_json(&raw);

            let mut cmd = Command::new()
                .update("last_response", serde_json::Value::String(raw.clone()))
                .update(
                    "node_responses",
                    serde_json::json!({ node_id: raw.clone() }),
                )
                .update(
                    "messages",
                    serde_json::json!([{"role": "assistant", "content": raw}]),
                );
            if let Some(parsed) = &parsed {
                cmd = cmd.update(
                    "node_structured",
                    serde_json::json!({ node_id: { "output_parsed": parsed } }),
                );
            }
            if let Some(field) = output_field {
                let value = parsed.unwrap_or_else(|| serde_json::Value::String(raw.clone()));
                cmd = cmd.update(field.clone(), value);
            }
            Ok(cmd.continue_())
        }
        CompiledKind::Transform { set_state } => {
            let root = expr_root(state);
            let mut cmd = Command::new();
            for (field, expr) in set_state {
                cmd = cmd.update(field.clone(), expr.eval(&root));
            }
            Ok(cmd.continue_())
        }
        CompiledKind::Mcp {
            server,
            tool,
            arguments,
        } => {
            let client = mcp_client
                .ok_or_else(|| GraphError::Mcp("no McpClient configured".to_string()))?;
            let root = expr_root(state);
            let mut args = serde_json::Map::new();
            for (field, expr) in arguments {
                args.insert(field.clone(), expr.eval(&root));
            }
            let mut resolved_server = server.clone();
            for value in resolved_server.headers.values_mut() {
                if let Some(var) = value.strip_prefix("env:") {
                    *value = std::env::var(var)
                        .map_err(|_| GraphError::Mcp(format!("missing env var `{var}` for mcp header")))?;
                }
            }
            let result = client
                .call_tool(&resolved_server, tool, serde_json::Value::Object(args))
                .await?;
            let cmd = Command::new().update(
                "node_structured",
                serde_json::json!({ node_id: { "results": result } }),
            );
            Ok(cmd.continue_())
        }
        CompiledKind::UserApproval { approval_field, .. } => {
            let interrupt = interrupt_resume::interrupt_for_node(state, node_id);
            match interrupt.suspend(node_id, serde_json::Value::Null) {
                InterruptOutcome::Resumed(value) => {
                    let mut cmd = Command::new().update(approval_field.clone(), value);
                    cmd = cmd.updates(interrupt_resume::clear_resume_slot());
                    Ok(cmd.continue_())
                }
                InterruptOutcome::Suspend(_) => Err(GraphError::Interrupted),
            }
        }
        CompiledKind::End { output } => {
            let mut cmd = Command::new();
            if let Some(expr) = output {
                let root = expr_root(state);
                cmd = cmd.update("end_structured_output", expr.eval(&root));
            }
            Ok(cmd.return_())
        }
    }
}

/// `{{state.field}}` substitution. Deliberately not a full templating
/// engine: the DSL's prompt templates only ever interpolate state paths.
fn render_template(template: &str, state: &GraphState) -> String {
    let root = expr_root(state);
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find("}}") {
            let path = after[..end].trim();
            if let Ok(expr) = crate::dsl::cel::compile(path) {
                out.push_str(&value_to_display(&expr.eval(&root)));
            }
            rest = &after[end + 2..];
        } else {
            out.push_str("{{");
            rest = after;
            break;
        }
    }
    out.push_str(rest);
    out
}

fn value_to_display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait::async_trait]
impl CompiledGraphTrait for PregelGraph {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, input: GraphState, config: Option<RuntimeContext>) -> GraphResult<GraphState> {
        let ctx = config.unwrap_or_else(|| RuntimeContext::new(self.id.clone()));
        let mut state = input;
        let mut frontier: HashSet<String> = [self.entry_point.clone()].into_iter().collect();
        let mut steps = 0u32;

        while !frontier.is_empty() {
            if let Some(suspended) = self.pending_suspend(&frontier, &state) {
                state.set("current_node_id", serde_json::Value::String(suspended));
                return Ok(state);
            }
            steps += 1;
            if steps > self.recursion_limit {
                return Err(GraphError::RecursionLimitExceeded(self.recursion_limit));
            }
            let snapshot = state.clone();
            let results = self.execute_frontier(&frontier, &snapshot, &ctx).await?;
            for (_, cmd) in &results {
                self.apply_updates(&mut state, &cmd.updates)?;
            }
            frontier = self.next_frontier(&results, &state)?;
        }
        Ok(state)
    }

    fn stream(&self, input: GraphState, config: Option<RuntimeContext>) -> GraphStream<'_> {
        // Supersteps are run eagerly and replayed as events; true incremental
        // streaming would require a self-referential generator, which the
        // Rust stdlib cannot express without another crate for async
        // generators. Event *ordering* and *content* match the incremental
        // contract even though delivery is buffered.
        let this = self;
        Box::pin(stream::once(async move {
            let mut events = Vec::new();
            let ctx = config.unwrap_or_else(|| RuntimeContext::new(this.id.clone()));
            let mut state = input;
            let mut frontier: HashSet<String> = [this.entry_point.clone()].into_iter().collect();
            let mut steps = 0u32;
            let mut error = None;

            'outer: while !frontier.is_empty() {
                if let Some(suspended) = this.pending_suspend(&frontier, &state) {
                    state.set("current_node_id", serde_json::Value::String(suspended.clone()));
                    events.push(Ok(StreamEvent::Interrupted {
                        node_id: suspended,
                        payload: serde_json::Value::Null,
                    }));
                    break;
                }
                steps += 1;
                if steps > this.recursion_limit {
                    error = Some(GraphError::RecursionLimitExceeded(this.recursion_limit));
                    break;
                }
                let snapshot = state.clone();
                for node_id in &frontier {
                    events.push(Ok(StreamEvent::NodeStart {
                        node_id: node_id.clone(),
                        state: snapshot.clone(),
                    }));
                }
                let results = match this.execute_frontier(&frontier, &snapshot, &ctx).await {
                    Ok(r) => r,
                    Err(e) => {
                        error = Some(e);
                        break 'outer;
                    }
                };
                for (node_id, cmd) in &results {
                    if let Err(e) = this.apply_updates(&mut state, &cmd.updates) {
                        error = Some(e);
                        break 'outer;
                    }
                    events.push(Ok(StreamEvent::NodeEnd {
                        node_id: node_id.clone(),
                        state: state.clone(),
                        command: cmd.clone(),
                    }));
                }
                frontier = match this.next_frontier(&results, &state) {
                    Ok(f) => f,
                    Err(e) => {
                        error = Some(e);
                        break;
                    }
                };
            }
            if let Some(e) = error {
                events.push(Ok(StreamEvent::Error {
                    node_id: None,
                    error: e.to_string(),
                }));
            } else {
                events.push(Ok(StreamEvent::End { final_state: state }));
            }
            stream::iter(events)
        }).flatten())
    }

    async fn step(&self, input: GraphState, config: Option<RuntimeContext>) -> GraphResult<StepResult> {
        let ctx = config.unwrap_or_else(|| RuntimeContext::new(self.id.clone()));
        let mut state = input;
        let frontier: HashSet<String> = if let Some(id) = state.get("current_node_id").and_then(|v| v.as_str()) {
            [id.to_string()].into_iter().collect()
        } else {
            [self.entry_point.clone()].into_iter().collect()
        };

        if let Some(suspended) = self.pending_suspend(&frontier, &state) {
            state.set("current_node_id", serde_json::Value::String(suspended.clone()));
            return Ok(StepResult {
                state,
                node_id: suspended,
                command: Command::new(),
                is_complete: false,
                next_node: None,
            });
        }

        let snapshot = state.clone();
        let results = self.execute_frontier(&frontier, &snapshot, &ctx).await?;
        for (_, cmd) in &results {
            self.apply_updates(&mut state, &cmd.updates)?;
        }
        let next = self.next_frontier(&results, &state)?;
        let (node_id, command) = results.into_iter().next().unwrap_or_else(|| {
            (self.entry_point.clone(), Command::new())
        });
        let is_complete = next.is_empty();
        let next_node = next.into_iter().next();
        Ok(StepResult {
            state,
            node_id,
            command,
            is_complete,
            next_node,
        })
    }

    fn validate_state(&self, state: &GraphState) -> GraphResult<()> {
        state.validate(&self.schema)
    }

    fn state_schema(&self) -> &StateSchema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{compile, parse, ParseMode};
    use serde_json::json;

    fn build(json_src: &str) -> PregelGraph {
        let g = parse(json_src, ParseMode::Lenient).unwrap();
        let def = compile(&g, &[]).unwrap();
        PregelGraph::new(def, None, None)
    }

    #[tokio::test]
    async fn transform_only_graph_runs_to_completion() {
        let graph = build(
            r#"{"id":"g","entry_point":"node_0","finish_points":["node_1"],
               "state_variables":[{"name":"doubled","type":"number"}],
               "nodes":[
                {"builtin":"transform","set_state":{"doubled":"state.x"}},
                {"builtin":"end"}
               ],
               "edges":[{"from":"node_0","to":"node_1"}]}"#,
        );
        let mut input = GraphState::new();
        input.set("x", json!(21));
        let result = graph.invoke(input, None).await.unwrap();
        assert_eq!(result.get("doubled"), Some(&json!(21)));
    }

    #[tokio::test]
    async fn conditional_routing_picks_branch_from_state() {
        let graph = build(
            r#"{"id":"g","entry_point":"node_0","finish_points":["node_1","node_2"],"nodes":[
                {"builtin":"start"},
                {"builtin":"transform","set_state":{"branch":"\"a\""}},
                {"builtin":"transform","set_state":{"branch":"\"b\""}}
               ],
               "edges":[
                {"from":"node_0","conditions":[
                    {"when":"state.go == \"a\"","to":"node_1"},
                    {"to":"node_2"}
                ]}
               ]}"#,
        );
        let mut input = GraphState::new();
        input.set("go", json!("a"));
        let result = graph.invoke(input, None).await.unwrap();
        assert_eq!(result.get("branch"), Some(&json!("a")));
    }

    #[tokio::test]
    async fn multi_edge_fan_out_converges_and_runs_join_target_once() {
        let graph = build(
            r#"{"id":"g","entry_point":"node_0","finish_points":["node_3"],"nodes":[
                {"builtin":"start"},
                {"builtin":"transform","set_state":{"a":"true"}},
                {"builtin":"transform","set_state":{"b":"true"}},
                {"builtin":"transform","set_state":{"joined":"true"}}
               ],
               "edges":[
                {"from":"node_0","to":"node_1"},
                {"from":"node_0","to":"node_2"},
                {"from":"node_1","to":"node_3"},
                {"from":"node_2","to":"node_3"}
               ]}"#,
        );
        let result = graph.invoke(GraphState::new(), None).await.unwrap();
        assert_eq!(result.get("a"), Some(&json!(true)));
        assert_eq!(result.get("b"), Some(&json!(true)));
        assert_eq!(result.get("joined"), Some(&json!(true)));
    }

    struct EchoMcpClient;

    #[async_trait::async_trait]
    impl agentgraph_kernel::McpClient for EchoMcpClient {
        async fn call_tool(
            &self,
            _server: &agentgraph_kernel::McpServerConfig,
            tool: &str,
            arguments: serde_json::Value,
        ) -> GraphResult<serde_json::Value> {
            Ok(json!({"tool": tool, "echo": arguments}))
        }
    }

    #[tokio::test]
    async fn mcp_node_writes_results_under_node_structured() {
        let g = parse(
            r#"{"id":"g","entry_point":"node_0","finish_points":["node_1"],"nodes":[
                {"builtin":"mcp","server":{"url":"https://tools.example.com","transport":"sse"},"tool":"search","arguments":{"q":"\"weather\""}},
                {"builtin":"end"}
               ],
               "edges":[{"from":"node_0","to":"node_1"}]}"#,
            ParseMode::Lenient,
        )
        .unwrap();
        let def = compile(&g, &[]).unwrap();
        let graph = PregelGraph::new(def, None, Some(Arc::new(EchoMcpClient)));
        let result = graph.invoke(GraphState::new(), None).await.unwrap();
        assert_eq!(
            result.get("node_structured").and_then(|v| v.get("node_0")).and_then(|v| v.get("results")).and_then(|v| v.get("tool")),
            Some(&json!("search"))
        );
    }

    #[tokio::test]
    async fn user_approval_suspends_then_resumes() {
        let graph = build(
            r#"{"id":"g","entry_point":"node_0","finish_points":["node_1"],"nodes":[
                {"builtin":"user_approval","approval_field":"decision"},
                {"builtin":"end"}
               ],
               "edges":[{"from":"node_0","to":"node_1"}]}"#,
        );
        let suspended = graph.invoke(GraphState::new(), None).await.unwrap();
        assert_eq!(
            suspended.get("current_node_id"),
            Some(&json!("node_0"))
        );

        let mut resumed_input = suspended;
        resumed_input.set("approval_result", json!("approved"));
        let result = graph.invoke(resumed_input, None).await.unwrap();
        assert_eq!(result.get("decision"), Some(&json!("approved")));
    }
}
