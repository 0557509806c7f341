//! State graph traits: the builder/compiled-graph seam the engine crate
//! implements concretely.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

use crate::error::GraphResult;

use super::{Command, GraphConfig, GraphState, RuntimeContext, StateSchema};

/// Boxed stream returned by graph execution.
pub type GraphStream<'a> = Pin<Box<dyn Stream<Item = GraphResult<StreamEvent>> + Send + 'a>>;

/// Special node ID for the graph entry point.
pub const START: &str = "__START__";

/// Special node ID for the graph exit point.
pub const END: &str = "__END__";

/// A single node's behavior: given the current state and the execution's
/// runtime context, produce a [`Command`].
#[async_trait]
pub trait NodeFunc: Send + Sync {
    async fn call(
        &self,
        state: &mut GraphState,
        ctx: &RuntimeContext,
    ) -> GraphResult<Command>;

    /// Returns the node name/identifier.
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }
}

/// Edge target definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EdgeTarget {
    /// Single target node.
    Single(String),
    /// Conditional edges: route name -> node id.
    Conditional(HashMap<String, String>),
    /// Multiple parallel targets.
    Parallel(Vec<String>),
}

impl EdgeTarget {
    pub fn single(target: impl Into<String>) -> Self {
        Self::Single(target.into())
    }

    pub fn conditional(routes: HashMap<String, String>) -> Self {
        Self::Conditional(routes)
    }

    pub fn parallel(targets: Vec<String>) -> Self {
        Self::Parallel(targets)
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Self::Conditional(_))
    }

    pub fn targets(&self) -> Vec<&str> {
        match self {
            Self::Single(t) => vec![t],
            Self::Conditional(routes) => routes.values().map(|s| s.as_str()).collect(),
            Self::Parallel(targets) => targets.iter().map(|s| s.as_str()).collect(),
        }
    }
}

/// Graph builder: the interface a compiled DSL graph is assembled through
/// before being turned into an executable [`CompiledGraph`].
#[async_trait]
pub trait StateGraph: Send + Sync {
    type Compiled: CompiledGraph;

    fn new(id: impl Into<String>) -> Self
    where
        Self: Sized;

    fn add_node(&mut self, id: impl Into<String>, node: Box<dyn NodeFunc>) -> &mut Self;

    fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self;

    fn add_conditional_edges(
        &mut self,
        from: impl Into<String>,
        conditions: HashMap<String, String>,
    ) -> &mut Self;

    fn add_parallel_edges(&mut self, from: impl Into<String>, targets: Vec<String>) -> &mut Self;

    fn set_entry_point(&mut self, node: impl Into<String>) -> &mut Self;

    fn set_finish_point(&mut self, node: impl Into<String>) -> &mut Self;

    /// Declare a field's reducer. The default reducer for any field with
    /// none declared is [`super::ReducerType::Overwrite`].
    fn set_schema(&mut self, schema: StateSchema) -> &mut Self;

    fn with_config(&mut self, config: GraphConfig) -> &mut Self;

    fn id(&self) -> &str;

    /// Compile the graph: validate structure and prepare it for execution.
    fn compile(self) -> GraphResult<Self::Compiled>;
}

/// A compiled, executable graph.
#[async_trait]
pub trait CompiledGraph: Send + Sync {
    fn id(&self) -> &str;

    /// Run the graph to completion (or suspension) and return the final
    /// state.
    async fn invoke(
        &self,
        input: GraphState,
        config: Option<RuntimeContext>,
    ) -> GraphResult<GraphState>;

    /// Run the graph, yielding a [`StreamEvent`] per superstep boundary.
    fn stream(&self, input: GraphState, config: Option<RuntimeContext>) -> GraphStream<'_>;

    /// Execute a single superstep. Useful for debugging or interactive
    /// stepping.
    async fn step(
        &self,
        input: GraphState,
        config: Option<RuntimeContext>,
    ) -> GraphResult<StepResult>;

    fn validate_state(&self, state: &GraphState) -> GraphResult<()>;

    fn state_schema(&self) -> &StateSchema;
}

/// Stream event from graph execution.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum StreamEvent {
    /// A node started executing.
    NodeStart { node_id: String, state: GraphState },
    /// A node finished executing.
    NodeEnd {
        node_id: String,
        state: GraphState,
        command: Command,
    },
    /// Graph execution completed.
    End { final_state: GraphState },
    /// Execution suspended at an interrupt.
    Interrupted { node_id: String, payload: serde_json::Value },
    /// Error occurred.
    Error {
        node_id: Option<String>,
        error: String,
    },
    /// A node is being retried after a transient failure.
    NodeRetry {
        node_id: String,
        attempt: u32,
        error: String,
    },
    /// A node failed permanently and execution is falling back.
    NodeFallback {
        from_node: String,
        to_node: String,
        reason: String,
    },
    /// A node's circuit breaker has opened due to repeated failures.
    CircuitOpen { node_id: String },
}

/// Result of a single superstep execution.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub state: GraphState,
    pub node_id: String,
    pub command: Command,
    pub is_complete: bool,
    pub next_node: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_target_single_is_not_conditional() {
        let target = EdgeTarget::single("node_a");
        assert!(!target.is_conditional());
        assert_eq!(target.targets(), vec!["node_a"]);
    }

    #[test]
    fn edge_target_conditional_lists_all_routes() {
        let mut routes = HashMap::new();
        routes.insert("condition_a".to_string(), "node_a".to_string());
        routes.insert("condition_b".to_string(), "node_b".to_string());

        let target = EdgeTarget::conditional(routes);
        assert!(target.is_conditional());

        let targets = target.targets();
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&"node_a"));
        assert!(targets.contains(&"node_b"));
    }

    #[test]
    fn edge_target_parallel_lists_targets_in_order() {
        let target = EdgeTarget::parallel(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert!(!target.is_conditional());
        assert_eq!(target.targets(), vec!["a", "b", "c"]);
    }

    #[test]
    fn start_and_end_are_reserved_node_ids() {
        assert_eq!(START, "__START__");
        assert_eq!(END, "__END__");
    }
}
