//! Graph/workflow abstractions: the Pregel-style compiled-graph execution
//! model.
//!
//! - **Reducer pattern**: configurable per-field state update strategies
//!   (overwrite, append, merge, message, string_slice)
//! - **Command pattern**: unified state updates and control flow returned
//!   from a node
//! - **Send pattern**: dynamic fan-out for MapReduce-style branching
//! - **RemainingSteps**: recursion limit tracking
//! - **NodePolicy**: per-node retry/circuit-breaker fault tolerance
//!
//! This module defines traits and data types only (kernel layer). Concrete
//! graph construction, compilation, and execution are provided in the
//! `agentgraph` crate.

pub mod command;
pub mod context;
pub mod graph;
pub mod policy;
pub mod reducer;
pub mod state;

pub use command::{Command, ControlFlow, SendCommand};
pub use context::{GraphConfig, RemainingSteps, RuntimeContext};
pub use graph::{
    CompiledGraph, EdgeTarget, GraphStream, NodeFunc, StateGraph, StepResult, StreamEvent, END,
    START,
};
pub use policy::{CircuitBreakerState, CircuitState, NodePolicy, RetryCondition};
pub use reducer::ReducerType;
pub use state::{is_reserved_key, GraphState, StateField, StateSchema, StateUpdate, RESERVED_KEYS};
