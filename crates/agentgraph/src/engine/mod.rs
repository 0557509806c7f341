//! The in-process execution engine: turns a [`crate::dsl::compiler::CompiledGraphDef`]
//! into a runnable [`agentgraph_kernel::workflow::CompiledGraph`].

pub mod compiled_graph;
pub mod interrupt_resume;

pub use compiled_graph::PregelGraph;
