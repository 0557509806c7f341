//! Trait and data-type definitions shared by the graph compiler, engine,
//! summarization, and memory layers.
//!
//! This crate is dependency-light by design: it defines the seams
//! (`Model`, `Embedder`, `Storage`, `NodeFunc`, `CompiledGraph`) that
//! concrete implementations in the `agentgraph` crate fulfill.

#[cfg(feature = "config")]
pub mod config;
pub mod error;
pub mod interrupt;
pub mod mcp;
pub mod model;
pub mod storage;
pub mod workflow;

pub use error::{GraphError, GraphResult};
pub use interrupt::{Interrupt, InterruptOutcome, InterruptPayload};
pub use mcp::{McpClient, McpServerConfig, McpTransport};
pub use model::{
    Embedder, EmbedderProvider, GenerateRequest, Model, ModelInfo, ModelProvider,
    ModelResponseChunk, Summarizer, SummarizerInput, SummarizerOutput,
};
pub use storage::Storage;
