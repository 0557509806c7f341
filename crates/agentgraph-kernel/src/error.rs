//! Crate-wide error type.
//!
//! Every trait defined in this crate returns [`GraphResult`]. Concrete
//! implementations (in `agentgraph`) define their own richer error types
//! where they need one and convert into `GraphError` at the point where
//! they implement a kernel trait.

use thiserror::Error;

/// Result alias used throughout the kernel traits.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors surfaced by the trait-level seams this crate defines: state
/// application, storage, model/embedder calls, and graph control flow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("graph validation failed: {0}")]
    ValidationFailed(String),

    #[error("state error: {0}")]
    State(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("embedder error: {0}")]
    Embedder(String),

    #[error("mcp error: {0}")]
    Mcp(String),

    #[error("routing error: {0}")]
    Routing(String),

    #[error("recursion limit exceeded after {0} steps")]
    RecursionLimitExceeded(u32),

    #[error("execution was interrupted")]
    Interrupted,

    #[error("execution was cancelled")]
    Cancelled,

    #[error("circuit open for node: {0}")]
    CircuitOpen(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl GraphError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
