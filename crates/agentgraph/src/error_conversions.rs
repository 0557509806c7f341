//! Cross-module error conversions.
//!
//! `agentgraph_kernel::GraphError` is the crate-wide error every kernel
//! trait returns. This crate's own domain errors (parse/compile,
//! persistence, summarization, memory) convert into it at the point where
//! they cross a trait boundary, the same way the teacher's
//! `error_conversions.rs` maps domain errors onto its single `GlobalError`.

use agentgraph_kernel::GraphError;

use crate::dsl::compiler::CompileError;
use crate::dsl::parser::ParseError;
use crate::memory::MemoryError;
use crate::persistence::PersistenceError;
use crate::summarization::delta::SummarizationError;

impl From<ParseError> for GraphError {
    fn from(err: ParseError) -> Self {
        GraphError::ValidationFailed(err.to_string())
    }
}

impl From<CompileError> for GraphError {
    fn from(err: CompileError) -> Self {
        GraphError::ValidationFailed(err.to_string())
    }
}

impl From<PersistenceError> for GraphError {
    fn from(err: PersistenceError) -> Self {
        GraphError::Storage(err.to_string())
    }
}

impl From<MemoryError> for GraphError {
    fn from(err: MemoryError) -> Self {
        GraphError::Storage(err.to_string())
    }
}

impl From<SummarizationError> for GraphError {
    fn from(err: SummarizationError) -> Self {
        GraphError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_error_maps_to_storage() {
        let err: GraphError = PersistenceError::NotFound("session-1".to_string()).into();
        assert!(matches!(err, GraphError::Storage(_)));
        assert!(err.to_string().contains("session-1"));
    }

    #[test]
    fn memory_error_maps_to_storage() {
        let err: GraphError = MemoryError::NotFound("mem-1".to_string()).into();
        assert!(matches!(err, GraphError::Storage(_)));
    }

    #[test]
    fn parse_error_maps_to_validation_failed() {
        let err: GraphError = ParseError::MissingNodeId(2).into();
        assert!(matches!(err, GraphError::ValidationFailed(_)));
    }

    #[test]
    fn compile_error_maps_to_validation_failed() {
        let err: GraphError = CompileError::WhileMissingExit("loop_1".to_string()).into();
        assert!(matches!(err, GraphError::ValidationFailed(_)));
    }
}
