//! Vector memory service: free-form per-user memories with topic tags and
//! embedding-based similarity search.
//!
//! `store` holds the `MemoryStore` trait and an in-memory implementation
//! used for tests and the dev/no-Postgres path; `postgres` (feature
//! `persistence-postgres`) is the pgvector-backed production backend;
//! `extractor` is the auto-memory pipeline that turns a session's events
//! into `{Add, Update, Delete}` operations via the same store API.

pub mod extractor;
#[cfg(feature = "persistence-postgres")]
pub mod postgres;
pub mod similarity;
pub mod store;

pub use extractor::{AutoMemoryWorker, Extractor, MemoryOp};
#[cfg(feature = "persistence-postgres")]
pub use postgres::{MemorySchemaConfig, PostgresMemoryStore};
pub use store::{InMemoryMemoryStore, MemoryStore};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::persistence::PersistenceError;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Embedder(#[from] agentgraph_kernel::GraphError),
    #[error("embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("memory not found: {0}")]
    NotFound(String),
    #[error("per-user memory limit exceeded")]
    MemoryLimitExceeded,
}

pub type MemoryResult<T> = Result<T, MemoryError>;

/// One stored memory row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub memory_id: String,
    pub app_name: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub embedding: Vec<f32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// `memory_id = hash(app_name, user_id, content)` — the same
/// content from the same user always maps to the same id, which is what
/// makes `AddMemory` idempotent.
pub fn memory_id(app_name: &str, user_id: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(app_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Embeds `content`, checking the result against `embedder.dimension()`
/// before handing it to a store — the "generate an embedding; reject on
/// dimension mismatch" step every upsert/search path shares.
pub async fn embed_checked(
    embedder: &dyn agentgraph_kernel::Embedder,
    content: &str,
) -> MemoryResult<Vec<f32>> {
    let embedding = embedder.embed(content).await?;
    let expected = embedder.dimension();
    if embedding.len() != expected {
        return Err(MemoryError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_id_is_stable_and_content_sensitive() {
        let a = memory_id("app", "user-1", "likes rust");
        let b = memory_id("app", "user-1", "likes rust");
        let c = memory_id("app", "user-1", "likes go");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
