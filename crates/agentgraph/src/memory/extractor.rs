//! The auto-memory pipeline: an `Extractor` turns a session's events into
//! `{Add, Update, Delete}` operations, which `AutoMemoryWorker` applies
//! through the same `MemoryStore` API a caller would use directly.

use agentgraph_kernel::GraphResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{MemoryResult, MemoryStore};
use crate::persistence::{Session, SessionStore};
use crate::summarization::dispatch::{DispatchPool, Job};

#[derive(Debug, Clone)]
pub enum MemoryOp {
    Add {
        content: String,
        topics: Vec<String>,
        embedding: Vec<f32>,
    },
    Update {
        memory_id: String,
        content: String,
        topics: Vec<String>,
        embedding: Vec<f32>,
    },
    Delete {
        memory_id: String,
    },
}

/// External collaborator, interface only: a concrete `Extractor` is
/// typically a `Model` call over the session's recent events plus an
/// embedder call per resulting memory. This crate supplies neither.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, session: &Session) -> GraphResult<Vec<MemoryOp>>;
}

/// Applies one extracted op through `store`, using `per_user_limit` for
/// the `Add` case.
pub async fn apply_memory_op(
    store: &dyn MemoryStore,
    app_name: &str,
    user_id: &str,
    op: MemoryOp,
    per_user_limit: Option<usize>,
) -> MemoryResult<()> {
    match op {
        MemoryOp::Add {
            content,
            topics,
            embedding,
        } => {
            store
                .add_memory(app_name, user_id, &content, topics, embedding, per_user_limit)
                .await?;
        }
        MemoryOp::Update {
            memory_id,
            content,
            topics,
            embedding,
        } => {
            store.update_memory(&memory_id, &content, topics, embedding).await?;
        }
        MemoryOp::Delete { memory_id } => {
            store.delete_memory(&memory_id).await?;
        }
    }
    Ok(())
}

/// Owns its own hashed-dispatch pool, separate from the summarization
/// service's — per spec.md §4.8, "the service owns an `AutoMemoryWorker`
/// with its own pool."
pub struct AutoMemoryWorker {
    session_store: Arc<dyn SessionStore>,
    memory_store: Arc<dyn MemoryStore>,
    extractor: Arc<dyn Extractor>,
    per_user_limit: Option<usize>,
    pool: DispatchPool,
}

impl AutoMemoryWorker {
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        memory_store: Arc<dyn MemoryStore>,
        extractor: Arc<dyn Extractor>,
        per_user_limit: Option<usize>,
        worker_count: usize,
        queue_capacity: usize,
        job_timeout: Duration,
    ) -> Self {
        Self {
            session_store,
            memory_store,
            extractor,
            per_user_limit,
            pool: DispatchPool::new(worker_count, queue_capacity, job_timeout),
        }
    }

    pub async fn start(&self) {
        self.pool.start().await;
    }

    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    /// Fetches `session_id`, runs the extractor, applies the resulting
    /// ops. Errors are logged, not propagated — the caller only learns
    /// whether the job ran asynchronously or inline.
    pub async fn enqueue_auto_memory_job(&self, session_id: Uuid, shard_key: u64) -> bool {
        let session_store = self.session_store.clone();
        let memory_store = self.memory_store.clone();
        let extractor = self.extractor.clone();
        let per_user_limit = self.per_user_limit;
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let session = match session_store.get_session(session_id).await {
                    Ok(Some(session)) => session,
                    Ok(None) => {
                        tracing::warn!(%session_id, "auto-memory job skipped: session not found");
                        return;
                    }
                    Err(err) => {
                        tracing::warn!(%session_id, error = %err, "auto-memory job failed to load session");
                        return;
                    }
                };
                let ops = match extractor.extract(&session).await {
                    Ok(ops) => ops,
                    Err(err) => {
                        tracing::warn!(%session_id, error = %err, "auto-memory extractor failed");
                        return;
                    }
                };
                for op in ops {
                    if let Err(err) = apply_memory_op(
                        memory_store.as_ref(),
                        &session.app_name,
                        &session.user_id,
                        op,
                        per_user_limit,
                    )
                    .await
                    {
                        tracing::warn!(%session_id, error = %err, "auto-memory op failed");
                    }
                }
            })
        });
        self.pool.enqueue(shard_key, job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMemoryStore;
    use crate::persistence::InMemorySessionStore;

    struct StubExtractor;

    #[async_trait]
    impl Extractor for StubExtractor {
        async fn extract(&self, session: &Session) -> GraphResult<Vec<MemoryOp>> {
            Ok(vec![MemoryOp::Add {
                content: format!("summary for {}", session.user_id),
                topics: vec!["auto".to_string()],
                embedding: vec![1.0, 0.0],
            }])
        }
    }

    #[tokio::test]
    async fn apply_add_op_creates_a_memory() {
        let memory_store = InMemoryMemoryStore::new(true);
        apply_memory_op(
            &memory_store,
            "app",
            "user-1",
            MemoryOp::Add {
                content: "likes rust".to_string(),
                topics: vec![],
                embedding: vec![1.0],
            },
            None,
        )
        .await
        .unwrap();

        let rows = memory_store.read_memories("app", "user-1", 10, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn worker_runs_extractor_and_applies_ops() {
        let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let memory_store: Arc<dyn MemoryStore> = Arc::new(InMemoryMemoryStore::new(true));
        let session = Session::new("app", "user-1");
        let id = session.id;
        session_store.create_session(&session).await.unwrap();

        let worker = AutoMemoryWorker::new(
            session_store,
            memory_store.clone(),
            Arc::new(StubExtractor),
            None,
            1,
            4,
            Duration::from_secs(5),
        );
        worker.start().await;
        worker.enqueue_auto_memory_job(id, session.hash).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.stop().await;

        let rows = memory_store.read_memories("app", "user-1", 10, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "summary for user-1");
    }
}
