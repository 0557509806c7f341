//! Cascading, per-session summarization: the delta algorithm (`delta`) plus
//! the asynchronous hashed-dispatch worker pool that runs it off the
//! caller's path (`dispatch`).

pub mod delta;
pub mod dispatch;

use crate::persistence::{PersistenceError, Session, SessionStore};
use agentgraph_kernel::Summarizer;
use delta::{cascade_summarize, SummarizationError};
use dispatch::DispatchPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Ties a [`SessionStore`], a [`Summarizer`], and a [`DispatchPool`] together
/// behind the single `EnqueueJob(session, filter_key, force)` entry point the
/// rest of the engine calls.
pub struct SummarizationService {
    store: Arc<dyn SessionStore>,
    summarizer: Arc<dyn Summarizer>,
    pool: DispatchPool,
}

impl SummarizationService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        summarizer: Arc<dyn Summarizer>,
        worker_count: usize,
        queue_capacity: usize,
        job_timeout: Duration,
    ) -> Self {
        Self {
            store,
            summarizer,
            pool: DispatchPool::new(worker_count, queue_capacity, job_timeout),
        }
    }

    pub async fn start(&self) {
        self.pool.start().await;
    }

    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    /// Enqueues a cascade-summarize job for `session`, sharded by its
    /// `hash`. Errors inside the job are logged, not propagated — the
    /// caller only learns whether the job ran asynchronously or inline.
    pub async fn enqueue_job(&self, session: &Session, filter_key: String, force: bool) -> bool {
        let store = self.store.clone();
        let summarizer = self.summarizer.clone();
        let session_id = session.id;
        let job: dispatch::Job = Box::new(move || {
            Box::pin(async move {
                if let Err(err) =
                    cascade_summarize(store.as_ref(), summarizer.as_ref(), session_id, &filter_key, force).await
                {
                    tracing::warn!(%session_id, error = %err, "summarization job failed");
                }
            })
        });
        self.pool.enqueue(session.hash, job).await
    }
}

/// Fetches the session, then enqueues its summarization job — the shape the
/// engine calls after a superstep advances a session's event log.
pub async fn enqueue_auto_summarize(
    service: &SummarizationService,
    session_id: Uuid,
    filter_key: String,
    force: bool,
) -> Result<bool, SummarizationError> {
    let session = service
        .store
        .get_session(session_id)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(session_id.to_string()))?;
    Ok(service.enqueue_job(&session, filter_key, force).await)
}
