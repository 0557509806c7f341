//! `N`-worker hashed-dispatch pool for summarization jobs.
//!
//! Jobs are routed to `session.hash % N` so a session's summarize calls are
//! always processed by the same worker and stay ordered relative to each
//! other. Enqueue never blocks: a full or stopped queue falls back to
//! running the job synchronously on the caller's task.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

pub type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct Inner {
    senders: Vec<mpsc::Sender<Job>>,
    receivers: Option<Vec<mpsc::Receiver<Job>>>,
    workers: Vec<JoinHandle<()>>,
    running: bool,
}

fn fresh_channels(n: usize, capacity: usize) -> (Vec<mpsc::Sender<Job>>, Vec<mpsc::Receiver<Job>>) {
    let mut senders = Vec::with_capacity(n);
    let mut receivers = Vec::with_capacity(n);
    for _ in 0..n {
        let (tx, rx) = mpsc::channel(capacity);
        senders.push(tx);
        receivers.push(rx);
    }
    (senders, receivers)
}

/// A bounded pool of `n` workers, each draining its own queue in submission
/// order. `Start`/`Stop` are idempotent; `EnqueueJob` takes a read lock while
/// sending, `Stop` takes the write lock before tearing the channels down, so
/// the three are race-free with each other.
pub struct DispatchPool {
    inner: Arc<RwLock<Inner>>,
    n: usize,
    capacity: usize,
    job_timeout: Duration,
}

impl DispatchPool {
    pub fn new(n: usize, capacity: usize, job_timeout: Duration) -> Self {
        assert!(n > 0, "dispatch pool needs at least one worker");
        let (senders, receivers) = fresh_channels(n, capacity);
        Self {
            inner: Arc::new(RwLock::new(Inner {
                senders,
                receivers: Some(receivers),
                workers: Vec::new(),
                running: false,
            })),
            n,
            capacity,
            job_timeout,
        }
    }

    pub async fn start(&self) {
        let mut inner = self.inner.write().await;
        if inner.running {
            return;
        }
        let receivers = inner
            .receivers
            .take()
            .expect("receivers present whenever the pool isn't running");
        for receiver in receivers {
            let timeout = self.job_timeout;
            inner.workers.push(tokio::spawn(worker_loop(receiver, timeout)));
        }
        inner.running = true;
    }

    /// Closes every queue, waits for workers to drain and exit, then resets
    /// state so `start` can be called again.
    pub async fn stop(&self) {
        let mut inner = self.inner.write().await;
        if !inner.running {
            return;
        }
        let (fresh_senders, fresh_receivers) = fresh_channels(self.n, self.capacity);
        let old_senders = std::mem::replace(&mut inner.senders, fresh_senders);
        inner.receivers = Some(fresh_receivers);
        let workers = std::mem::take(&mut inner.workers);
        inner.running = false;
        drop(old_senders);
        // Release the lock before awaiting worker shutdown — holding a write
        // guard across `.await` here would block any concurrent enqueue
        // that only needs a read lock.
        drop(inner);
        for handle in workers {
            let _ = handle.await;
        }
    }

    /// Dispatches `job` to worker `shard_key % n`. Returns `true` if it was
    /// queued, `false` if it ran synchronously on this call (pool stopped,
    /// or that worker's queue is full).
    pub async fn enqueue(&self, shard_key: u64, job: Job) -> bool {
        let idx = (shard_key % self.n as u64) as usize;
        let sender = {
            let inner = self.inner.read().await;
            if inner.running {
                inner.senders.get(idx).cloned()
            } else {
                None
            }
        };

        let Some(sender) = sender else {
            job().await;
            return false;
        };

        match sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                job().await;
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                job().await;
                false
            }
        }
    }
}

async fn worker_loop(mut receiver: mpsc::Receiver<Job>, job_timeout: Duration) {
    while let Some(job) = receiver.recv().await {
        match tokio::time::timeout(job_timeout, tokio::spawn(job())).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                tracing::error!(panicked = join_err.is_panic(), "summarization job failed");
            }
            Err(_) => {
                tracing::warn!(?job_timeout, "summarization job timed out");
            }
        }
    }
}
