//! Process-wide rate limiter for the marketplace feed endpoint.
//!
//! [`RateLimiter`] owns an unbounded FIFO queue drained by a single worker
//! task. The worker keeps at least `min_interval` between the end of one
//! task and the start of the next, so only one task runs at a time and every
//! caller sharing the limiter gets a total ordering of submissions.
//!
//! The limiter never retries or inspects a task's output: the handle returned
//! by [`RateLimiter::schedule`] resolves to exactly what the task produced.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Pause the worker takes after each task.
pub const DEFAULT_INTER_TASK_PAUSE: Duration = Duration::from_millis(100);

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Failure to run a scheduled task. The task's own errors are never mapped
/// here; they come back inside the handle's `Ok` value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimiterError {
    /// The worker has shut down and no longer accepts tasks.
    #[error("rate limiter worker is not running")]
    WorkerStopped,
    /// The task was dropped before producing a result (it panicked).
    #[error("scheduled task was dropped before completing")]
    TaskDropped,
}

/// Counters shared between the limiter handle and its worker.
#[derive(Debug, Default)]
struct Counters {
    pending: AtomicUsize,
    completed: AtomicU64,
}

/// Serializes calls to a constrained endpoint behind a minimum interval.
///
/// Cheap to clone; all clones feed the same queue and worker. The worker
/// exits once every clone is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    sender: mpsc::UnboundedSender<Job>,
    min_interval: Duration,
    counters: Arc<Counters>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_second` executions and spawns
    /// its worker on the current tokio runtime.
    ///
    /// `min_interval = 1000 / requests_per_second` ms. A non-positive or
    /// non-finite rate falls back to one request per second.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime (via `tokio::spawn`).
    #[must_use]
    pub fn new(requests_per_second: f64, inter_task_pause: Duration) -> Self {
        Self::with_min_interval(min_interval_for(requests_per_second), inter_task_pause)
    }

    /// Creates a limiter with an explicit minimum interval.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime (via `tokio::spawn`).
    #[must_use]
    pub fn with_min_interval(min_interval: Duration, inter_task_pause: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        tokio::spawn(run_worker(
            receiver,
            min_interval,
            inter_task_pause,
            Arc::clone(&counters),
        ));
        Self {
            sender,
            min_interval,
            counters,
        }
    }

    /// Enqueues `task` and returns a handle resolving to its output.
    ///
    /// The task is queued immediately, whether or not the handle is awaited.
    pub fn schedule<F, Fut, T>(&self, task: F) -> Scheduled<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let output = task().await;
                let _ = tx.send(output);
            })
        });

        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        let accepted = self.sender.send(job).is_ok();
        if !accepted {
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("feed rate limiter worker stopped; task rejected");
        }
        Scheduled { rx, accepted }
    }

    /// Minimum spacing enforced between executions.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Tasks queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.counters.pending.load(Ordering::SeqCst)
    }

    /// Tasks that have finished since the limiter was created.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }
}

/// Handle to a task queued on a [`RateLimiter`].
#[derive(Debug)]
#[must_use = "the handle carries the task's result"]
pub struct Scheduled<T> {
    rx: oneshot::Receiver<T>,
    accepted: bool,
}

impl<T> Future for Scheduled<T> {
    type Output = Result<T, RateLimiterError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.accepted {
            return Poll::Ready(Err(RateLimiterError::WorkerStopped));
        }
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| RateLimiterError::TaskDropped))
    }
}

/// Converts a request rate into the spacing between executions.
#[must_use]
pub fn min_interval_for(requests_per_second: f64) -> Duration {
    if requests_per_second.is_finite() && requests_per_second > 0.0 {
        Duration::from_secs_f64(1.0 / requests_per_second)
    } else {
        tracing::warn!(
            requests_per_second,
            "invalid feed request rate, falling back to 1 request per second"
        );
        Duration::from_secs(1)
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    min_interval: Duration,
    inter_task_pause: Duration,
    counters: Arc<Counters>,
) {
    let mut last_request: Option<Instant> = None;

    while let Some(job) = receiver.recv().await {
        if let Some(last) = last_request {
            let wait = min_interval.saturating_sub(last.elapsed());
            if !wait.is_zero() {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");
                tokio::time::sleep(wait).await;
            }
        }

        // A panicking task must not take the worker down with it.
        if let Err(err) = tokio::spawn(job()).await {
            tracing::error!(error = %err, "rate-limited task panicked");
        }

        last_request = Some(Instant::now());
        counters.pending.fetch_sub(1, Ordering::SeqCst);
        counters.completed.fetch_add(1, Ordering::SeqCst);

        if !inter_task_pause.is_zero() {
            tokio::time::sleep(inter_task_pause).await;
        }
    }

    tracing::debug!("rate limiter worker exiting");
}
