//! Bounded-concurrency FIFO executor.
//!
//! Work items are admitted in submission order, at most `max_concurrent` at
//! a time. With `max_concurrent == 1` items run strictly one after another,
//! which is how the deployer and the command channel serialize their work.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::oneshot;

use super::queue::Queue;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("work item was abandoned before producing a result")]
    Abandoned,
}

#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Label used in log lines.
    pub name: Option<String>,
    /// Log the elapsed time of every work item.
    pub log_time: bool,
}

/// Cloneable handle; clones share the same pending list and running count.
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    max_concurrent: usize,
    log_time: bool,
    state: Mutex<State>,
}

struct State {
    running: usize,
    pending: Queue<Job>,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl OperationQueue {
    /// `max_concurrent` is clamped to at least 1.
    #[must_use]
    pub fn new(max_concurrent: usize, options: QueueOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: options.name.unwrap_or_else(|| "<no name>".to_string()),
                max_concurrent: max_concurrent.max(1),
                log_time: options.log_time,
                state: Mutex::new(State {
                    running: 0,
                    pending: Queue::new(),
                    idle_waiters: Vec::new(),
                }),
            }),
        }
    }

    /// Single-concurrency queue with the given label.
    #[must_use]
    pub fn serial(name: &str) -> Self {
        Self::new(
            1,
            QueueOptions {
                name: Some(name.to_string()),
                log_time: false,
            },
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Enqueue `work` and return a future for its output.
    ///
    /// The item is queued before this returns, so submission order is call
    /// order. Dropping the returned [`Submission`] does not cancel the work.
    /// Must be called from within a tokio runtime.
    pub fn submit<F, Fut, T>(&self, work: F) -> Submission<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let name = self.inner.name.clone();
        let log_time = self.inner.log_time;

        let job: Job = Box::pin(async move {
            let started = log_time.then(Instant::now);
            let output = work().await;
            if let Some(started) = started {
                tracing::info!(
                    queue = %name,
                    elapsed_ms = started.elapsed().as_millis(),
                    "operation finished"
                );
            }
            // The submitter may have stopped listening; the work still counts.
            let _ = tx.send(output);
        });

        self.inner.lock().pending.push(job);
        self.inner.pump();

        Submission { rx }
    }

    /// Number of items waiting for admission.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Number of items currently executing.
    #[must_use]
    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    /// Resolve once nothing is pending and nothing is running.
    ///
    /// Returns immediately when the queue is already idle. Each call waits
    /// for the next idle moment only; work submitted afterwards needs a
    /// fresh wait.
    pub async fn wait_until_finished(&self) {
        let rx = {
            let mut state = self.inner.lock();
            if state.pending.is_empty() && state.running == 0 {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.idle_waiters.push(tx);
            rx
        };
        let _ = rx.await;
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pump(self: &Arc<Self>) {
        loop {
            let job = {
                let mut state = self.lock();
                if state.running >= self.max_concurrent {
                    return;
                }
                if let Some(job) = state.pending.pop() {
                    state.running += 1;
                    job
                } else {
                    if state.running == 0 {
                        for waiter in state.idle_waiters.drain(..) {
                            let _ = waiter.send(());
                        }
                    }
                    return;
                }
            };

            let inner = Arc::clone(self);
            tokio::spawn(async move {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    tracing::error!(
                        queue = %inner.name,
                        "work item panicked past its own error boundary; this should never happen"
                    );
                }
                inner.lock().running -= 1;
                inner.pump();
            });
        }
    }
}

/// Output of a submitted work item.
pub struct Submission<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> fmt::Debug for Submission<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission").finish_non_exhaustive()
    }
}

impl<T> Future for Submission<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map_err(|_| QueueError::Abandoned)
    }
}
