//! Worker pool executing requests against the transport
//!
//! This module handles:
//! - The run-queue, write-queue and per-worker pending flags of one crawl
//! - Spawning a fixed number of worker tasks
//! - Executing each request with retry and backoff
//! - Termination detection and graceful shutdown of the pool
//!
//! A worker's pending flag is raised under the run-queue lock when it pops a
//! request, and lowered only after the resulting exchange is on the
//! write-queue. The driver checks the run-queue and the flags under that same
//! lock before checking the write-queue, so an in-flight request is always
//! visible to it in one place or another.

use super::queue::WorkQueue;
use super::retry::{Attempted, RetryError, RetryPolicy};
use super::{Exchange, Request, Response};
use crate::output::CrawlCounters;
use crate::transport::Transport;
use crate::ContractViolation;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared state of one crawl
#[derive(Debug)]
pub struct CrawlState {
    pub run_queue: WorkQueue<Request>,
    pub write_queue: WorkQueue<Exchange>,
    pub counters: CrawlCounters,
    pending: Vec<AtomicBool>,
    fatal: Mutex<Option<ContractViolation>>,
}

impl CrawlState {
    /// Creates empty queues and one pending flag per worker
    pub fn new(workers: usize) -> Self {
        Self {
            run_queue: WorkQueue::new(),
            write_queue: WorkQueue::new(),
            counters: CrawlCounters::new(),
            pending: (0..workers).map(|_| AtomicBool::new(false)).collect(),
            fatal: Mutex::new(None),
        }
    }

    pub fn workers(&self) -> usize {
        self.pending.len()
    }

    /// Number of workers with a request in flight
    pub fn pending_count(&self) -> usize {
        self.pending
            .iter()
            .filter(|flag| flag.load(Ordering::SeqCst))
            .count()
    }

    /// Returns true once no work is queued, in flight, or awaiting the driver
    pub fn is_idle(&self) -> bool {
        let nothing_to_run = self
            .run_queue
            .with_lock(|queue| queue.is_empty() && self.pending_count() == 0);
        nothing_to_run && self.write_queue.is_empty()
    }

    /// Records a contract violation hit by a worker; the first one wins
    pub fn raise_fatal(&self, violation: ContractViolation) {
        let mut slot = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(violation);
        }
    }

    pub fn take_fatal(&self) -> Option<ContractViolation> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Lowers a worker's pending flag when dropped, even on panic
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Fixed-size pool of worker tasks
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    grace: Duration,
}

impl WorkerPool {
    /// Spawns one worker per pending flag in `state`
    ///
    /// # Arguments
    ///
    /// * `state` - Queues and flags shared with the driver
    /// * `transport` - Executes built queries
    /// * `retry` - Backoff schedule and attempt budget
    /// * `poll_timeout` - How long a worker waits on an empty run-queue
    ///   before checking for shutdown again
    /// * `grace` - How long shutdown waits for workers before aborting them
    pub fn spawn(
        state: Arc<CrawlState>,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        poll_timeout: Duration,
        grace: Duration,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let handles = (0..state.workers())
            .map(|index| {
                tokio::spawn(run_worker(
                    index,
                    Arc::clone(&state),
                    Arc::clone(&transport),
                    retry.clone(),
                    poll_timeout,
                    shutdown.clone(),
                ))
            })
            .collect();

        Self {
            handles,
            shutdown,
            grace,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals every worker to stop and waits for them to exit
    ///
    /// Workers still running when the grace period ends are aborted.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let deadline = tokio::time::Instant::now() + self.grace;

        for (index, mut handle) in self.handles.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => {
                    tracing::error!("Worker {} panicked: {}", index, e);
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    tracing::warn!(
                        "Worker {} did not exit within {:?}, cancelling it",
                        index,
                        self.grace
                    );
                    handle.abort();
                }
            }
        }
        tracing::debug!("Worker pool shut down");
    }
}

async fn run_worker(
    index: usize,
    state: Arc<CrawlState>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    poll_timeout: Duration,
    shutdown: CancellationToken,
) {
    tracing::debug!("Worker {} started", index);
    let pending = &state.pending[index];

    loop {
        let popped = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            popped = state.run_queue.pop_timeout(poll_timeout, pending) => popped,
        };

        if let Some(request) = popped {
            let _pending = PendingGuard(pending);
            execute_request(&state, transport.as_ref(), &retry, request).await;
        }
    }

    tracing::debug!("Worker {} exiting", index);
}

/// Executes one request and hands its exchange to the driver
///
/// Remote failures are logged and the request dropped. An unresolved
/// placeholder is a contract violation and is raised to the driver.
async fn execute_request(
    state: &CrawlState,
    transport: &dyn Transport,
    retry: &RetryPolicy,
    request: Request,
) {
    let log_id = request.log_id();

    if let Err(violation) = request.query().ensure_resolved() {
        tracing::error!(request = %log_id, "Refusing to send query: {}", violation);
        state.raise_fatal(violation);
        return;
    }

    tracing::debug!(
        request = %log_id,
        kind = %request.resource().kind,
        page = request.page_number(),
        "Executing request"
    );
    tracing::trace!(request = %log_id, "{}", request.query());

    let query = request.query();
    let outcome = retry.run(&log_id, move || transport.execute(query)).await;
    match outcome {
        Ok(Attempted { value, attempts }) => {
            state.counters.record_attempts(attempts);
            let response = Response::new(request.resource(), Some(value));
            tracing::debug!(
                request = %log_id,
                results = response.num_results(),
                has_next = response.end_cursor().is_some(),
                "Request complete"
            );
            state.write_queue.push(Exchange::new(request, response));
        }
        Err(e) => {
            state.counters.record_attempts(e.attempts());
            match e {
                RetryError::GaveUp { .. } => state.counters.record_terminal(),
                RetryError::Exhausted { .. } => state.counters.record_exhausted(),
            }
            tracing::warn!(request = %log_id, "Dropping request: {}", e);
        }
    }
}
