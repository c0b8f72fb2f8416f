//! Unbounded FIFO work queue shared between the driver and the workers

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// FIFO queue with async, timeout-bounded pops
///
/// The lock is never held across an await point.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Pops an item, raising `flag` under the same lock if one was taken
    ///
    /// Anyone who sees this queue empty while holding its lock therefore also
    /// sees the flag of every worker that emptied it.
    pub fn pop_marking(&self, flag: &AtomicBool) -> Option<T> {
        let mut items = self.lock();
        let item = items.pop_front();
        if item.is_some() {
            flag.store(true, Ordering::SeqCst);
        }
        item
    }

    /// Waits up to `timeout` for an item, marking `flag` as [`pop_marking`] does
    ///
    /// [`pop_marking`]: Self::pop_marking
    pub async fn pop_timeout(&self, timeout: Duration, flag: &AtomicBool) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.pop_marking(flag) {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pop_marking(flag);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs `f` while holding the queue lock
    pub fn with_lock<R>(&self, f: impl FnOnce(&VecDeque<T>) -> R) -> R {
        f(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
