// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deduplicating work queue of reconciliation keys.
//!
//! Keys move through three sets:
//!
//! - **queue**: waiting to be handed to a worker, in FIFO order
//! - **dirty**: needs processing (queued, or re-added while in flight)
//! - **processing**: currently held by a worker
//!
//! A key is never in `queue` twice and never handed to two workers at once.
//! Adding a key that is in flight only marks it dirty; [`WorkQueue::done`]
//! puts it back on the queue so the latest state is processed once more.
//!
//! # Example
//!
//! ```rust,no_run
//! use loadbalance_controller::workqueue::WorkQueue;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let queue = Arc::new(WorkQueue::new());
//! queue.add("default/web");
//!
//! while let Some(key) = queue.get().await {
//!     // reconcile key ...
//!     queue.done(&key);
//! }
//! # }
//! ```

pub mod rate_limiter;

pub use rate_limiter::RateLimiter;

use crate::metrics;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    shutting_down: bool,
}

/// Rate-limited deduplicating FIFO of string keys.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    limiter: RateLimiter,
}

impl WorkQueue {
    /// Create a queue with the default rate limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rate_limiter(limiter: RateLimiter) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            limiter,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` as needing processing.
    ///
    /// Coalesces with a pending or in-flight copy of the same key. Ignored
    /// once the queue is shutting down.
    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }

        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            trace!(key = %key, "Key in flight, marked dirty");
            return;
        }

        state.queue.push_back(key);
        metrics::set_queue_depth(state.queue.len());
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next key.
    ///
    /// Returns `None` once the queue is shutting down and has been drained.
    /// The caller must call [`WorkQueue::done`] with the returned key.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    metrics::set_queue_depth(state.queue.len());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release the in-flight marker for `key`.
    ///
    /// If the key was re-added while it was being processed, it goes back on
    /// the queue.
    pub fn done(&self, key: &str) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.to_string());
            metrics::set_queue_depth(state.queue.len());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop accepting keys and wake every waiting worker.
    ///
    /// Keys already queued are still handed out; `get` returns `None` once
    /// they are gone.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys waiting to be handed out (in-flight keys excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add `key` once `delay` has elapsed.
    pub fn add_after(self: &Arc<Self>, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Add `key` after the delay chosen by the rate limiter.
    pub fn add_rate_limited(self: &Arc<Self>, key: impl Into<String>) {
        let key = key.into();
        let delay = self.limiter.when(&key);
        trace!(key = %key, delay_ms = delay.as_millis(), "Requeueing with backoff");
        self.add_after(key, delay);
    }

    /// Clear the rate limiter's failure history for `key`.
    pub fn forget(&self, key: &str) {
        self.limiter.forget(key);
    }

    /// Failures recorded for `key` since it was last forgotten.
    #[must_use]
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.limiter.num_requeues(key)
    }
}
