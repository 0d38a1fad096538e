// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Requeue delays for failed keys.
//!
//! Two limiters are combined and the longer delay wins:
//!
//! - **Per-key exponential backoff**: `base * 2^failures`, capped at `max`.
//!   A key that keeps failing backs off on its own without slowing others.
//! - **Token bucket**: an overall `qps` budget with `burst` headroom, so a
//!   storm of failures cannot flood the inventory service.
//!
//! # Retry Schedule
//!
//! With the defaults (5ms base, 1000s cap) a single failing key is retried at
//! approximately 5ms, 10ms, 20ms, 40ms, ... reaching the cap after 18 failures.

use crate::constants::{
    QUEUE_BASE_DELAY_MILLIS, QUEUE_BUCKET_BURST, QUEUE_BUCKET_QPS, QUEUE_MAX_DELAY_SECS,
};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Per-key exponential backoff.
#[derive(Debug)]
pub struct ItemExponentialBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl ItemExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before `item` may be retried; counts one more failure.
    pub fn when(&self, item: &str) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(item.to_string()).or_insert(0);
        let exponent = *count;
        *count = count.saturating_add(1);

        // 2^exponent overflows f64 precision long before it matters; clamp early.
        if exponent >= 63 {
            return self.max;
        }
        let delay = self.base.as_secs_f64() * 2f64.powi(exponent as i32);
        if delay >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(delay)
        }
    }

    pub fn forget(&self, item: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(item);
    }

    #[must_use]
    pub fn num_requeues(&self, item: &str) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(item)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last: Instant,
}

/// Overall token bucket.
///
/// Every call reserves one token. When the bucket is empty the reservation is
/// still taken (the balance goes negative) and the caller is told how long to
/// wait until its token would have been refilled.
#[derive(Debug)]
pub struct TokenBucket {
    qps: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    #[must_use]
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst);
        Self {
            qps,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// Reserve one token and return how long to wait before using it.
    pub fn reserve(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.qps).min(self.burst);
        state.last = now;
        state.tokens -= 1.0;

        if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-state.tokens / self.qps)
        }
    }
}

/// The limiter used by the controller's work queue.
#[derive(Debug)]
pub struct RateLimiter {
    backoff: ItemExponentialBackoff,
    bucket: TokenBucket,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(
            ItemExponentialBackoff::new(
                Duration::from_millis(QUEUE_BASE_DELAY_MILLIS),
                Duration::from_secs(QUEUE_MAX_DELAY_SECS),
            ),
            TokenBucket::new(QUEUE_BUCKET_QPS, QUEUE_BUCKET_BURST),
        )
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(backoff: ItemExponentialBackoff, bucket: TokenBucket) -> Self {
        Self { backoff, bucket }
    }

    /// Delay before `item` may be retried.
    pub fn when(&self, item: &str) -> Duration {
        let per_item = self.backoff.when(item);
        let overall = self.bucket.reserve();
        per_item.max(overall)
    }

    /// Clear the failure history of `item`.
    pub fn forget(&self, item: &str) {
        self.backoff.forget(item);
    }

    /// Number of failures recorded for `item` since it was last forgotten.
    #[must_use]
    pub fn num_requeues(&self, item: &str) -> u32 {
        self.backoff.num_requeues(item)
    }
}

#[cfg(test)]
#[path = "rate_limiter_tests.rs"]
mod rate_limiter_tests;
