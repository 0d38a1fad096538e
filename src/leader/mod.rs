// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Lease-based leader election.
//!
//! Every controller replica runs a [`LeaderElector`] against the same lease.
//! The replica holding the lease runs the reconciliation pipeline through
//! [`LeaderCallbacks::on_started_leading`]; everyone else only retries the
//! acquisition.
//!
//! # State machine
//!
//! ```text
//! Unknown -> Following -> Leading -> Terminated
//!    |                      ^
//!    +----------------------+
//! ```
//!
//! A leader renews every `retry_period` and must succeed within
//! `renew_deadline`, otherwise [`LeaderElector::run`] returns
//! [`StopReason::LeaseLost`] and the caller is expected to exit the process.
//!
//! Lease expiry is judged against the local monotonic instant at which the
//! current lease record was first observed, never against the remote
//! `renewTime`, so clock skew between replicas cannot shorten a lease.

pub mod kube_lock;
pub mod lock;
pub mod memory;

pub use kube_lock::KubeLeaseLock;
pub use lock::{LeaseLock, LeaseRecord};
pub use memory::{InMemoryLeaseLock, LeaseStore};

use crate::constants::{
    DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_RENEW_DEADLINE_SECS, DEFAULT_LEASE_RETRY_PERIOD_SECS,
    LEASE_JITTER_FACTOR,
};
use crate::errors::{LeaderElectionError, LeaseError};
use crate::metrics;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

/// Lease timings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaderElectionConfig {
    /// How long followers wait after the last observed change before taking over
    pub lease_duration: Duration,
    /// How long the leader keeps retrying a renewal before giving up
    pub renew_deadline: Duration,
    /// Interval between acquisition attempts and between renewals
    pub retry_period: Duration,
    /// Clear the holder when leadership ends voluntarily
    pub release_on_cancel: bool,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(DEFAULT_LEASE_DURATION_SECS),
            renew_deadline: Duration::from_secs(DEFAULT_LEASE_RENEW_DEADLINE_SECS),
            retry_period: Duration::from_secs(DEFAULT_LEASE_RETRY_PERIOD_SECS),
            release_on_cancel: true,
        }
    }
}

impl LeaderElectionConfig {
    /// Check `lease_duration > renew_deadline > retry_period * 1.2`.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderElectionError::InvalidTiming`] when a duration is zero
    /// or the ordering does not hold.
    pub fn validate(&self) -> Result<(), LeaderElectionError> {
        for (field, value) in [
            ("leaseDuration", self.lease_duration),
            ("renewDeadline", self.renew_deadline),
            ("retryPeriod", self.retry_period),
        ] {
            if value.is_zero() {
                return Err(LeaderElectionError::InvalidTiming(format!(
                    "{field} must be greater than zero"
                )));
            }
        }
        if self.lease_duration <= self.renew_deadline {
            return Err(LeaderElectionError::InvalidTiming(format!(
                "leaseDuration ({:?}) must be greater than renewDeadline ({:?})",
                self.lease_duration, self.renew_deadline
            )));
        }
        let jittered_retry = self.retry_period.mul_f64(LEASE_JITTER_FACTOR);
        if self.renew_deadline <= jittered_retry {
            return Err(LeaderElectionError::InvalidTiming(format!(
                "renewDeadline ({:?}) must be greater than retryPeriod * {LEASE_JITTER_FACTOR} ({jittered_retry:?})",
                self.renew_deadline
            )));
        }
        Ok(())
    }
}

/// Where this replica stands in the election.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaderState {
    Unknown,
    Following,
    Leading,
    Terminated,
}

/// Why [`LeaderElector::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Renewal failed or another replica took the lease
    LeaseLost,
    /// Shutdown was requested
    Shutdown,
    /// The leading task returned on its own
    Finished,
}

/// Hooks invoked by the elector.
#[async_trait]
pub trait LeaderCallbacks: Send + Sync {
    /// Runs while this replica leads. The future is dropped when the lease is
    /// lost; on shutdown `stop` flips to `true` and the future gets
    /// `renew_deadline` to return.
    async fn on_started_leading(&self, stop: watch::Receiver<bool>);

    /// Leadership ended, for any reason.
    fn on_stopped_leading(&self) {}

    /// A different holder was observed, including this replica itself.
    fn on_new_leader(&self, _identity: &str) {}
}

#[derive(Clone, Debug)]
struct Observed {
    record: LeaseRecord,
    at: Instant,
}

/// Runs the election protocol over a [`LeaseLock`].
pub struct LeaderElector<L: LeaseLock> {
    lock: L,
    config: LeaderElectionConfig,
    observed: Mutex<Option<Observed>>,
    reported_leader: Mutex<String>,
    state: watch::Sender<LeaderState>,
}

impl<L: LeaseLock> LeaderElector<L> {
    /// # Errors
    ///
    /// Rejects invalid timings and an empty lock identity.
    pub fn new(lock: L, config: LeaderElectionConfig) -> Result<Self, LeaderElectionError> {
        config.validate()?;
        if lock.identity().is_empty() {
            return Err(LeaderElectionError::EmptyIdentity);
        }
        let (state, _) = watch::channel(LeaderState::Unknown);
        Ok(Self {
            lock,
            config,
            observed: Mutex::new(None),
            reported_leader: Mutex::new(String::new()),
            state,
        })
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        self.lock.identity()
    }

    #[must_use]
    pub fn state(&self) -> LeaderState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.state() == LeaderState::Leading
    }

    /// Receiver that sees every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LeaderState> {
        self.state.subscribe()
    }

    /// Holder of the most recently observed lease record.
    #[must_use]
    pub fn observed_leader(&self) -> Option<String> {
        self.observed()
            .as_ref()
            .filter(|o| o.record.is_held())
            .map(|o| o.record.holder_identity.clone())
    }

    /// Compete for the lease, lead until leadership ends, and report why.
    pub async fn run<C>(&self, callbacks: &C, mut shutdown: watch::Receiver<bool>) -> StopReason
    where
        C: LeaderCallbacks + ?Sized,
    {
        let lease = self.lock.describe();
        info!(identity = %self.identity(), lease = %lease, "starting leader election");

        if !self.acquire(callbacks, &mut shutdown).await {
            self.set_state(LeaderState::Terminated);
            info!(
                identity = %self.identity(),
                "leader election stopped before acquiring the lease"
            );
            return StopReason::Shutdown;
        }

        self.set_state(LeaderState::Leading);
        metrics::record_leader_elected(self.identity());
        info!(identity = %self.identity(), lease = %lease, "became leader");

        let (stop_tx, stop_rx) = watch::channel(false);
        let leading = callbacks.on_started_leading(stop_rx);
        tokio::pin!(leading);

        let reason = tokio::select! {
            () = &mut leading => StopReason::Finished,
            () = self.renew(callbacks) => StopReason::LeaseLost,
            () = shutdown_requested(&mut shutdown) => {
                stop_tx.send_replace(true);
                let stopped = timeout(self.config.renew_deadline, &mut leading).await;
                if stopped.is_err() {
                    warn!(
                        identity = %self.identity(),
                        "leading task did not stop within the renew deadline"
                    );
                }
                StopReason::Shutdown
            }
        };

        match reason {
            StopReason::LeaseLost => {
                error!(identity = %self.identity(), lease = %lease, "leader election lost");
            }
            StopReason::Shutdown | StopReason::Finished => {
                if self.config.release_on_cancel {
                    self.release().await;
                }
            }
        }

        metrics::record_leader_lost(self.identity());
        self.set_state(LeaderState::Terminated);
        callbacks.on_stopped_leading();
        reason
    }

    /// Retry until the lease is ours (`true`) or shutdown is requested (`false`).
    async fn acquire<C>(&self, callbacks: &C, shutdown: &mut watch::Receiver<bool>) -> bool
    where
        C: LeaderCallbacks + ?Sized,
    {
        loop {
            if *shutdown.borrow() {
                return false;
            }

            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    self.report_leader(callbacks);
                    return true;
                }
                Ok(false) => {
                    self.set_state(LeaderState::Following);
                    debug!(
                        identity = %self.identity(),
                        leader = ?self.observed_leader(),
                        "lease is held by another replica"
                    );
                }
                Err(e) => {
                    self.set_state(LeaderState::Following);
                    warn!(identity = %self.identity(), error = %e, "failed to acquire lease");
                }
            }
            self.report_leader(callbacks);

            tokio::select! {
                () = sleep(self.jittered_retry_period()) => {}
                () = shutdown_requested(shutdown) => return false,
            }
        }
    }

    /// Returns once the lease can no longer be renewed.
    async fn renew<C>(&self, callbacks: &C)
    where
        C: LeaderCallbacks + ?Sized,
    {
        loop {
            sleep(self.config.retry_period).await;

            match timeout(self.config.renew_deadline, self.renew_once()).await {
                Ok(true) => {
                    metrics::record_leader_renewed();
                    self.report_leader(callbacks);
                }
                Ok(false) => {
                    self.report_leader(callbacks);
                    warn!(
                        identity = %self.identity(),
                        leader = ?self.observed_leader(),
                        "lease was taken by another replica"
                    );
                    return;
                }
                Err(_) => {
                    warn!(
                        identity = %self.identity(),
                        deadline = ?self.config.renew_deadline,
                        "failed to renew lease within the deadline"
                    );
                    return;
                }
            }
        }
    }

    async fn renew_once(&self) -> bool {
        loop {
            match self.try_acquire_or_renew().await {
                Ok(held) => return held,
                Err(e) => {
                    debug!(identity = %self.identity(), error = %e, "lease renewal attempt failed");
                    sleep(self.config.retry_period).await;
                }
            }
        }
    }

    /// One round of the protocol: create the lease, renew it, or take it over
    /// once the current holder's claim has expired.
    ///
    /// `Ok(false)` means another replica holds an unexpired lease.
    async fn try_acquire_or_renew(&self) -> Result<bool, LeaseError> {
        let now = Utc::now();
        let identity = self.identity();
        let mut desired = LeaseRecord {
            holder_identity: identity.to_string(),
            lease_duration_seconds: i32::try_from(self.config.lease_duration.as_secs())
                .unwrap_or(i32::MAX),
            acquire_time: Some(now),
            renew_time: Some(now),
            leader_transitions: 0,
            resource_version: None,
        };

        let Some(current) = self.lock.get().await? else {
            let created = self.lock.create(&desired).await?;
            self.observe(created);
            return Ok(true);
        };

        let observed_at = self.observe_if_changed(&current);
        if current.is_held() && !current.is_held_by(identity) {
            let claim =
                Duration::from_secs(u64::try_from(current.lease_duration_seconds).unwrap_or(0));
            if observed_at + claim > Instant::now() {
                return Ok(false);
            }
        }

        if current.is_held_by(identity) {
            desired.acquire_time = current.acquire_time;
            desired.leader_transitions = current.leader_transitions;
        } else {
            desired.leader_transitions = current.leader_transitions + 1;
        }
        desired.resource_version = current.resource_version;

        let updated = self.lock.update(&desired).await?;
        self.observe(updated);
        Ok(true)
    }

    async fn release(&self) {
        let Some(current) = self.observed().map(|o| o.record) else {
            return;
        };
        if !current.is_held_by(self.identity()) {
            return;
        }

        let now = Utc::now();
        let released = LeaseRecord {
            holder_identity: String::new(),
            lease_duration_seconds: 1,
            acquire_time: Some(now),
            renew_time: Some(now),
            leader_transitions: current.leader_transitions,
            resource_version: current.resource_version,
        };
        match self.lock.update(&released).await {
            Ok(stored) => {
                self.observe(stored);
                info!(identity = %self.identity(), "released lease");
            }
            Err(e) => {
                warn!(identity = %self.identity(), error = %e, "failed to release lease");
            }
        }
    }

    fn jittered_retry_period(&self) -> Duration {
        let jitter = self
            .config
            .retry_period
            .mul_f64(LEASE_JITTER_FACTOR * rand::random::<f64>());
        self.config.retry_period + jitter
    }

    fn report_leader<C>(&self, callbacks: &C)
    where
        C: LeaderCallbacks + ?Sized,
    {
        let Some(holder) = self.observed_leader() else {
            return;
        };
        {
            let mut reported = lock_ignoring_poison(&self.reported_leader);
            if *reported == holder {
                return;
            }
            reported.clone_from(&holder);
        }
        if holder != self.identity() {
            info!(identity = %self.identity(), leader = %holder, "new leader elected");
        }
        callbacks.on_new_leader(&holder);
    }

    fn set_state(&self, state: LeaderState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn observed(&self) -> Option<Observed> {
        lock_ignoring_poison(&self.observed).clone()
    }

    fn observe(&self, record: LeaseRecord) {
        *lock_ignoring_poison(&self.observed) = Some(Observed {
            record,
            at: Instant::now(),
        });
    }

    /// Instant at which `record` was first seen.
    fn observe_if_changed(&self, record: &LeaseRecord) -> Instant {
        let mut observed = lock_ignoring_poison(&self.observed);
        match observed.as_ref() {
            Some(o) if o.record == *record => o.at,
            _ => {
                let at = Instant::now();
                *observed = Some(Observed {
                    record: record.clone(),
                    at,
                });
                at
            }
        }
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves once `shutdown` is `true` or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
