// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The reconciliation pipeline run by the elected leader.
//!
//! ```text
//! Service watch -> ServiceInformer -> WorkQueue -> workers -> reconcile_service
//! ```
//!
//! Workers start only once the informer has completed its first listing.
//! A shutdown signal stops the informer and shuts the queue down; workers
//! finish the keys already queued and exit.

use crate::allocation::{AllocationClient, Allocator};
use crate::context::Context;
use crate::errors::{AllocationError, ReconcileError};
use crate::event_source::{split_key, QueueingEventHandler, ServiceInformer};
use crate::leader::LeaderCallbacks;
use crate::metrics;
use crate::reconcilers::{reconcile_service, KubeStatusWriter, ReconcileOutcome};
use crate::workqueue::WorkQueue;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Pipeline tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Number of concurrent workers, at least one
    pub workers: usize,
    /// Period between full resyncs; zero disables resync
    pub resync_period: Duration,
    /// Requeue failed keys with backoff instead of dropping them
    pub requeue_on_failure: bool,
}

/// Assigns inventory IPs to LoadBalancer Services.
pub struct LoadBalanceController {
    client: Client,
    allocator: Arc<AllocationClient>,
    options: ControllerOptions,
}

impl LoadBalanceController {
    /// Build the controller and fill the IP pool cache.
    ///
    /// # Errors
    ///
    /// Fails when the free IPs cannot be listed; the controller must not
    /// start without one successful listing.
    pub async fn new(
        client: Client,
        allocator: Arc<AllocationClient>,
        options: ControllerOptions,
    ) -> Result<Self, AllocationError> {
        let cached = allocator.warm_cache().await?;
        info!(cached, "IP pool cache initialized");
        Ok(Self {
            client,
            allocator,
            options,
        })
    }

    /// Run the pipeline until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let queue = Arc::new(WorkQueue::new());
        let informer = ServiceInformer::new(QueueingEventHandler::new(Arc::clone(&queue)));
        let ctx = Context::new(
            Arc::new(informer.store()),
            Arc::clone(&self.allocator) as Arc<dyn Allocator>,
            Arc::new(KubeStatusWriter::new(self.client.clone())),
        );

        let mut tasks = JoinSet::new();
        let (synced_tx, mut synced_rx) = watch::channel(false);
        tasks.spawn(informer.run(
            Api::<Service>::all(self.client.clone()),
            self.options.resync_period,
            synced_tx,
            shutdown.clone(),
        ));

        info!("Waiting for Service cache to sync");
        let synced = tokio::select! {
            synced = flipped(&mut synced_rx) => synced,
            _ = flipped(&mut shutdown) => false,
        };
        if !synced {
            warn!("Controller stopped before the Service cache synced");
            queue.shut_down();
            drain(&mut tasks).await;
            return;
        }

        info!(workers = self.options.workers, "Service cache synced, starting workers");
        spawn_workers(
            &mut tasks,
            &queue,
            &ctx,
            self.options.workers,
            self.options.requeue_on_failure,
        );

        flipped(&mut shutdown).await;
        info!("Shutting down work queue");
        queue.shut_down();
        drain(&mut tasks).await;
        info!("Controller stopped");
    }
}

/// Start `workers` tasks pulling from `queue` until it shuts down.
pub fn spawn_workers(
    tasks: &mut JoinSet<()>,
    queue: &Arc<WorkQueue>,
    ctx: &Context,
    workers: usize,
    requeue_on_failure: bool,
) {
    for worker in 0..workers.max(1) {
        let queue = Arc::clone(queue);
        let ctx = ctx.clone();
        tasks.spawn(async move {
            debug!(worker, "Worker started");
            while process_next_item(&queue, &ctx, requeue_on_failure).await {}
            debug!(worker, "Worker stopped");
        });
    }
}

/// Take one key from `queue` and reconcile it.
///
/// Returns `false` once the queue has shut down and is empty.
pub async fn process_next_item(
    queue: &Arc<WorkQueue>,
    ctx: &Context,
    requeue_on_failure: bool,
) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };

    let start = Instant::now();
    match reconcile_key(ctx, &key).await {
        Ok(outcome) => {
            metrics::record_reconciliation_success(start.elapsed());
            queue.forget(&key);
            match outcome {
                ReconcileOutcome::Released => debug!(key = %key, "Service ip released"),
                ReconcileOutcome::Bound { ip, status_updated } => {
                    debug!(key = %key, ip = %ip, status_updated, "Service reconciled");
                }
            }
        }
        Err(e) => {
            metrics::record_reconciliation_error(e.error_type(), start.elapsed());
            error!(key = %key, error = %e, "handle service failed");
            if requeue_on_failure && !matches!(e, ReconcileError::InvalidKey(_)) {
                metrics::record_reconciliation_requeue();
                queue.add_rate_limited(key.clone());
            } else {
                queue.forget(&key);
            }
        }
    }
    queue.done(&key);
    true
}

async fn reconcile_key(ctx: &Context, key: &str) -> Result<ReconcileOutcome, ReconcileError> {
    let (namespace, name) = split_key(key)?;
    reconcile_service(ctx, &namespace, &name).await
}

/// Waits for `rx` to hold `true`; `false` if its sender went away first.
async fn flipped(rx: &mut watch::Receiver<bool>) -> bool {
    rx.wait_for(|value| *value).await.is_ok()
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Controller task failed");
        }
    }
}

/// Leader election hooks that run the controller while leading.
pub struct ControllerCallbacks {
    controller: Arc<LoadBalanceController>,
    identity: String,
}

impl ControllerCallbacks {
    #[must_use]
    pub fn new(controller: Arc<LoadBalanceController>, identity: &str) -> Self {
        Self {
            controller,
            identity: identity.to_string(),
        }
    }
}

#[async_trait]
impl LeaderCallbacks for ControllerCallbacks {
    async fn on_started_leading(&self, stop: watch::Receiver<bool>) {
        info!(identity = %self.identity, "Started leading, running controller");
        self.controller.run(stop).await;
    }

    fn on_stopped_leading(&self) {
        info!(identity = %self.identity, "Stopped leading");
    }

    fn on_new_leader(&self, identity: &str) {
        if identity == self.identity {
            return;
        }
        info!(leader = %identity, "new leader elected");
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
