// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service watch and notification dispatch.
//!
//! [`ServiceInformer`] keeps a local cache of every Service in the cluster
//! (a kube reflector store) and turns raw watch events into add, update and
//! delete notifications for a [`ServiceEventHandler`]:
//!
//! - `Apply` of an unknown Service is an **add**, of a cached one an **update**
//! - `Delete` is a **delete** carrying the final object
//! - A relist (initial list, or after the watch reconnects) is buffered until
//!   it completes; Services that vanished during the gap are delivered as
//!   **delete** notifications carrying a [`Tombstone`]
//! - Every resync period, every cached Service is re-announced as an **add**
//!
//! [`QueueingEventHandler`] is the production handler: it filters to
//! LoadBalancer Services and pushes their keys onto the [`WorkQueue`].

use crate::constants::{KIND_SERVICE, SERVICE_TYPE_LOAD_BALANCER};
use crate::errors::ReconcileError;
use crate::workqueue::WorkQueue;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube::runtime::watcher::{self, watcher};
use kube::runtime::WatchStreamExt;
use kube::{Api, ResourceExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Cache key of a Service: `namespace/name`, or `name` when it has no namespace.
#[must_use]
pub fn service_key(svc: &Service) -> String {
    let name = svc.name_any();
    match svc.namespace() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name,
    }
}

/// Split a cache key into `(namespace, name)`.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidKey`] for an empty name or more than one `/`.
pub fn split_key(key: &str) -> Result<(String, String), ReconcileError> {
    let invalid = || ReconcileError::InvalidKey(key.to_string());
    let (namespace, name) = match key.split_once('/') {
        Some((ns, name)) => (ns, name),
        None => ("", key),
    };
    if name.is_empty() || name.contains('/') {
        return Err(invalid());
    }
    Ok((namespace.to_string(), name.to_string()))
}

#[must_use]
pub fn is_load_balancer(svc: &Service) -> bool {
    svc.spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        .is_some_and(|t| t == SERVICE_TYPE_LOAD_BALANCER)
}

/// Last known state of an object whose deletion was not observed directly.
#[derive(Clone, Debug, PartialEq)]
pub struct Tombstone {
    pub key: String,
    pub object: serde_json::Value,
}

impl Tombstone {
    /// Unwrap the Service inside the tombstone.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the wrapped object is not a
    /// Service or does not decode as one.
    pub fn service(&self) -> Result<Service, String> {
        let kind = self.object.get("kind").and_then(serde_json::Value::as_str);
        if kind != Some(KIND_SERVICE) {
            return Err(format!(
                "tombstone contained object of kind {}",
                kind.unwrap_or("<none>")
            ));
        }
        serde_json::from_value(self.object.clone()).map_err(|e| e.to_string())
    }
}

/// Payload of a delete notification.
#[derive(Clone, Debug)]
pub enum DeletedObject {
    /// The final state of the deleted Service.
    Service(Service),
    /// Placeholder for a Service whose deletion happened while unobserved.
    Tombstone(Tombstone),
    /// Anything else; logged and dropped.
    Unknown(serde_json::Value),
}

/// Receives Service notifications.
pub trait ServiceEventHandler: Send + Sync {
    fn on_add(&self, svc: &Service);
    fn on_update(&self, old: &Service, new: &Service);
    fn on_delete(&self, deleted: DeletedObject);
}

/// Pushes keys of LoadBalancer Services onto the work queue.
///
/// Never calls the inventory service or the cluster API.
#[derive(Clone, Debug)]
pub struct QueueingEventHandler {
    queue: Arc<WorkQueue>,
}

impl QueueingEventHandler {
    #[must_use]
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }
}

impl ServiceEventHandler for QueueingEventHandler {
    fn on_add(&self, svc: &Service) {
        if !is_load_balancer(svc) {
            return;
        }
        let key = service_key(svc);
        debug!(key = %key, "Enqueueing LoadBalancer Service");
        self.queue.add(key);
    }

    fn on_update(&self, old: &Service, new: &Service) {
        if old.resource_version() == new.resource_version() {
            return;
        }
        self.on_add(new);
    }

    fn on_delete(&self, deleted: DeletedObject) {
        match deleted {
            DeletedObject::Service(svc) => self.on_add(&svc),
            DeletedObject::Tombstone(tombstone) => match tombstone.service() {
                Ok(svc) => self.on_add(&svc),
                Err(reason) => {
                    error!(
                        key = %tombstone.key,
                        reason = %reason,
                        "Tombstone contained object that is not a Service"
                    );
                }
            },
            DeletedObject::Unknown(object) => {
                error!(object = %object, "Couldn't get object from tombstone");
            }
        }
    }
}

/// Local Service cache plus notification dispatch.
pub struct ServiceInformer<H> {
    store: Store<Service>,
    writer: Writer<Service>,
    handler: H,
    relist: Option<HashMap<String, Service>>,
}

impl<H: ServiceEventHandler> ServiceInformer<H> {
    #[must_use]
    pub fn new(handler: H) -> Self {
        let (store, writer) = reflector::store::<Service>();
        Self {
            store,
            writer,
            handler,
            relist: None,
        }
    }

    /// Read handle on the local cache.
    #[must_use]
    pub fn store(&self) -> Store<Service> {
        self.store.clone()
    }

    /// Apply one watch event to the cache and notify the handler.
    pub fn handle_event(&mut self, event: watcher::Event<Service>) {
        match event {
            watcher::Event::Apply(svc) => {
                let old = self.store.get(&ObjectRef::from_obj(&svc));
                self.writer
                    .apply_watcher_event(&watcher::Event::Apply(svc.clone()));
                match old {
                    Some(old) => self.handler.on_update(&old, &svc),
                    None => self.handler.on_add(&svc),
                }
            }
            watcher::Event::Delete(svc) => {
                self.writer
                    .apply_watcher_event(&watcher::Event::Delete(svc.clone()));
                self.handler.on_delete(DeletedObject::Service(svc));
            }
            watcher::Event::Init => {
                debug!("Service relist started");
                self.relist = Some(HashMap::new());
                self.writer.apply_watcher_event(&watcher::Event::Init);
            }
            watcher::Event::InitApply(svc) => {
                self.writer
                    .apply_watcher_event(&watcher::Event::InitApply(svc.clone()));
                self.relist
                    .get_or_insert_with(HashMap::new)
                    .insert(service_key(&svc), svc);
            }
            watcher::Event::InitDone => {
                let previous: HashMap<String, Arc<Service>> = self
                    .store
                    .state()
                    .into_iter()
                    .map(|svc| (service_key(&svc), svc))
                    .collect();
                self.writer.apply_watcher_event(&watcher::Event::InitDone);

                let listed = self.relist.take().unwrap_or_default();
                debug!(count = listed.len(), "Service relist complete");

                for (key, svc) in &listed {
                    match previous.get(key) {
                        Some(old) => self.handler.on_update(old, svc),
                        None => self.handler.on_add(svc),
                    }
                }
                for (key, old) in previous {
                    if listed.contains_key(&key) {
                        continue;
                    }
                    match serde_json::to_value(old.as_ref()) {
                        Ok(object) => self
                            .handler
                            .on_delete(DeletedObject::Tombstone(Tombstone { key, object })),
                        Err(e) => warn!(key = %key, error = %e, "Failed to encode deleted Service"),
                    }
                }
            }
        }
    }

    /// Re-announce every cached Service as an add.
    pub fn resync(&self) {
        let services = self.store.state();
        debug!(count = services.len(), "Resyncing cached Services");
        for svc in services {
            self.handler.on_add(&svc);
        }
    }

    /// Watch Services until `shutdown` fires.
    ///
    /// `synced` is set to `true` after the first complete listing. A zero
    /// `resync_period` disables periodic resync.
    pub async fn run(
        mut self,
        api: Api<Service>,
        resync_period: Duration,
        synced: watch::Sender<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let stream = watcher(api, watcher::Config::default()).default_backoff();
        let mut stream = std::pin::pin!(stream);

        let mut resync = (!resync_period.is_zero()).then(|| {
            let mut interval =
                tokio::time::interval_at(Instant::now() + resync_period, resync_period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        info!(resync_secs = resync_period.as_secs(), "Service informer started");

        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        let init_done = matches!(event, watcher::Event::InitDone);
                        self.handle_event(event);
                        if init_done {
                            synced.send_replace(true);
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "Service watch error, will retry"),
                    None => break,
                },
                () = tick(&mut resync) => self.resync(),
            }
        }

        info!("Service informer stopped");
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "event_source_tests.rs"]
mod event_source_tests;
