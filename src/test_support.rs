// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory fakes shared by the unit tests.

use crate::allocation::{AllocationRecord, Allocator};
use crate::constants::{ALLOCATION_STATUS_BOUND, ALLOCATION_STATUS_FREE};
use crate::context::{Context, ServiceLister};
use crate::errors::{AllocationError, ClusterApiError};
use crate::reconcilers::status::StatusWriter;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Service, ServiceSpec, ServiceStatus,
};
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// A LoadBalancer Service with no IP yet.
pub fn lb_service(namespace: &str, name: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn with_ingress(mut svc: Service, ip: &str) -> Service {
    svc.status = Some(ServiceStatus {
        load_balancer: Some(LoadBalancerStatus {
            ingress: Some(vec![LoadBalancerIngress {
                ip: Some(ip.to_string()),
                ..Default::default()
            }]),
        }),
        ..Default::default()
    });
    svc
}

pub fn with_requested_ip(mut svc: Service, ip: &str) -> Service {
    let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
    spec.load_balancer_ip = Some(ip.to_string());
    svc
}

/// Service cache keyed by `(namespace, name)`.
#[derive(Default)]
pub struct FakeLister {
    services: Mutex<HashMap<(String, String), Arc<Service>>>,
}

impl FakeLister {
    pub fn insert(&self, svc: Service) {
        let key = (svc.namespace().unwrap_or_default(), svc.name_any());
        self.services.lock().unwrap().insert(key, Arc::new(svc));
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.services
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }
}

impl ServiceLister for FakeLister {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Service>> {
        self.services
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

/// Records status writes; can be told to fail.
#[derive(Default)]
pub struct FakeStatusWriter {
    pub writes: Mutex<Vec<(String, String, String)>>,
    pub conflict: Mutex<bool>,
}

impl FakeStatusWriter {
    pub fn writes(&self) -> Vec<(String, String, String)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fail_with_conflict(&self) {
        *self.conflict.lock().unwrap() = true;
    }
}

#[async_trait]
impl StatusWriter for FakeStatusWriter {
    async fn update_ingress(&self, svc: &Service, ip: &str) -> Result<(), ClusterApiError> {
        let namespace = svc.namespace().unwrap_or_default();
        let name = svc.name_any();
        if *self.conflict.lock().unwrap() {
            return Err(ClusterApiError::Conflict {
                kind: "Service",
                namespace,
                name,
            });
        }
        self.writes
            .lock()
            .unwrap()
            .push((namespace, name, ip.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct InventoryState {
    records: BTreeMap<String, AllocationRecord>,
    calls: Vec<String>,
    down: bool,
}

/// Inventory service simulation that enforces the binding invariants.
///
/// - an IP is bound to at most one Service
/// - a Service holds at most one IP
/// - re-binding the IP a Service already holds succeeds
#[derive(Default)]
pub struct FakeInventory {
    state: Mutex<InventoryState>,
}

impl FakeInventory {
    pub fn with_free_ips(ips: &[&str]) -> Self {
        let inventory = Self::default();
        {
            let mut state = inventory.state.lock().unwrap();
            for ip in ips {
                state
                    .records
                    .insert((*ip).to_string(), AllocationRecord::free(*ip));
            }
        }
        inventory
    }

    /// Make every call fail with a transport-like rejection.
    pub fn set_down(&self, down: bool) {
        self.state.lock().unwrap().down = down;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn record(&self, ip: &str) -> Option<AllocationRecord> {
        self.state.lock().unwrap().records.get(ip).cloned()
    }

    /// IP held by `namespace/name`, if any.
    pub fn holder_ip(&self, namespace: &str, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .values()
            .find(|r| r.is_bound() && r.namespace == namespace && r.service_name == name)
            .map(|r| r.ip.clone())
    }

    pub fn all_consistent(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .records
            .values()
            .all(AllocationRecord::is_consistent)
    }

    fn rejected(operation: &'static str, message: &str) -> AllocationError {
        AllocationError::Rejected {
            operation,
            code: 500,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Allocator for FakeInventory {
    async fn bind(&self, name: &str, namespace: &str, ip: &str) -> Result<(), AllocationError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("bind {namespace}/{name} {ip}"));
        if state.down {
            return Err(Self::rejected("bind", "inventory down"));
        }

        let held_elsewhere = state.records.values().any(|r| {
            r.is_bound() && r.namespace == namespace && r.service_name == name && r.ip != ip
        });
        if held_elsewhere {
            return Err(Self::rejected("bind", "service already bound"));
        }

        let Some(record) = state.records.get_mut(ip) else {
            return Err(Self::rejected("bind", "record not found"));
        };
        if record.is_bound() {
            if record.namespace == namespace && record.service_name == name {
                return Ok(());
            }
            return Err(Self::rejected("bind", "ip has been bound"));
        }

        record.status = ALLOCATION_STATUS_BOUND;
        record.namespace = namespace.to_string();
        record.service_name = name.to_string();
        Ok(())
    }

    async fn release(&self, name: &str, namespace: &str) -> Result<(), AllocationError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("release {namespace}/{name}"));
        if state.down {
            return Err(Self::rejected("release", "inventory down"));
        }

        let record = state
            .records
            .values_mut()
            .find(|r| r.is_bound() && r.namespace == namespace && r.service_name == name);
        match record {
            Some(record) => {
                record.status = ALLOCATION_STATUS_FREE;
                record.namespace.clear();
                record.service_name.clear();
                Ok(())
            }
            None => Err(Self::rejected("release", "record not found")),
        }
    }

    async fn get_available_ip(&self) -> Result<String, AllocationError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list".to_string());
        if state.down {
            return Err(AllocationError::CacheExhausted);
        }
        state
            .records
            .values()
            .find(|r| r.is_free())
            .map(|r| r.ip.clone())
            .ok_or(AllocationError::NoAvailableIp)
    }
}

/// Context wired to the given fakes.
pub fn context(
    lister: &Arc<FakeLister>,
    inventory: &Arc<FakeInventory>,
    writer: &Arc<FakeStatusWriter>,
) -> Context {
    Context::new(
        Arc::clone(lister) as Arc<dyn ServiceLister>,
        Arc::clone(inventory) as Arc<dyn Allocator>,
        Arc::clone(writer) as Arc<dyn StatusWriter>,
    )
}
