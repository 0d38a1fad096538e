// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context handed to every reconcile worker.
//!
//! The reconciler only depends on three narrow seams:
//! - a read-only view of cached Services ([`ServiceLister`])
//! - the inventory service ([`Allocator`])
//! - Service status writes ([`StatusWriter`])
//!
//! Production wiring uses the informer's reflector store, the HTTP
//! [`crate::allocation::AllocationClient`] and
//! [`crate::reconcilers::status::KubeStatusWriter`]; tests
//! swap in in-memory fakes.

use crate::allocation::Allocator;
use crate::reconcilers::status::StatusWriter;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::reflector::{ObjectRef, Store};
use std::sync::Arc;

/// Read access to the local Service cache.
pub trait ServiceLister: Send + Sync {
    /// Look up a Service by namespace and name.
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Service>>;
}

impl ServiceLister for Store<Service> {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Service>> {
        let reference = if namespace.is_empty() {
            ObjectRef::new(name)
        } else {
            ObjectRef::new(name).within(namespace)
        };
        Store::get(self, &reference)
    }
}

/// Dependencies of a reconcile pass.
#[derive(Clone)]
pub struct Context {
    /// Cached Services, filled by the informer
    pub services: Arc<dyn ServiceLister>,

    /// Inventory service client
    pub allocator: Arc<dyn Allocator>,

    /// Writes Service status
    pub status_writer: Arc<dyn StatusWriter>,
}

impl Context {
    #[must_use]
    pub fn new(
        services: Arc<dyn ServiceLister>,
        allocator: Arc<dyn Allocator>,
        status_writer: Arc<dyn StatusWriter>,
    ) -> Self {
        Self {
            services,
            allocator,
            status_writer,
        }
    }
}
