// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! LoadBalancer Service reconciliation.
//!
//! One pass converges a single Service with the inventory service:
//!
//! 1. Service gone from the cache: release whatever it held, done.
//! 2. Pick the desired IP: the reported ingress IP, overridden by
//!    `spec.loadBalancerIP` when set, else a fresh IP from the inventory.
//! 3. Bind the desired IP to the Service. The inventory decides; a rejection
//!    aborts the pass.
//! 4. Write the IP to `status.loadBalancer.ingress` unless it is already there.
//!
//! Every failure is returned to the worker, which logs it. A status write
//! failure after a successful bind leaves the inventory ahead of the cluster:
//! the Service still reports no ingress IP, so the next pass picks another
//! free IP and the inventory rejects that bind because the Service already
//! holds one. The Service stays unpublished until its status is repaired or
//! it is recreated.

use crate::context::Context;
use crate::errors::{AllocationError, ReconcileError};
use k8s_openapi::api::core::v1::Service;
use tracing::{debug, info};

const OP_RELEASE: &str = "release";
const OP_ALLOCATE: &str = "allocate";
const OP_BIND: &str = "bind";

/// What a successful pass did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The Service no longer exists and its IP was released.
    Released,
    /// The Service holds `ip`; `status_updated` is false when the status
    /// already carried it.
    Bound { ip: String, status_updated: bool },
}

/// IP currently reported in `status.loadBalancer.ingress[0].ip`.
#[must_use]
pub fn ingress_ip(svc: &Service) -> Option<String> {
    svc.status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
        .and_then(|entry| entry.ip.clone())
        .filter(|ip| !ip.is_empty())
}

/// IP the Service should hold, if it already names one.
///
/// `spec.loadBalancerIP` wins over the reported ingress IP.
#[must_use]
pub fn desired_ip(svc: &Service) -> Option<String> {
    let requested = svc
        .spec
        .as_ref()
        .and_then(|spec| spec.load_balancer_ip.clone())
        .filter(|ip| !ip.is_empty());
    requested.or_else(|| ingress_ip(svc))
}

/// Reconcile the Service `namespace/name`.
///
/// # Errors
///
/// Returns an error if the release, allocation, bind or status write fails.
pub async fn reconcile_service(
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<ReconcileOutcome, ReconcileError> {
    let allocation_error = |operation: &'static str| {
        move |source: AllocationError| ReconcileError::Allocation {
            operation,
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        }
    };

    let Some(svc) = ctx.services.get(namespace, name) else {
        debug!(namespace, name, "Service not found, releasing its ip");
        ctx.allocator
            .release(name, namespace)
            .await
            .map_err(allocation_error(OP_RELEASE))?;
        return Ok(ReconcileOutcome::Released);
    };

    let current = ingress_ip(&svc);
    let ip = match desired_ip(&svc) {
        Some(ip) => ip,
        None => ctx
            .allocator
            .get_available_ip()
            .await
            .map_err(allocation_error(OP_ALLOCATE))?,
    };

    ctx.allocator
        .bind(name, namespace, &ip)
        .await
        .map_err(allocation_error(OP_BIND))?;

    if current.as_deref() == Some(ip.as_str()) {
        debug!(namespace, name, ip = %ip, "Service status already up to date");
        return Ok(ReconcileOutcome::Bound {
            ip,
            status_updated: false,
        });
    }

    ctx.status_writer
        .update_ingress(&svc, &ip)
        .await
        .map_err(|source| ReconcileError::StatusUpdate {
            namespace: namespace.to_string(),
            name: name.to_string(),
            ip: ip.clone(),
            source,
        })?;

    info!(ip = %ip, name, namespace, "ip bound by service");
    Ok(ReconcileOutcome::Bound {
        ip,
        status_updated: true,
    })
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;
