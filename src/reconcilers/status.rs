// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service status writes.
//!
//! The controller only ever writes one thing: `status.loadBalancer.ingress`
//! holding a single `{ip}` entry. The write is a JSON merge patch against the
//! status subresource that carries the Service's `resourceVersion`, so the API
//! server rejects it with a conflict if the Service changed since it was read.

use crate::constants::KIND_SERVICE;
use crate::errors::ClusterApiError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Writes the assigned IP back to a Service.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Replace the Service's load balancer ingress with exactly one entry for `ip`.
    async fn update_ingress(&self, svc: &Service, ip: &str) -> Result<(), ClusterApiError>;
}

/// [`StatusWriter`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Merge patch setting a single ingress entry, guarded by `resourceVersion`.
#[must_use]
pub fn ingress_patch(resource_version: Option<&str>, ip: &str) -> serde_json::Value {
    let mut patch = json!({
        "status": {
            "loadBalancer": {
                "ingress": [{ "ip": ip }]
            }
        }
    });
    if let Some(rv) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": rv });
    }
    patch
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn update_ingress(&self, svc: &Service, ip: &str) -> Result<(), ClusterApiError> {
        let namespace = svc.namespace().unwrap_or_default();
        let name = svc.name_any();
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);

        let patch = ingress_patch(svc.metadata.resource_version.as_deref(), ip);
        debug!(namespace = %namespace, name = %name, ip, "Patching Service status");

        match api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(ClusterApiError::Conflict {
                kind: KIND_SERVICE,
                namespace,
                name,
            }),
            Err(e) => Err(e.into()),
        }
    }
}
