// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `coordination.k8s.io/v1` Lease backend.

use super::lock::{LeaseLock, LeaseRecord};
use crate::errors::LeaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use k8s_openapi::jiff::Timestamp;
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::debug;

/// Leader election lock stored in a Kubernetes `Lease` object.
pub struct KubeLeaseLock {
    api: Api<Lease>,
    name: String,
    namespace: String,
    identity: String,
}

impl KubeLeaseLock {
    #[must_use]
    pub fn new(client: Client, namespace: &str, name: &str, identity: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
        }
    }

    fn map_error(&self, err: kube::Error) -> LeaseError {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => LeaseError::Conflict {
                name: self.name.clone(),
            },
            other => LeaseError::Kube(other),
        }
    }

    fn to_lease(&self, record: &LeaseRecord) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                resource_version: record.resource_version.clone(),
                ..Default::default()
            },
            spec: Some(to_spec(record)),
        }
    }

    fn from_lease(&self, lease: Lease) -> Result<LeaseRecord, LeaseError> {
        let Some(resource_version) = lease.metadata.resource_version else {
            return Err(LeaseError::Malformed {
                name: self.name.clone(),
                reason: "missing resourceVersion".to_string(),
            });
        };
        let mut record = lease.spec.map(from_spec).unwrap_or_default();
        record.resource_version = Some(resource_version);
        Ok(record)
    }
}

/// Lease spec carrying the fields of `record`.
#[must_use]
pub fn to_spec(record: &LeaseRecord) -> LeaseSpec {
    LeaseSpec {
        holder_identity: Some(record.holder_identity.clone()),
        lease_duration_seconds: Some(record.lease_duration_seconds),
        acquire_time: record.acquire_time.and_then(to_micro_time),
        renew_time: record.renew_time.and_then(to_micro_time),
        lease_transitions: Some(record.leader_transitions),
        ..Default::default()
    }
}

/// Record view of a lease spec. Missing fields read as zero or empty.
#[must_use]
pub fn from_spec(spec: LeaseSpec) -> LeaseRecord {
    LeaseRecord {
        holder_identity: spec.holder_identity.unwrap_or_default(),
        lease_duration_seconds: spec.lease_duration_seconds.unwrap_or_default(),
        acquire_time: spec.acquire_time.and_then(from_micro_time),
        renew_time: spec.renew_time.and_then(from_micro_time),
        leader_transitions: spec.lease_transitions.unwrap_or_default(),
        resource_version: None,
    }
}

// Out-of-range instants read as unset.
fn to_micro_time(time: DateTime<Utc>) -> Option<MicroTime> {
    Timestamp::from_microsecond(time.timestamp_micros())
        .ok()
        .map(MicroTime)
}

fn from_micro_time(time: MicroTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(time.0.as_microsecond())
}

#[async_trait]
impl LeaseLock for KubeLeaseLock {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    async fn get(&self) -> Result<Option<LeaseRecord>, LeaseError> {
        match self.api.get_opt(&self.name).await {
            Ok(Some(lease)) => self.from_lease(lease).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(self.map_error(e)),
        }
    }

    async fn create(&self, record: &LeaseRecord) -> Result<LeaseRecord, LeaseError> {
        let mut lease = self.to_lease(record);
        lease.metadata.resource_version = None;
        debug!(lease = %self.describe(), holder = %record.holder_identity, "creating lease");
        let created = self
            .api
            .create(&PostParams::default(), &lease)
            .await
            .map_err(|e| self.map_error(e))?;
        self.from_lease(created)
    }

    async fn update(&self, record: &LeaseRecord) -> Result<LeaseRecord, LeaseError> {
        let lease = self.to_lease(record);
        let replaced = self
            .api
            .replace(&self.name, &PostParams::default(), &lease)
            .await
            .map_err(|e| self.map_error(e))?;
        self.from_lease(replaced)
    }
}
