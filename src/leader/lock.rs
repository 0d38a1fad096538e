// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Lease record and the storage seam behind leader election.

use crate::errors::LeaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Backend-neutral view of the election lease.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeaseRecord {
    /// Current holder; empty when the lease was released
    pub holder_identity: String,
    /// How long the holder's claim lasts after each renewal
    pub lease_duration_seconds: i32,
    /// When the current holder first acquired the lease
    pub acquire_time: Option<DateTime<Utc>>,
    /// When the current holder last renewed the lease
    pub renew_time: Option<DateTime<Utc>>,
    /// Number of times the lease changed hands
    pub leader_transitions: i32,
    /// Optimistic concurrency token assigned by the backend
    pub resource_version: Option<String>,
}

impl LeaseRecord {
    #[must_use]
    pub fn is_held(&self) -> bool {
        !self.holder_identity.is_empty()
    }

    #[must_use]
    pub fn is_held_by(&self, identity: &str) -> bool {
        self.is_held() && self.holder_identity == identity
    }
}

/// Storage for the election lease with compare-and-swap updates.
///
/// Implementations must reject an [`LeaseLock::update`] whose
/// `resource_version` is not the stored one, and a [`LeaseLock::create`] when
/// the lease already exists, with [`LeaseError::Conflict`].
#[async_trait]
pub trait LeaseLock: Send + Sync {
    /// Identity this replica competes under.
    fn identity(&self) -> &str;

    /// Human readable lease location for logs.
    fn describe(&self) -> String;

    /// Read the lease, `None` if it does not exist yet.
    async fn get(&self) -> Result<Option<LeaseRecord>, LeaseError>;

    /// Create the lease; returns the stored record.
    async fn create(&self, record: &LeaseRecord) -> Result<LeaseRecord, LeaseError>;

    /// Replace the lease if `record.resource_version` is current; returns the stored record.
    async fn update(&self, record: &LeaseRecord) -> Result<LeaseRecord, LeaseError>;
}
