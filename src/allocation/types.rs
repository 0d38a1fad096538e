// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Wire types exchanged with the inventory service.

use crate::constants::{ALLOCATION_STATUS_BOUND, ALLOCATION_STATUS_FREE};
use serde::{Deserialize, Serialize};

/// One pooled IP and its binding state, as tracked by the inventory service.
///
/// A bound record (`status = 1`) always names its owning Service; a free
/// record (`status = 0`) never does. See [`AllocationRecord::is_consistent`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AllocationRecord {
    /// Region/partition tag
    pub cluster: String,
    /// The pooled IP (unique key)
    pub ip: String,
    /// Carrier line count reported by the inventory
    pub carriers: i64,
    /// 0 = free, 1 = bound
    pub status: i32,
    /// Subnet the IP belongs to
    pub cidr: String,
    /// Owning Service namespace, empty when free
    pub namespace: String,
    /// Owning Service name, empty when free
    pub service_name: String,
}

impl AllocationRecord {
    /// Build a free record for `ip`.
    #[must_use]
    pub fn free(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            status: ALLOCATION_STATUS_FREE,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.status == ALLOCATION_STATUS_FREE
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.status == ALLOCATION_STATUS_BOUND
    }

    /// `status == 1` iff both owner fields are set, `status == 0` iff both are empty.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let owned = !self.namespace.is_empty() && !self.service_name.is_empty();
        let unowned = self.namespace.is_empty() && self.service_name.is_empty();
        (self.is_bound() && owned) || (self.is_free() && unowned)
    }
}

/// Response envelope shared by every inventory endpoint.
///
/// `data` is kept untyped and decoded per endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Envelope {
    pub data: serde_json::Value,
    pub code: i64,
    pub message: String,
}

/// Body of a bind request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindRequest {
    pub cluster: String,
    pub ip: String,
    pub namespace: String,
    pub service_name: String,
}

/// Body of a release request. The backend resolves the IP from the owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub namespace: String,
    pub service_name: String,
}
