// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory mirror of free allocation records.
//!
//! The cache is filled wholesale once at startup and only shrinks afterwards,
//! as entries are popped to serve allocations while the inventory service is
//! unreachable. It is a fallback, never a source of truth.

use super::types::AllocationRecord;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Free allocation records keyed by IP.
#[derive(Debug, Default)]
pub struct IpPoolCache {
    entries: RwLock<HashMap<String, AllocationRecord>>,
}

impl IpPoolCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache with `records`, returning the new entry count.
    pub fn replace_all(&self, records: impl IntoIterator<Item = AllocationRecord>) -> usize {
        let fresh: HashMap<String, AllocationRecord> = records
            .into_iter()
            .map(|record| (record.ip.clone(), record))
            .collect();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        *entries = fresh;
        entries.len()
    }

    /// Remove and return an arbitrary entry.
    pub fn pop(&self) -> Option<AllocationRecord> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let ip = entries.keys().next().cloned()?;
        entries.remove(&ip)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached IPs in sorted order.
    #[must_use]
    pub fn ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ips.sort();
        ips
    }
}
