// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process lease backend.
//!
//! Several [`InMemoryLeaseLock`]s created from one [`LeaseStore`] contend for
//! the same lease, which lets whole elections between simulated replicas run
//! inside one test. A replica can be partitioned from the store to simulate a
//! lost API server connection.

use super::lock::{LeaseLock, LeaseRecord};
use crate::errors::LeaseError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct StoreState {
    record: Option<LeaseRecord>,
    version: u64,
    partitioned: HashSet<String>,
}

/// Shared lease storage.
#[derive(Clone, Debug, Default)]
pub struct LeaseStore {
    name: String,
    state: Arc<Mutex<StoreState>>,
}

impl LeaseStore {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A lock handle competing as `identity`.
    #[must_use]
    pub fn lock(&self, identity: impl Into<String>) -> InMemoryLeaseLock {
        InMemoryLeaseLock {
            identity: identity.into(),
            store: self.clone(),
        }
    }

    /// Current stored record.
    #[must_use]
    pub fn record(&self) -> Option<LeaseRecord> {
        self.lock_state().record.clone()
    }

    /// Overwrite the stored record, bumping its version.
    pub fn put(&self, mut record: LeaseRecord) -> LeaseRecord {
        let mut state = self.lock_state();
        state.version += 1;
        record.resource_version = Some(state.version.to_string());
        state.record = Some(record.clone());
        record
    }

    /// Make every call from `identity` fail until [`LeaseStore::heal`].
    pub fn partition(&self, identity: &str) {
        self.lock_state().partitioned.insert(identity.to_string());
    }

    pub fn heal(&self, identity: &str) {
        self.lock_state().partitioned.remove(identity);
    }
}

/// [`LeaseLock`] over a [`LeaseStore`].
#[derive(Clone, Debug)]
pub struct InMemoryLeaseLock {
    identity: String,
    store: LeaseStore,
}

impl InMemoryLeaseLock {
    fn reachable(&self) -> Result<MutexGuard<'_, StoreState>, LeaseError> {
        let state = self.store.lock_state();
        if state.partitioned.contains(&self.identity) {
            return Err(LeaseError::Unavailable(format!(
                "{} cannot reach lease {}",
                self.identity, self.store.name
            )));
        }
        Ok(state)
    }

    fn conflict(&self) -> LeaseError {
        LeaseError::Conflict {
            name: self.store.name.clone(),
        }
    }
}

#[async_trait]
impl LeaseLock for InMemoryLeaseLock {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn describe(&self) -> String {
        format!("memory/{}", self.store.name)
    }

    async fn get(&self) -> Result<Option<LeaseRecord>, LeaseError> {
        Ok(self.reachable()?.record.clone())
    }

    async fn create(&self, record: &LeaseRecord) -> Result<LeaseRecord, LeaseError> {
        let mut state = self.reachable()?;
        if state.record.is_some() {
            return Err(self.conflict());
        }
        state.version += 1;
        let mut stored = record.clone();
        stored.resource_version = Some(state.version.to_string());
        state.record = Some(stored.clone());
        Ok(stored)
    }

    async fn update(&self, record: &LeaseRecord) -> Result<LeaseRecord, LeaseError> {
        let mut state = self.reachable()?;
        let current = state
            .record
            .as_ref()
            .and_then(|r| r.resource_version.clone());
        if current.is_none() || current != record.resource_version {
            return Err(self.conflict());
        }
        state.version += 1;
        let mut stored = record.clone();
        stored.resource_version = Some(state.version.to_string());
        state.record = Some(stored.clone());
        Ok(stored)
    }
}
