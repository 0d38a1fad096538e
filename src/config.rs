// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration file.
//!
//! The controller reads a single YAML document naming the inventory service
//! endpoints, the region tag sent with every bind, and optional leader election
//! and controller tuning:
//!
//! ```yaml
//! region: cn-east-1
//! loadbalance:
//!   bind: http://inventory.infra.svc:8080/api/v1/loadbalance/bind
//!   released: http://inventory.infra.svc:8080/api/v1/loadbalance/released
//!   list: http://inventory.infra.svc:8080/api/v1/loadbalance/list
//! leaderElection:
//!   name: loadbalance-controller
//!   namespace: kube-system
//! controller:
//!   resyncPeriodSeconds: 30
//! ```

use crate::constants::{
    DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_NAME, DEFAULT_LEASE_NAMESPACE,
    DEFAULT_LEASE_RENEW_DEADLINE_SECS, DEFAULT_LEASE_RETRY_PERIOD_SECS, DEFAULT_RESYNC_PERIOD_SECS,
};
use crate::errors::ConfigError;
use crate::leader::LeaderElectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Top-level controller configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalanceConfig {
    /// Inventory service endpoints
    #[serde(rename = "loadbalance")]
    pub endpoints: EndpointConfig,

    /// Region/partition tag sent as `cluster` with every bind request
    #[serde(default)]
    pub region: String,

    /// Leader election lease naming and timing
    #[serde(default)]
    pub leader_election: LeaderElectionSettings,

    /// Reconciliation pipeline tuning
    #[serde(default)]
    pub controller: ControllerSettings,
}

/// Inventory service endpoint URLs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// `POST` endpoint binding an IP to a Service
    pub bind: String,
    /// `POST` endpoint releasing whatever IP a Service holds
    pub released: String,
    /// `GET` endpoint listing allocation records
    pub list: String,
}

/// Lease naming and timings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaderElectionSettings {
    pub name: String,
    pub namespace: String,
    pub lease_duration_seconds: u64,
    pub renew_deadline_seconds: u64,
    pub retry_period_seconds: u64,
}

impl Default for LeaderElectionSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_LEASE_NAME.to_string(),
            namespace: DEFAULT_LEASE_NAMESPACE.to_string(),
            lease_duration_seconds: DEFAULT_LEASE_DURATION_SECS,
            renew_deadline_seconds: DEFAULT_LEASE_RENEW_DEADLINE_SECS,
            retry_period_seconds: DEFAULT_LEASE_RETRY_PERIOD_SECS,
        }
    }
}

impl LeaderElectionSettings {
    /// Build the elector timing configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the timings violate
    /// `lease_duration > renew_deadline > retry_period * 1.2`.
    pub fn election_config(&self) -> Result<LeaderElectionConfig, ConfigError> {
        let config = LeaderElectionConfig {
            lease_duration: Duration::from_secs(self.lease_duration_seconds),
            renew_deadline: Duration::from_secs(self.renew_deadline_seconds),
            retry_period: Duration::from_secs(self.retry_period_seconds),
            release_on_cancel: true,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Reconciliation pipeline tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerSettings {
    /// Period between full resyncs of cached LoadBalancer Services
    pub resync_period_seconds: u64,
    /// Requeue failed keys with backoff instead of dropping them
    pub requeue_on_failure: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            resync_period_seconds: DEFAULT_RESYNC_PERIOD_SECS,
            requeue_on_failure: false,
        }
    }
}

impl LoadBalanceConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML or fails validation.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate endpoint URLs and leader election timings.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint("bind", &self.endpoints.bind)?;
        validate_endpoint("released", &self.endpoints.released)?;
        validate_endpoint("list", &self.endpoints.list)?;
        self.leader_election.election_config()?;
        Ok(())
    }

    /// Resync period as a [`Duration`].
    #[must_use]
    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.controller.resync_period_seconds)
    }
}

fn validate_endpoint(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        field,
        url: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
