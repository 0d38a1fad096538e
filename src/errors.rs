// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the loadbalance controller.
//!
//! This module provides specialized error types for:
//! - Inventory service HTTP operations (list, bind, release)
//! - Kubernetes API writes (Service status, leader election leases)
//! - Reconciliation of a single Service key
//! - Controller configuration loading
//!
//! Every error exposes an `error_type()` label so failures can be counted by
//! category in metrics without parsing error strings.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while talking to the external inventory service.
#[derive(Error, Debug)]
pub enum AllocationError {
    /// The request never produced an HTTP response (connection refused, DNS, TLS, ...)
    #[error("failed to send {operation} request to {url}: {source}")]
    Transport {
        /// Inventory operation (`list`, `bind`, `release`)
        operation: &'static str,
        /// Endpoint that was called
        url: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// The response was not a decodable envelope and carried a non-success HTTP status
    #[error("{operation} request to {url} returned HTTP {status}")]
    HttpStatus {
        /// Inventory operation
        operation: &'static str,
        /// Endpoint that was called
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The response body could not be decoded
    #[error("failed to decode {operation} response from {url}: {reason}")]
    Decode {
        /// Inventory operation
        operation: &'static str,
        /// Endpoint that was called
        url: String,
        /// Decoder error message
        reason: String,
    },

    /// The envelope carried a non-200 `code`; `message` is the backend's explanation
    #[error("{message}")]
    Rejected {
        /// Inventory operation
        operation: &'static str,
        /// Envelope code
        code: i64,
        /// Envelope message
        message: String,
    },

    /// The backend answered authoritatively that no IP is free
    #[error("no available ip")]
    NoAvailableIp,

    /// The backend was unreachable and the local fallback pool is empty
    #[error("no available ip by cache")]
    CacheExhausted,

    /// A configured endpoint is not a usable URL
    #[error("invalid {operation} endpoint {url}: {reason}")]
    InvalidEndpoint {
        /// Inventory operation the endpoint belongs to
        operation: &'static str,
        /// Offending URL
        url: String,
        /// Parser error message
        reason: String,
    },
}

impl AllocationError {
    /// Metrics label for this error.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "network_error",
            Self::HttpStatus { .. } => "http_error",
            Self::Decode { .. } => "decode_error",
            Self::Rejected { .. } => "backend_rejected",
            Self::NoAvailableIp => "no_available_ip",
            Self::CacheExhausted => "cache_exhausted",
            Self::InvalidEndpoint { .. } => "config_error",
        }
    }
}

/// Errors returned by Kubernetes API writes performed by the controller.
#[derive(Error, Debug)]
pub enum ClusterApiError {
    /// The object changed since it was read (HTTP 409)
    #[error("{kind} {namespace}/{name} was modified concurrently")]
    Conflict {
        /// Object kind
        kind: &'static str,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// Any other Kubernetes API error
    #[error(transparent)]
    Kube(#[from] kube::Error),
}

/// Errors returned by a [`crate::leader::LeaseLock`] backend.
#[derive(Error, Debug)]
pub enum LeaseError {
    /// Optimistic concurrency check failed, another replica wrote the lease first
    #[error("lease {name} was modified concurrently")]
    Conflict {
        /// Lease name
        name: String,
    },

    /// The lease backend could not be reached
    #[error("lease backend unavailable: {0}")]
    Unavailable(String),

    /// The lease object exists but is not usable
    #[error("lease {name} is malformed: {reason}")]
    Malformed {
        /// Lease name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Any other Kubernetes API error
    #[error(transparent)]
    Kube(#[from] kube::Error),
}

/// Errors raised while constructing or running the leader elector.
#[derive(Error, Debug)]
pub enum LeaderElectionError {
    /// Lease timings do not satisfy `lease_duration > renew_deadline > retry_period * 1.2`
    #[error("invalid leader election timing: {0}")]
    InvalidTiming(String),

    /// The identity is empty
    #[error("leader election identity must not be empty")]
    EmptyIdentity,
}

/// Errors that abort a single reconciliation pass.
///
/// None of these crash the process: the worker logs them with the Service
/// identity and moves on to the next key.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The queued key is not a `namespace/name` pair
    #[error("invalid reconciliation key {0:?}")]
    InvalidKey(String),

    /// An inventory call failed
    #[error("failed to {operation} service {namespace}/{name}: {source}")]
    Allocation {
        /// Operation being performed (`release`, `allocate`, `bind`)
        operation: &'static str,
        /// Service namespace
        namespace: String,
        /// Service name
        name: String,
        /// Backend error
        #[source]
        source: AllocationError,
    },

    /// The status write failed after the bind already succeeded on the backend
    #[error("update service {name} namespace: {namespace} ip: {ip} error: {source}")]
    StatusUpdate {
        /// Service namespace
        namespace: String,
        /// Service name
        name: String,
        /// IP that was bound
        ip: String,
        /// Kubernetes API error
        #[source]
        source: ClusterApiError,
    },
}

impl ReconcileError {
    /// Metrics label for this error.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "invalid_key",
            Self::Allocation { source, .. } => source.error_type(),
            Self::StatusUpdate { .. } => "status_update_error",
        }
    }
}

/// Errors that can occur while loading the controller configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid YAML for the expected schema
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An inventory endpoint is not an absolute http(s) URL
    #[error("invalid loadbalance.{field} endpoint {url:?}: {reason}")]
    InvalidEndpoint {
        /// Config field (`bind`, `released`, `list`)
        field: &'static str,
        /// Offending value
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Leader election timings are inconsistent
    #[error(transparent)]
    LeaderElection(#[from] LeaderElectionError),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
