// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the loadbalance controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Component Constants
// ============================================================================

/// Component name, used for the binary, the default lease name and log fields
pub const COMPONENT_NAME: &str = "loadbalance-controller";

/// Service type handled by this controller
pub const SERVICE_TYPE_LOAD_BALANCER: &str = "LoadBalancer";

/// Kind name for core `Service` objects
pub const KIND_SERVICE: &str = "Service";

// ============================================================================
// Inventory Service Constants
// ============================================================================

/// Envelope `code` the inventory service returns on success
pub const INVENTORY_SUCCESS_CODE: i64 = 200;

/// Allocation record status of a free IP
pub const ALLOCATION_STATUS_FREE: i32 = 0;

/// Allocation record status of a bound IP
pub const ALLOCATION_STATUS_BOUND: i32 = 1;

/// Query parameter used to list records by status
pub const LIST_STATUS_QUERY_PARAM: &str = "status";

// ============================================================================
// Controller Constants
// ============================================================================

/// Default number of reconciliation workers
pub const DEFAULT_WORKERS: usize = 1;

/// Default period between full resyncs of the Service cache (30 seconds)
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 30;

/// Default path of the controller configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

// ============================================================================
// Work Queue Rate Limiting Constants
// ============================================================================

/// Per-key backoff after the first failure (5 milliseconds)
pub const QUEUE_BASE_DELAY_MILLIS: u64 = 5;

/// Per-key backoff ceiling (1000 seconds)
pub const QUEUE_MAX_DELAY_SECS: u64 = 1000;

/// Overall requeue rate (items per second)
pub const QUEUE_BUCKET_QPS: f64 = 10.0;

/// Overall requeue burst size
pub const QUEUE_BUCKET_BURST: u32 = 100;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default lease name
pub const DEFAULT_LEASE_NAME: &str = "loadbalance-controller";

/// Default lease namespace
pub const DEFAULT_LEASE_NAMESPACE: &str = "kube-system";

/// Default leader election lease duration (60 seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 60;

/// Default leader election renew deadline (15 seconds)
pub const DEFAULT_LEASE_RENEW_DEADLINE_SECS: u64 = 15;

/// Default leader election retry period (5 seconds)
pub const DEFAULT_LEASE_RETRY_PERIOD_SECS: u64 = 5;

/// Jitter applied to the retry period while waiting for the lease
pub const LEASE_JITTER_FACTOR: f64 = 1.2;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path for the liveness endpoint
pub const HEALTH_SERVER_PATH: &str = "/healthz";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
