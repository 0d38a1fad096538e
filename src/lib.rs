// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # loadbalance-controller - pooled IPs for Kubernetes LoadBalancer Services
//!
//! A Kubernetes controller that gives every Service of type `LoadBalancer` a
//! virtual IP taken from an external inventory service, and releases it when
//! the Service is deleted.
//!
//! ## Overview
//!
//! - Watches Services and queues the key of every LoadBalancer Service that changed
//! - Binds the requested (or a free) IP through the inventory HTTP API
//! - Publishes the bound IP in `status.loadBalancer.ingress`
//! - Runs on the elected leader only, using a `coordination.k8s.io` Lease
//!
//! ## Modules
//!
//! - [`event_source`] - Service informer and the handler that feeds the queue
//! - [`workqueue`] - Deduplicating, rate-limited work queue
//! - [`reconcilers`] - Reconciliation logic and status writes
//! - [`allocation`] - Inventory service client and the IP pool cache
//! - [`leader`] - Lease-based leader election
//! - [`controller`] - The pipeline tying the pieces together
//!
//! ## Example
//!
//! ```rust,no_run
//! use loadbalance_controller::config::LoadBalanceConfig;
//!
//! let config = LoadBalanceConfig::from_yaml(
//!     r"
//! region: cn-east-1
//! loadbalance:
//!   bind: http://inventory:8080/bind
//!   released: http://inventory:8080/released
//!   list: http://inventory:8080/list
//! ",
//! )
//! .unwrap();
//! assert_eq!(config.leader_election.namespace, "kube-system");
//! ```

pub mod allocation;
pub mod config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod errors;
pub mod event_source;
pub mod leader;
pub mod metrics;
pub mod options;
pub mod reconcilers;
pub mod workqueue;

#[cfg(test)]
pub(crate) mod test_support;
