// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command line flags.

use crate::config::LoadBalanceConfig;
use crate::constants::{
    COMPONENT_NAME, DEFAULT_CONFIG_PATH, DEFAULT_WORKERS, METRICS_SERVER_BIND_ADDRESS,
    METRICS_SERVER_PORT,
};
use crate::controller::ControllerOptions;
use clap::builder::TypedValueParser as _;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = COMPONENT_NAME)]
#[command(about = "Assigns pooled virtual IPs to Kubernetes LoadBalancer Services")]
#[command(version)]
pub struct Options {
    /// Path to a kubeconfig file; in-cluster credentials are used when absent
    #[arg(long, value_name = "FILE")]
    pub kubeconfig: Option<PathBuf>,

    /// Path to the controller configuration file
    #[arg(long = "loadbalanceconfig", value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,

    /// Identity used in the leader election lease (defaults to the hostname)
    #[arg(long = "lease-lock", value_name = "IDENTITY")]
    pub lease_identity: Option<String>,

    /// Lease name, overrides `leaderElection.name`
    #[arg(long, value_name = "NAME")]
    pub lease_lock_name: Option<String>,

    /// Lease namespace, overrides `leaderElection.namespace`
    #[arg(long, value_name = "NAMESPACE")]
    pub lease_lock_namespace: Option<String>,

    /// Number of concurrent reconciliation workers
    #[arg(
        long,
        default_value_t = DEFAULT_WORKERS,
        value_parser = clap::value_parser!(u16).range(1..).map(usize::from)
    )]
    pub workers: usize,

    /// Port of the metrics and health server
    #[arg(long, default_value_t = METRICS_SERVER_PORT)]
    pub metrics_port: u16,

    /// Address the metrics and health server binds to
    #[arg(long, value_name = "ADDR", default_value = METRICS_SERVER_BIND_ADDRESS)]
    pub metrics_bind_address: IpAddr,
}

impl Options {
    /// Identity to compete under: the flag, then the hostname, then a random name.
    #[must_use]
    pub fn lease_identity(&self) -> String {
        if let Some(identity) = self.lease_identity.as_deref().filter(|i| !i.is_empty()) {
            return identity.to_string();
        }
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| format!("{COMPONENT_NAME}-{:08x}", rand::random::<u32>()))
    }

    /// Lease `(namespace, name)`, flags taking precedence over the file.
    #[must_use]
    pub fn lease_location(&self, config: &LoadBalanceConfig) -> (String, String) {
        let namespace = self
            .lease_lock_namespace
            .clone()
            .unwrap_or_else(|| config.leader_election.namespace.clone());
        let name = self
            .lease_lock_name
            .clone()
            .unwrap_or_else(|| config.leader_election.name.clone());
        (namespace, name)
    }

    #[must_use]
    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.metrics_bind_address, self.metrics_port)
    }

    #[must_use]
    pub fn controller_options(&self, config: &LoadBalanceConfig) -> ControllerOptions {
        ControllerOptions {
            workers: self.workers,
            resync_period: config.resync_period(),
            requeue_on_failure: config.controller.requeue_on_failure,
        }
    }
}
