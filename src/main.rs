// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use loadbalance_controller::{
    allocation::AllocationClient,
    config::LoadBalanceConfig,
    constants::{COMPONENT_NAME, TOKIO_WORKER_THREADS},
    controller::{ControllerCallbacks, LoadBalanceController},
    leader::{KubeLeaseLock, LeaderElector, StopReason},
    metrics,
    options::Options,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let options = Options::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name(COMPONENT_NAME)
        .enable_all()
        .build()?;

    let reason = runtime.block_on(async_main(options))?;
    if reason == StopReason::LeaseLost {
        // Another replica may already be reconciling; exit before touching anything else.
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging() {
    // Format: timestamp file:line LEVEL message
    //
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Respects RUST_LOG_FORMAT environment variable for output format (json or text)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(options: Options) -> Result<StopReason> {
    init_logging();
    info!("Starting LoadBalancer IP controller");

    let config = LoadBalanceConfig::load(&options.config_path).with_context(|| {
        format!(
            "failed to load controller configuration from {}",
            options.config_path.display()
        )
    })?;
    debug!(region = %config.region, "Controller configuration loaded");

    let client = kube_client(options.kubeconfig.as_deref()).await?;
    debug!("Kubernetes client initialized successfully");

    let allocator = Arc::new(AllocationClient::new(&config)?);
    let controller = Arc::new(
        LoadBalanceController::new(
            client.clone(),
            allocator,
            options.controller_options(&config),
        )
        .await
        .context("failed to initialize the IP pool cache")?,
    );

    let metrics_addr = options.metrics_addr();
    tokio::spawn(async move {
        if let Err(e) = metrics::serve_metrics(metrics_addr).await {
            error!(addr = %metrics_addr, error = %e, "Metrics server failed");
        }
    });
    info!(addr = %metrics_addr, "Metrics server started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(signal) => info!(signal, "Received shutdown signal, stopping"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signals, stopping"),
        }
        shutdown_tx.send_replace(true);
    });

    let identity = options.lease_identity();
    let (lease_namespace, lease_name) = options.lease_location(&config);
    let lock = KubeLeaseLock::new(client, &lease_namespace, &lease_name, &identity);
    let elector = LeaderElector::new(lock, config.leader_election.election_config()?)?;
    let callbacks = ControllerCallbacks::new(controller, &identity);

    let reason = elector.run(&callbacks, shutdown_rx).await;
    match reason {
        StopReason::LeaseLost => error!(identity = %identity, "Leader election lost, exiting"),
        StopReason::Shutdown => info!("Controller shut down cleanly"),
        StopReason::Finished => info!("Controller finished"),
    }
    Ok(reason)
}

async fn kube_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let Some(path) = kubeconfig.filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(Client::try_default().await?);
    };
    let file = Kubeconfig::read_from(path)
        .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
    let options = KubeConfigOptions::default();
    let config = kube::Config::from_custom_kubeconfig(file, &options).await?;
    Ok(Client::try_from(config)?)
}

/// Resolves with the name of the first SIGINT or SIGTERM received.
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT")
            }
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT")
    }
}
