// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic for LoadBalancer Services.
//!
//! The controller follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - Service changes arrive through the informer as queue keys
//! 2. **Reconcile** - Compare the Service's desired IP with the inventory
//! 3. **Bind** - Ask the inventory service to bind (or release) the IP
//! 4. **Status** - Report the assigned IP in `status.loadBalancer.ingress`
//!
//! # Example: Using the Reconciler
//!
//! ```rust,no_run
//! use loadbalance_controller::context::Context;
//! use loadbalance_controller::reconcilers::reconcile_service;
//!
//! async fn reconcile(ctx: &Context) -> anyhow::Result<()> {
//!     let outcome = reconcile_service(ctx, "default", "web").await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod service;
pub mod status;

pub use service::{desired_ip, ingress_ip, reconcile_service, ReconcileOutcome};
pub use status::{KubeStatusWriter, StatusWriter};
