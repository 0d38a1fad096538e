// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Service, ServiceSpec, ServiceStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use loadbalance_controller::config::{
    ControllerSettings, EndpointConfig, LeaderElectionSettings, LoadBalanceConfig,
};
use loadbalance_controller::errors::ClusterApiError;
use loadbalance_controller::reconcilers::StatusWriter;
use serde_json::json;
use std::sync::Mutex;
use wiremock::{MockServer, ResponseTemplate};

pub const BIND_PATH: &str = "/api/v1/loadbalance/bind";
pub const RELEASE_PATH: &str = "/api/v1/loadbalance/released";
pub const LIST_PATH: &str = "/api/v1/loadbalance/list";

/// Controller configuration pointing at the mock inventory service.
pub fn config_for(server: &MockServer) -> LoadBalanceConfig {
    let base = server.uri();
    LoadBalanceConfig {
        endpoints: EndpointConfig {
            bind: format!("{base}{BIND_PATH}"),
            released: format!("{base}{RELEASE_PATH}"),
            list: format!("{base}{LIST_PATH}"),
        },
        region: "cn-east-1".to_string(),
        leader_election: LeaderElectionSettings::default(),
        controller: ControllerSettings::default(),
    }
}

/// Successful inventory response carrying `data`.
pub fn ok_envelope(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "data": data,
        "code": 200,
        "message": "success"
    }))
}

pub fn free_records(ips: &[&str]) -> serde_json::Value {
    ips.iter()
        .map(|ip| json!({"cluster": "cn-east-1", "ip": ip, "status": 0}))
        .collect()
}

pub fn service(namespace: &str, name: &str, type_: &str, resource_version: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(type_.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn with_ingress(mut svc: Service, ip: &str) -> Service {
    svc.status = Some(ServiceStatus {
        load_balancer: Some(LoadBalancerStatus {
            ingress: Some(vec![LoadBalancerIngress {
                ip: Some(ip.to_string()),
                ..Default::default()
            }]),
        }),
        ..Default::default()
    });
    svc
}

/// Status writer that records `(namespace, name, ip)` instead of calling the API server.
#[derive(Default)]
pub struct RecordingStatusWriter {
    writes: Mutex<Vec<(String, String, String)>>,
}

impl RecordingStatusWriter {
    pub fn writes(&self) -> Vec<(String, String, String)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusWriter for RecordingStatusWriter {
    async fn update_ingress(&self, svc: &Service, ip: &str) -> Result<(), ClusterApiError> {
        self.writes.lock().unwrap().push((
            svc.namespace().unwrap_or_default(),
            svc.name_any(),
            ip.to_string(),
        ));
        Ok(())
    }
}
