// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Client for the external IP inventory service.
//!
//! This module is the only place that talks to the inventory service. It handles:
//!
//! - Listing free allocation records (`GET list?status=0`)
//! - Binding an IP to a Service (`POST bind`)
//! - Releasing whatever IP a Service holds (`POST released`)
//! - Choosing an IP for a Service that has none
//! - Keeping the [`IpPoolCache`] fallback warm
//!
//! # Architecture
//!
//! Every endpoint answers with the same JSON envelope `{data, code, message}`.
//! A call succeeds only when `code == 200`; anything else becomes an
//! [`AllocationError::Rejected`] carrying the backend's message. Responses are
//! authoritative: the controller never assumes it owns an IP exclusively, and
//! a rejected bind is surfaced to the caller rather than retried.
//!
//! # Example
//!
//! ```rust,no_run
//! use loadbalance_controller::allocation::AllocationClient;
//! use loadbalance_controller::config::LoadBalanceConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = LoadBalanceConfig::load("config.yml")?;
//! let client = AllocationClient::new(&config)?;
//! client.warm_cache().await?;
//!
//! let ip = client.get_available_ip().await?;
//! client.bind("web", "default", &ip).await?;
//! # Ok(())
//! # }
//! ```

pub mod pool_cache;
pub mod types;

pub use pool_cache::IpPoolCache;
pub use types::{AllocationRecord, BindRequest, Envelope, ReleaseRequest};

use crate::config::LoadBalanceConfig;
use crate::constants::{ALLOCATION_STATUS_FREE, INVENTORY_SUCCESS_CODE, LIST_STATUS_QUERY_PARAM};
use crate::errors::AllocationError;
use crate::metrics;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use url::Url;

const OP_LIST: &str = "list";
const OP_BIND: &str = "bind";
const OP_RELEASE: &str = "release";

/// IP allocation operations the reconciler depends on.
///
/// [`AllocationClient`] is the production implementation; the trait keeps the
/// reconciler independent of HTTP so it can be driven by in-memory fakes.
#[async_trait]
pub trait Allocator: Send + Sync {
    /// Bind `ip` to the Service `namespace/name`.
    async fn bind(&self, name: &str, namespace: &str, ip: &str) -> Result<(), AllocationError>;

    /// Release whatever IP the Service `namespace/name` holds.
    async fn release(&self, name: &str, namespace: &str) -> Result<(), AllocationError>;

    /// Pick a free IP for a Service that has none.
    async fn get_available_ip(&self) -> Result<String, AllocationError>;
}

/// HTTP client for the inventory service, owning the [`IpPoolCache`].
#[derive(Debug)]
pub struct AllocationClient {
    http: HttpClient,
    region: String,
    bind_url: Url,
    release_url: Url,
    list_url: Url,
    cache: IpPoolCache,
}

impl AllocationClient {
    /// Create a client for the endpoints in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint is not a valid URL.
    pub fn new(config: &LoadBalanceConfig) -> Result<Self, AllocationError> {
        Self::with_http_client(config, HttpClient::new())
    }

    /// Create a client reusing an existing HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint is not a valid URL.
    pub fn with_http_client(
        config: &LoadBalanceConfig,
        http: HttpClient,
    ) -> Result<Self, AllocationError> {
        Ok(Self {
            http,
            region: config.region.clone(),
            bind_url: parse_endpoint(OP_BIND, &config.endpoints.bind)?,
            release_url: parse_endpoint(OP_RELEASE, &config.endpoints.released)?,
            list_url: parse_endpoint(OP_LIST, &config.endpoints.list)?,
            cache: IpPoolCache::new(),
        })
    }

    /// The fallback pool of free records.
    #[must_use]
    pub fn cache(&self) -> &IpPoolCache {
        &self.cache
    }

    /// Bind `ip` to the Service `namespace/name` in this client's region.
    ///
    /// No local state changes on success: the cache only tracks free IPs.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects the bind.
    pub async fn bind(&self, name: &str, namespace: &str, ip: &str) -> Result<(), AllocationError> {
        let body = BindRequest {
            cluster: self.region.clone(),
            ip: ip.to_string(),
            namespace: namespace.to_string(),
            service_name: name.to_string(),
        };

        let result = self.post(OP_BIND, &self.bind_url, &body).await;
        metrics::record_allocation_request(OP_BIND, result.is_ok());
        result?;

        debug!(name, namespace, ip, "Inventory accepted bind");
        Ok(())
    }

    /// Release the IP bound to the Service `namespace/name`.
    ///
    /// The backend resolves the binding from the Service identity, so no IP is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects the release.
    pub async fn release(&self, name: &str, namespace: &str) -> Result<(), AllocationError> {
        let body = ReleaseRequest {
            namespace: namespace.to_string(),
            service_name: name.to_string(),
        };

        let result = self.post(OP_RELEASE, &self.release_url, &body).await;
        metrics::record_allocation_request(OP_RELEASE, result.is_ok());
        result?;

        info!(name, namespace, "Released load balancer ip");
        Ok(())
    }

    /// List every free allocation record known to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the backend rejects it, or
    /// `data` is not a list of allocation records.
    pub async fn list_free(&self) -> Result<Vec<AllocationRecord>, AllocationError> {
        let mut url = self.list_url.clone();
        url.query_pairs_mut()
            .append_pair(LIST_STATUS_QUERY_PARAM, &ALLOCATION_STATUS_FREE.to_string());

        let result = self.list(&url).await;
        metrics::record_allocation_request(OP_LIST, result.is_ok());
        result
    }

    async fn list(&self, url: &Url) -> Result<Vec<AllocationRecord>, AllocationError> {
        debug!(url = %url, "Listing free load balancer ips");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| AllocationError::Transport {
                operation: OP_LIST,
                url: url.to_string(),
                source,
            })?;

        let envelope = accept(OP_LIST, url, decode_envelope(OP_LIST, url, response).await?)?;

        if envelope.data.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(envelope.data).map_err(|e| AllocationError::Decode {
            operation: OP_LIST,
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Choose a free IP for a Service.
    ///
    /// 1. Ask the backend for free records; if it answers with at least one,
    ///    return the first IP without touching the cache.
    /// 2. If it answers with none, fail with [`AllocationError::NoAvailableIp`].
    ///    The cache is not consulted: an authoritative empty answer wins.
    /// 3. Only if the backend call itself fails, pop an arbitrary cached entry.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::NoAvailableIp`] on an empty backend answer,
    /// or [`AllocationError::CacheExhausted`] when the backend is unreachable
    /// and the cache is empty.
    pub async fn get_available_ip(&self) -> Result<String, AllocationError> {
        match self.list_free().await {
            Ok(records) => match records.into_iter().next() {
                Some(record) => Ok(record.ip),
                None => Err(AllocationError::NoAvailableIp),
            },
            Err(e) => {
                warn!(error = %e, "Inventory list failed, falling back to cached pool");
                let record = self.cache.pop().ok_or(AllocationError::CacheExhausted)?;
                metrics::set_pool_cache_size(self.cache.len());
                info!(
                    ip = %record.ip,
                    remaining = self.cache.len(),
                    "Allocated ip from cached pool"
                );
                Ok(record.ip)
            }
        }
    }

    /// Replace the cache with a full listing of free records.
    ///
    /// Called once when the controller is built. An empty listing is fine;
    /// failing to list at all is not.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn warm_cache(&self) -> Result<usize, AllocationError> {
        let records = self.list_free().await.map_err(|e| {
            error!(error = %e, "sync loadbalance ip list fulldata error");
            e
        })?;

        let count = self.cache.replace_all(records);
        metrics::set_pool_cache_size(count);
        info!(count, "sync full loadbalance success");
        Ok(count)
    }

    async fn post<T: Serialize + std::fmt::Debug>(
        &self,
        operation: &'static str,
        url: &Url,
        body: &T,
    ) -> Result<Envelope, AllocationError> {
        debug!(operation, url = %url, body = ?body, "HTTP request to inventory service");
        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|source| AllocationError::Transport {
                operation,
                url: url.to_string(),
                source,
            })?;

        let envelope = decode_envelope(operation, url, response).await?;
        accept(operation, url, envelope)
    }
}

#[async_trait]
impl Allocator for AllocationClient {
    async fn bind(&self, name: &str, namespace: &str, ip: &str) -> Result<(), AllocationError> {
        AllocationClient::bind(self, name, namespace, ip).await
    }

    async fn release(&self, name: &str, namespace: &str) -> Result<(), AllocationError> {
        AllocationClient::release(self, name, namespace).await
    }

    async fn get_available_ip(&self) -> Result<String, AllocationError> {
        AllocationClient::get_available_ip(self).await
    }
}

fn parse_endpoint(operation: &'static str, value: &str) -> Result<Url, AllocationError> {
    Url::parse(value).map_err(|e| AllocationError::InvalidEndpoint {
        operation,
        url: value.to_string(),
        reason: e.to_string(),
    })
}

/// Decode the response envelope.
///
/// Backends sometimes pair an error envelope with a non-2xx status; the
/// envelope is preferred when it decodes because it carries the message.
async fn decode_envelope(
    operation: &'static str,
    url: &Url,
    response: reqwest::Response,
) -> Result<Envelope, AllocationError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|source| AllocationError::Transport {
            operation,
            url: url.to_string(),
            source,
        })?;

    match serde_json::from_slice::<Envelope>(&bytes) {
        Ok(envelope) => Ok(envelope),
        Err(_) if !status.is_success() => Err(AllocationError::HttpStatus {
            operation,
            url: url.to_string(),
            status: status.as_u16(),
        }),
        Err(e) => Err(AllocationError::Decode {
            operation,
            url: url.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn accept(
    operation: &'static str,
    url: &Url,
    envelope: Envelope,
) -> Result<Envelope, AllocationError> {
    if envelope.code == INVENTORY_SUCCESS_CODE {
        return Ok(envelope);
    }

    error!(
        operation,
        url = %url,
        code = envelope.code,
        message = %envelope.message,
        "Inventory service rejected request"
    );
    Err(AllocationError::Rejected {
        operation,
        code: envelope.code,
        message: envelope.message,
    })
}
