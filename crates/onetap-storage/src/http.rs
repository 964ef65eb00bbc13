//! HTTP adapter for the hosted OneTap service
//!
//! ```text
//! POST {base}/files/upload      multipart: file=<envelope>, expiryMinutes=<n>  -> link text
//! GET  {base}/files/view/{id}   -> envelope bytes | 404
//! GET  {base}/files/usage       -> {"available_bytes": n}
//! ```

use std::time::Duration;

use onetap_core::config::BackendConfig;
use onetap_core::{Expiry, ObjectId, OnetapError, OnetapResult, QuotaSnapshot};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::backend::Backend;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    /// Build a client from config, applying the TLS policy and connect timeout.
    pub fn from_config(cfg: &BackendConfig) -> OnetapResult<Self> {
        cfg.check_endpoint()?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .user_agent(concat!("onetap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OnetapError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self::new(client, cfg.endpoint.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn upload_impl(&self, envelope: Vec<u8>, expiry: Expiry) -> OnetapResult<ObjectId> {
        let url = format!("{}/files/upload", self.base_url);
        let size = envelope.len();

        let part = Part::bytes(envelope)
            .file_name("blob")
            .mime_str("application/octet-stream")
            .map_err(|e| OnetapError::NetworkFailure(format!("building upload form: {e}")))?;
        let form = Form::new()
            .part("file", part)
            .text("expiryMinutes", expiry.minutes().to_string());

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error("upload", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error("upload", e))?;

        if !status.is_success() {
            let server_message = if body.trim().is_empty() {
                format!("HTTP status {status}")
            } else {
                body.trim().to_string()
            };
            return Err(OnetapError::UploadRejected { server_message });
        }

        let id = object_id_from_link(&body)?;
        debug!(object_id = %id, bytes = size, "upload accepted");
        Ok(id)
    }

    async fn fetch_impl(&self, id: &ObjectId) -> OnetapResult<Vec<u8>> {
        let url = format!("{}/files/view/{}", self.base_url, id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error("fetch", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(OnetapError::ObjectGone);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OnetapError::NetworkFailure(format!(
                "fetch failed with HTTP {status}: {}",
                body.trim()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error("fetch", e))?;
        Ok(bytes.to_vec())
    }

    async fn usage_impl(&self) -> OnetapResult<QuotaSnapshot> {
        let url = format!("{}/files/usage", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error("quota check", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OnetapError::NetworkFailure(format!(
                "storage check failed with HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error("quota check", e))?;
        Ok(parse_usage(&body))
    }
}

impl Backend for HttpBackend {
    async fn upload(&self, envelope: Vec<u8>, expiry: Expiry) -> OnetapResult<ObjectId> {
        self.upload_impl(envelope, expiry).await
    }

    async fn fetch(&self, id: &ObjectId) -> OnetapResult<Vec<u8>> {
        self.fetch_impl(id).await
    }

    async fn usage(&self) -> OnetapResult<QuotaSnapshot> {
        self.usage_impl().await
    }
}

fn transport_error(stage: &'static str, e: reqwest::Error) -> OnetapError {
    if e.is_timeout() {
        OnetapError::Timeout { stage }
    } else {
        OnetapError::NetworkFailure(format!("{stage}: {e}"))
    }
}

/// The service answers an upload with a link; the object id is its last
/// path segment.
fn object_id_from_link(body: &str) -> OnetapResult<ObjectId> {
    let link = body.trim().trim_matches('"');
    let link = link.split(['?', '#']).next().unwrap_or_default();
    let segment = link.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    ObjectId::new(segment).map_err(|_| {
        OnetapError::NetworkFailure(format!("unrecognised upload response: {link:?}"))
    })
}

/// Read `available_bytes` from a usage response, falling back to the
/// conservative snapshot when it is missing or not a non-negative integer.
fn parse_usage(body: &str) -> QuotaSnapshot {
    let available = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("available_bytes").and_then(|n| n.as_u64()));
    match available {
        Some(available_bytes) => QuotaSnapshot { available_bytes },
        None => {
            warn!("usage response lacks a valid available_bytes; assuming no capacity");
            QuotaSnapshot::CONSERVATIVE
        }
    }
}
