use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{OnetapError, OnetapResult};
use crate::types::Expiry;

/// Top-level client configuration (loaded from config.toml)
///
/// Read once at startup and never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OnetapConfig {
    pub backend: BackendConfig,
    pub share: ShareConfig,
    pub log: LogConfig,
}

/// Which backend adapter to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The hosted OneTap HTTP service
    Http,
    /// Self-hosted store on the local filesystem
    Fs,
    /// Self-hosted store in an S3-compatible bucket
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// API base URL of the HTTP service (e.g. https://host/api), or the
    /// S3 endpoint for the s3 backend
    pub endpoint: String,
    /// Reject plaintext-HTTP endpoints instead of warning
    pub enforce_tls: bool,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Bound on the storage usage query
    pub quota_timeout_secs: u64,
    /// Bound on the envelope upload
    pub upload_timeout_secs: u64,
    /// Bound on the envelope download
    pub fetch_timeout_secs: u64,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// Bucket for the s3 backend
    pub bucket: String,
    /// Region for the s3 backend
    pub region: String,
    /// Total capacity a self-hosted backend advertises, in bytes
    pub capacity_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Frontend origin that capability links point at
    pub origin: String,
    /// Expiry used when the caller does not pass one
    pub default_expiry: Expiry,
    /// Largest file accepted for upload
    pub max_file_bytes: u64,
    /// Only accept images, text, and PDF (files the viewer can preview)
    pub previewable_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl BackendConfig {
    pub fn quota_timeout(&self) -> Duration {
        Duration::from_secs(self.quota_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Check the HTTP endpoint against the TLS policy.
    ///
    /// A plaintext endpoint is an error with `enforce_tls`, otherwise a warning.
    pub fn check_endpoint(&self) -> OnetapResult<()> {
        if self.kind != BackendKind::Http {
            return Ok(());
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(OnetapError::Config(format!(
                "backend endpoint must be an http(s) URL, got {:?}",
                self.endpoint
            )));
        }
        if self.endpoint.starts_with("http://") {
            if self.enforce_tls {
                return Err(OnetapError::Config(format!(
                    "backend endpoint uses plaintext HTTP ({}), but enforce_tls is enabled",
                    self.endpoint
                )));
            }
            tracing::warn!(
                endpoint = %self.endpoint,
                "backend endpoint uses plaintext HTTP; envelopes and object ids are visible on the wire"
            );
        }
        Ok(())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Http,
            endpoint: "https://respectable-jaclyn-koyebuser1-38d6aeac.koyeb.app/api".into(),
            enforce_tls: true,
            connect_timeout_secs: 10,
            quota_timeout_secs: 15,
            upload_timeout_secs: 300,
            fetch_timeout_secs: 300,
            root: PathBuf::from("~/.local/share/onetap/store"),
            bucket: "onetap".into(),
            region: "us-east-1".into(),
            capacity_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            origin: "https://onetap.app".into(),
            default_expiry: Expiry::default(),
            max_file_bytes: 100 * 1024 * 1024,
            previewable_only: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}
