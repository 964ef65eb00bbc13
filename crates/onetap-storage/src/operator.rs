//! Self-hosted backend on an OpenDAL operator
//!
//! Layout inside the operator root:
//! ```text
//! objects/{id}        envelope bytes
//! meta/{id}.json      {"size": n, "expires_at": unix_secs}
//! ```
//!
//! A fetch first claims the object, then reads and deletes it, so each
//! object is readable once. Where the service supports rename the claim moves
//! `meta/{id}.json` to `claims/{id}.json`, which also holds across processes;
//! claims are always tracked in-process as well. Expired objects are reported
//! as gone and swept when touched.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use onetap_core::config::BackendConfig;
use onetap_core::{Expiry, ObjectId, OnetapError, OnetapResult, QuotaSnapshot};
use opendal::Operator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::Backend;

/// Connection settings for an S3-compatible bucket
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Config {
    /// Take endpoint, bucket, and region from config and credentials from
    /// AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY.
    pub fn from_env(cfg: &BackendConfig) -> OnetapResult<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| OnetapError::Config(format!("{name} is not set for the s3 backend")))
        };
        Ok(Self {
            endpoint: cfg.endpoint.clone(),
            region: cfg.region.clone(),
            bucket: cfg.bucket.clone(),
            access_key_id: var("AWS_ACCESS_KEY_ID")?,
            secret_access_key: var("AWS_SECRET_ACCESS_KEY")?,
        })
    }
}

/// Build an OpenDAL Operator for any S3-compatible endpoint.
///
/// Uses path-style addressing (default in opendal 0.55), which MinIO and
/// most self-hosted stores require.
pub fn build_operator(cfg: &S3Config) -> OnetapResult<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .map_err(|e| OnetapError::Config(format!("creating OpenDAL S3 operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// Build an operator rooted at a local directory.
pub fn build_fs_operator(root: &Path) -> OnetapResult<Operator> {
    let builder = opendal::services::Fs::default().root(&root.to_string_lossy());

    let op = Operator::new(builder)
        .map_err(|e| OnetapError::Config(format!("creating OpenDAL fs operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    size: u64,
    expires_at: u64,
}

/// Emulates the hosted service on top of plain object storage.
#[derive(Debug, Clone)]
pub struct OperatorBackend {
    op: Operator,
    capacity_bytes: u64,
    claims: Arc<Mutex<HashSet<String>>>,
}

/// In-process claim on one object id, released on drop.
struct ClaimGuard<'a> {
    claims: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut claims) = self.claims.lock() {
            claims.remove(&self.id);
        }
    }
}

impl OperatorBackend {
    pub fn new(op: Operator, capacity_bytes: u64) -> Self {
        Self {
            op,
            capacity_bytes,
            claims: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// None when another fetch in this process already holds the id.
    fn claim_local(&self, id: &str) -> Option<ClaimGuard<'_>> {
        let mut claims = self.claims.lock().ok()?;
        if !claims.insert(id.to_string()) {
            return None;
        }
        Some(ClaimGuard {
            claims: &self.claims,
            id: id.to_string(),
        })
    }

    /// Move the metadata out of `meta/` so no other reader can find it.
    /// Returns the path the metadata now lives at.
    async fn claim_meta(&self, id: &str) -> OnetapResult<String> {
        if !self.op.info().full_capability().rename {
            return Ok(meta_path(id));
        }
        let claimed = claim_path(id);
        match self.op.rename(&meta_path(id), &claimed).await {
            Ok(()) => Ok(claimed),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Err(OnetapError::ObjectGone),
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn read_meta(&self, id: &str) -> OnetapResult<Option<ObjectMeta>> {
        self.read_meta_at(id, &meta_path(id)).await
    }

    async fn read_meta_at(&self, id: &str, path: &str) -> OnetapResult<Option<ObjectMeta>> {
        match self.op.read(path).await {
            Ok(buf) => {
                let meta = serde_json::from_slice(&buf.to_vec()).map_err(|e| {
                    OnetapError::NetworkFailure(format!("corrupt metadata for {id}: {e}"))
                })?;
                Ok(Some(meta))
            }
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn remove(&self, id: &str) -> OnetapResult<()> {
        self.remove_at(id, &meta_path(id)).await
    }

    async fn remove_at(&self, id: &str, meta: &str) -> OnetapResult<()> {
        // Meta first: without it the object is already unreachable.
        self.op.delete(meta).await.map_err(storage_error)?;
        self.op
            .delete(&object_path(id))
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

impl Backend for OperatorBackend {
    async fn upload(&self, envelope: Vec<u8>, expiry: Expiry) -> OnetapResult<ObjectId> {
        let size = envelope.len() as u64;
        let available = self.usage().await?.available_bytes;
        if size > available {
            return Err(OnetapError::UploadRejected {
                server_message: format!(
                    "not enough storage: required {size} bytes, available {available} bytes"
                ),
            });
        }

        let id = ObjectId::new(uuid::Uuid::new_v4().simple().to_string())?;
        let meta = ObjectMeta {
            size,
            expires_at: now_secs().saturating_add(expiry.minutes().saturating_mul(60)),
        };
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| OnetapError::NetworkFailure(format!("encoding metadata: {e}")))?;

        self.op
            .write(&object_path(id.as_str()), envelope)
            .await
            .map_err(storage_error)?;
        self.op
            .write(&meta_path(id.as_str()), meta_bytes)
            .await
            .map_err(storage_error)?;

        info!(object_id = %id, bytes = size, expiry = %expiry, "stored");
        Ok(id)
    }

    async fn fetch(&self, id: &ObjectId) -> OnetapResult<Vec<u8>> {
        let Some(_claim) = self.claim_local(id.as_str()) else {
            debug!(object_id = %id, "already claimed by a concurrent fetch");
            return Err(OnetapError::ObjectGone);
        };
        let meta_at = self.claim_meta(id.as_str()).await?;

        let meta = match self.read_meta_at(id.as_str(), &meta_at).await? {
            Some(meta) => meta,
            None => return Err(OnetapError::ObjectGone),
        };
        if now_secs() >= meta.expires_at {
            debug!(object_id = %id, "expired on fetch");
            self.remove_at(id.as_str(), &meta_at).await?;
            return Err(OnetapError::ObjectGone);
        }

        let data = match self.op.read(&object_path(id.as_str())).await {
            Ok(buf) => buf.to_vec(),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                self.op.delete(&meta_at).await.map_err(storage_error)?;
                return Err(OnetapError::ObjectGone);
            }
            Err(e) => {
                // Put the claim back so a later fetch can still succeed.
                if meta_at != meta_path(id.as_str()) {
                    let _ = self.op.rename(&meta_at, &meta_path(id.as_str())).await;
                }
                return Err(storage_error(e));
            }
        };
        self.remove_at(id.as_str(), &meta_at).await?;

        info!(object_id = %id, bytes = data.len(), "served and removed");
        Ok(data)
    }

    async fn usage(&self) -> OnetapResult<QuotaSnapshot> {
        let entries = match self.op.list("meta/").await {
            Ok(entries) => entries,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(storage_error(e)),
        };

        let now = now_secs();
        let mut used = 0u64;
        for entry in entries {
            let Some(id) = entry.name().strip_suffix(".json") else {
                continue;
            };
            match self.read_meta(id).await? {
                Some(meta) if now >= meta.expires_at => self.remove(id).await?,
                Some(meta) => used = used.saturating_add(meta.size),
                None => {}
            }
        }

        Ok(QuotaSnapshot {
            available_bytes: self.capacity_bytes.saturating_sub(used),
        })
    }
}

fn object_path(id: &str) -> String {
    format!("objects/{id}")
}

fn meta_path(id: &str) -> String {
    format!("meta/{id}.json")
}

fn claim_path(id: &str) -> String {
    format!("claims/{id}.json")
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn storage_error(e: opendal::Error) -> OnetapError {
    OnetapError::NetworkFailure(format!("storage: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_operator_valid() {
        let cfg = S3Config {
            endpoint: "http://localhost:8333".to_string(),
            region: "us-east-1".to_string(),
            bucket: "onetap".to_string(),
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
        };
        assert!(build_operator(&cfg).is_ok());
    }

    #[test]
    fn test_paths() {
        assert_eq!(object_path("abc"), "objects/abc");
        assert_eq!(meta_path("abc"), "meta/abc.json");
        assert_eq!(claim_path("abc"), "claims/abc.json");
    }

    #[test]
    fn test_local_claim_is_exclusive() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        let backend = OperatorBackend::new(op, 0);

        let first = backend.claim_local("abc");
        assert!(first.is_some());
        assert!(backend.claim_local("abc").is_none());
        assert!(backend.claim_local("other").is_some());

        drop(first);
        assert!(backend.claim_local("abc").is_some());
    }
}
