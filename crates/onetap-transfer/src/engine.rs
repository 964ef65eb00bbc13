//! Transfer orchestrator: the send and receive pipelines
//!
//! Send:    Idle → QuotaChecking → Encrypting → Uploading → LinkReady | Failed
//! Receive: Idle → Fetching → Decrypting → Ready | Failed
//!
//! Each pipeline is strictly sequential and one-way. A failure at any stage
//! ends the transfer with exactly one error; nothing is retried here.
//! Every network stage is bounded by a timeout and can be cancelled.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use onetap_core::config::OnetapConfig;
use onetap_core::{Expiry, ObjectId, OnetapError, OnetapResult};
use onetap_crypto::{Cipher, CryptoProvider, Envelope, OsProvider};
use onetap_storage::Backend;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::link::CapabilityLink;
use crate::media::{self, MediaType};
use crate::quota;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    QuotaChecking,
    Encrypting,
    Uploading,
    LinkReady,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    Idle,
    Fetching,
    Decrypting,
    Ready,
    Failed,
}

/// A state transition reported to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Send(SendState),
    Receive(ReceiveState),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Stage::Send(SendState::LinkReady | SendState::Failed)
                | Stage::Receive(ReceiveState::Ready | ReceiveState::Failed)
        )
    }
}

/// Observer callback, invoked on every state transition
pub type StageFn = Box<dyn Fn(Stage) + Send + Sync>;

/// Result of one orchestrator call
#[derive(Debug)]
pub enum TransferOutcome {
    Uploaded {
        object_id: ObjectId,
        link: String,
    },
    Downloaded {
        plaintext: Vec<u8>,
        filename: String,
        media_type: MediaType,
    },
    Failed(OnetapError),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TransferOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&OnetapError> {
        match self {
            TransferOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-process transfer settings, fixed after startup.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Origin that capability links point at
    pub origin: String,
    pub max_file_bytes: u64,
    pub previewable_only: bool,
    pub quota_timeout: Duration,
    pub upload_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl TransferSettings {
    pub fn from_config(cfg: &OnetapConfig) -> Self {
        Self {
            origin: cfg.share.origin.clone(),
            max_file_bytes: cfg.share.max_file_bytes,
            previewable_only: cfg.share.previewable_only,
            quota_timeout: cfg.backend.quota_timeout(),
            upload_timeout: cfg.backend.upload_timeout(),
            fetch_timeout: cfg.backend.fetch_timeout(),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from_config(&OnetapConfig::default())
    }
}

/// Couples the cipher to the backend for one file at a time.
///
/// Holds no per-transfer state, so one orchestrator can run any number of
/// transfers concurrently: each call owns its key, envelope, and buffers.
pub struct TransferOrchestrator<B, P = OsProvider> {
    backend: B,
    cipher: Cipher<P>,
    settings: TransferSettings,
    observer: Option<StageFn>,
}

impl<B: Backend> TransferOrchestrator<B, OsProvider> {
    pub fn new(backend: B, settings: TransferSettings) -> Self {
        Self::with_cipher(backend, Cipher::new(), settings)
    }
}

impl<B: Backend, P: CryptoProvider> TransferOrchestrator<B, P> {
    pub fn with_cipher(backend: B, cipher: Cipher<P>, settings: TransferSettings) -> Self {
        Self {
            backend,
            cipher,
            settings,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: StageFn) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn emit(&self, stage: Stage) {
        debug!(?stage, "transfer stage");
        if let Some(observer) = &self.observer {
            observer(stage);
        }
    }

    /// Encrypt and upload `plaintext`, returning the capability link.
    pub async fn send(&self, filename: &str, plaintext: &[u8], expiry: Expiry) -> TransferOutcome {
        self.send_with_cancel(filename, plaintext, expiry, &CancellationToken::new())
            .await
    }

    /// [`send`](Self::send) that stops at the next stage boundary, or
    /// abandons the in-flight request, once `cancel` fires.
    pub async fn send_with_cancel(
        &self,
        filename: &str,
        plaintext: &[u8],
        expiry: Expiry,
        cancel: &CancellationToken,
    ) -> TransferOutcome {
        self.emit(Stage::Send(SendState::Idle));
        match self.try_send(filename, plaintext, expiry, cancel).await {
            Ok((object_id, link)) => {
                self.emit(Stage::Send(SendState::LinkReady));
                info!(object_id = %object_id, bytes = plaintext.len(), expiry = %expiry, "link ready");
                TransferOutcome::Uploaded { object_id, link }
            }
            Err(e) => {
                self.emit(Stage::Send(SendState::Failed));
                warn!(error = %e, "send failed");
                TransferOutcome::Failed(e)
            }
        }
    }

    /// Read a local file and send it under its own file name.
    pub async fn send_file(
        &self,
        path: &Path,
        expiry: Expiry,
        cancel: &CancellationToken,
    ) -> TransferOutcome {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| crate::link::DEFAULT_FILENAME.to_string());

        // Reject by size from metadata before reading the whole file.
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) => return self.fail_send(e.into()),
        };
        if let Err(e) = self.validate_file(&filename, size) {
            return self.fail_send(e);
        }

        match tokio::fs::read(path).await {
            Ok(plaintext) => {
                self.send_with_cancel(&filename, &plaintext, expiry, cancel)
                    .await
            }
            Err(e) => self.fail_send(e.into()),
        }
    }

    fn fail_send(&self, e: OnetapError) -> TransferOutcome {
        self.emit(Stage::Send(SendState::Idle));
        self.emit(Stage::Send(SendState::Failed));
        warn!(error = %e, "send failed");
        TransferOutcome::Failed(e)
    }

    fn validate_file(&self, filename: &str, size: u64) -> OnetapResult<()> {
        if size > self.settings.max_file_bytes {
            return Err(OnetapError::FileTooLarge {
                size,
                limit: self.settings.max_file_bytes,
            });
        }
        if self.settings.previewable_only {
            let media = media::classify(filename);
            if !media.is_previewable() {
                return Err(OnetapError::NotPreviewable {
                    mime: media.mime().to_string(),
                });
            }
        }
        Ok(())
    }

    async fn try_send(
        &self,
        filename: &str,
        plaintext: &[u8],
        expiry: Expiry,
        cancel: &CancellationToken,
    ) -> OnetapResult<(ObjectId, String)> {
        self.validate_file(filename, plaintext.len() as u64)?;

        self.emit(Stage::Send(SendState::QuotaChecking));
        let snapshot = bounded(
            "quota check",
            self.settings.quota_timeout,
            cancel,
            self.backend.usage(),
        )
        .await?;
        // Envelope overhead is left to the backend's own capacity check.
        quota::check(plaintext.len() as u64, snapshot).into_result()?;

        if cancel.is_cancelled() {
            return Err(OnetapError::Cancelled);
        }
        self.emit(Stage::Send(SendState::Encrypting));
        let key = self.cipher.generate()?;
        let envelope = self.cipher.encrypt(plaintext, &key)?;

        if cancel.is_cancelled() {
            return Err(OnetapError::Cancelled);
        }
        self.emit(Stage::Send(SendState::Uploading));
        let object_id = bounded(
            "upload",
            self.settings.upload_timeout,
            cancel,
            self.backend.upload(envelope.into_bytes(), expiry),
        )
        .await?;

        let link = CapabilityLink::build(&self.settings.origin, &object_id, &key, filename);
        Ok((object_id, link))
    }

    /// Resolve a capability link: fetch the envelope and decrypt it.
    pub async fn receive(&self, link: &str) -> TransferOutcome {
        self.receive_with_cancel(link, &CancellationToken::new())
            .await
    }

    pub async fn receive_with_cancel(&self, link: &str, cancel: &CancellationToken) -> TransferOutcome {
        self.emit(Stage::Receive(ReceiveState::Idle));
        match self.try_receive(link, cancel).await {
            Ok((plaintext, filename, media_type)) => {
                self.emit(Stage::Receive(ReceiveState::Ready));
                info!(bytes = plaintext.len(), media_type = %media_type, "file ready");
                TransferOutcome::Downloaded {
                    plaintext,
                    filename,
                    media_type,
                }
            }
            Err(e) => {
                self.emit(Stage::Receive(ReceiveState::Failed));
                warn!(error = %e, "receive failed");
                TransferOutcome::Failed(e)
            }
        }
    }

    async fn try_receive(
        &self,
        link: &str,
        cancel: &CancellationToken,
    ) -> OnetapResult<(Vec<u8>, String, MediaType)> {
        // All link validation happens before the first request.
        let link = CapabilityLink::parse(link)?;
        let key = link.key()?;

        self.emit(Stage::Receive(ReceiveState::Fetching));
        let bytes = bounded(
            "fetch",
            self.settings.fetch_timeout,
            cancel,
            self.backend.fetch(link.object_id()),
        )
        .await?;

        if cancel.is_cancelled() {
            return Err(OnetapError::Cancelled);
        }
        self.emit(Stage::Receive(ReceiveState::Decrypting));
        let envelope = Envelope::from_bytes(bytes)?;
        let plaintext = self.cipher.decrypt(envelope.as_bytes(), &key)?;

        let filename = link.filename().to_string();
        let media_type = media::classify(&filename);
        Ok((plaintext, filename, media_type))
    }
}

/// Run one network stage under a deadline, giving up early on cancellation.
async fn bounded<T>(
    stage: &'static str,
    limit: Duration,
    cancel: &CancellationToken,
    fut: impl Future<Output = OnetapResult<T>>,
) -> OnetapResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OnetapError::Cancelled),
        res = tokio::time::timeout(limit, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(OnetapError::Timeout { stage }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Send(SendState::LinkReady).is_terminal());
        assert!(Stage::Send(SendState::Failed).is_terminal());
        assert!(Stage::Receive(ReceiveState::Ready).is_terminal());
        assert!(!Stage::Send(SendState::Uploading).is_terminal());
        assert!(!Stage::Receive(ReceiveState::Fetching).is_terminal());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let cancel = CancellationToken::new();
        let res: OnetapResult<()> = bounded("upload", Duration::from_millis(10), &cancel, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(OnetapError::Timeout { stage: "upload" })));
    }

    #[tokio::test]
    async fn test_bounded_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res: OnetapResult<u8> =
            bounded("fetch", Duration::from_secs(5), &cancel, async { Ok(1) }).await;
        assert!(matches!(res, Err(OnetapError::Cancelled)));
    }

    #[tokio::test]
    async fn test_bounded_passes_result() {
        let cancel = CancellationToken::new();
        let res = bounded("fetch", Duration::from_secs(5), &cancel, async { Ok(7u8) }).await;
        assert_eq!(res.unwrap(), 7);
    }
}
