//! Backend port consumed by the transfer orchestrator

use std::future::Future;

use onetap_core::{Expiry, ObjectId, OnetapResult, QuotaSnapshot};

/// Request/response contract of the ephemeral object store.
///
/// Implementations map their transport failures onto the shared error
/// taxonomy: rejected writes are `UploadRejected`, missing objects are
/// `ObjectGone`, everything else on the wire is `NetworkFailure` or
/// `Timeout`. None of them retry.
pub trait Backend: Send + Sync {
    /// Store an envelope for at most `expiry`, returning its id.
    fn upload(
        &self,
        envelope: Vec<u8>,
        expiry: Expiry,
    ) -> impl Future<Output = OnetapResult<ObjectId>> + Send;

    /// Fetch an envelope. Expired and already-consumed objects are
    /// indistinguishable `ObjectGone`.
    fn fetch(&self, id: &ObjectId) -> impl Future<Output = OnetapResult<Vec<u8>>> + Send;

    /// Current free capacity. An unreadable answer yields
    /// [`QuotaSnapshot::CONSERVATIVE`] rather than an error.
    fn usage(&self) -> impl Future<Output = OnetapResult<QuotaSnapshot>> + Send;
}

impl<B: Backend> Backend for std::sync::Arc<B> {
    fn upload(
        &self,
        envelope: Vec<u8>,
        expiry: Expiry,
    ) -> impl Future<Output = OnetapResult<ObjectId>> + Send {
        (**self).upload(envelope, expiry)
    }

    fn fetch(&self, id: &ObjectId) -> impl Future<Output = OnetapResult<Vec<u8>>> + Send {
        (**self).fetch(id)
    }

    fn usage(&self) -> impl Future<Output = OnetapResult<QuotaSnapshot>> + Send {
        (**self).usage()
    }
}
