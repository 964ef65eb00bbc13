use thiserror::Error;

pub type OnetapResult<T> = Result<T, OnetapError>;

/// Every way a send or receive can fail.
///
/// A transfer that fails ends with exactly one of these.
#[derive(Debug, Error)]
pub enum OnetapError {
    /// The AEAD primitive or the random source failed. Not user-actionable.
    #[error("cryptographic failure: {0}")]
    CryptoFailure(String),

    /// Tag verification failed. Wrong key and damaged ciphertext are
    /// reported identically.
    #[error("decryption failed: the key is incorrect or the file is corrupted")]
    AuthenticationFailure,

    #[error("malformed envelope: {len} bytes is shorter than the nonce")]
    MalformedEnvelope { len: usize },

    #[error("invalid key encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid key length: {len} bytes (expected 32)")]
    InvalidKeyLength { len: usize },

    #[error("decryption key is missing from the link")]
    MissingKey,

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("not enough storage: required {required} bytes, available {available} bytes")]
    QuotaExceeded { required: u64, available: u64 },

    #[error("file is too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("file type {mime} is not supported for in-browser preview")]
    NotPreviewable { mime: String },

    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),

    /// Expired or already consumed; the backend does not say which.
    #[error("the file is gone: the link expired or was already used")]
    ObjectGone,

    #[error("upload rejected: {server_message}")]
    UploadRejected { server_message: String },

    #[error("{stage} timed out")]
    Timeout { stage: &'static str },

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OnetapError {
    /// Transport-layer failures that a caller may choose to retry.
    ///
    /// Retrying an upload can orphan an object and retrying a fetch of a
    /// one-time object fails the second time, so nothing here retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OnetapError::UploadRejected { .. }
                | OnetapError::Timeout { .. }
                | OnetapError::NetworkFailure(_)
        )
    }

    /// Input was rejected before any network call was made.
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            OnetapError::MissingKey
                | OnetapError::InvalidLink(_)
                | OnetapError::InvalidEncoding(_)
                | OnetapError::InvalidKeyLength { .. }
                | OnetapError::InvalidExpiry(_)
                | OnetapError::FileTooLarge { .. }
                | OnetapError::NotPreviewable { .. }
        )
    }
}
