//! AES-256-GCM envelope encryption/decryption
//!
//! Envelope format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! No associated data. Every key encrypts exactly one file, and every
//! encryption draws a fresh random nonce.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use onetap_core::{OnetapError, OnetapResult};

use crate::keys::SymmetricKey;
use crate::provider::{CryptoProvider, OsProvider};
use crate::{NONCE_SIZE, TAG_SIZE};

/// Self-describing ciphertext: nonce prepended to the authenticated ciphertext.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    bytes: Vec<u8>,
}

impl Envelope {
    /// Wrap bytes received from the backend. Shorter than a nonce is malformed.
    pub fn from_bytes(bytes: Vec<u8>) -> OnetapResult<Self> {
        if bytes.len() < NONCE_SIZE {
            return Err(OnetapError::MalformedEnvelope { len: bytes.len() });
        }
        Ok(Self { bytes })
    }

    pub fn nonce(&self) -> &[u8] {
        &self.bytes[..NONCE_SIZE]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Envelope size for a plaintext of `plaintext_len` bytes.
    pub fn sealed_len(plaintext_len: usize) -> usize {
        NONCE_SIZE + plaintext_len + TAG_SIZE
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Key generation plus envelope encrypt/decrypt over an injected random source.
#[derive(Debug, Clone, Default)]
pub struct Cipher<P = OsProvider> {
    provider: P,
}

impl Cipher<OsProvider> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: CryptoProvider> Cipher<P> {
    pub fn with_provider(provider: P) -> Self {
        Self { provider }
    }

    /// Fresh 256-bit key. Call once per file.
    pub fn generate(&self) -> OnetapResult<SymmetricKey> {
        SymmetricKey::generate(&self.provider)
    }

    /// Encrypt `plaintext` under `key` with a fresh random nonce.
    ///
    /// Returns `[12-byte nonce][ciphertext][16-byte tag]`.
    pub fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey) -> OnetapResult<Envelope> {
        let cipher = Aes256Gcm::new(key.as_bytes().into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.provider.fill_random(&mut nonce_bytes)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| OnetapError::CryptoFailure(format!("envelope encryption failed: {e}")))?;

        let mut bytes = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&ciphertext);
        Ok(Envelope { bytes })
    }

    /// Verify and decrypt an envelope.
    ///
    /// Input shorter than the nonce is `MalformedEnvelope`. Any tag mismatch
    /// is `AuthenticationFailure`, whatever the cause.
    pub fn decrypt(&self, envelope: &[u8], key: &SymmetricKey) -> OnetapResult<Vec<u8>> {
        if envelope.len() < NONCE_SIZE {
            return Err(OnetapError::MalformedEnvelope {
                len: envelope.len(),
            });
        }

        let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Aes256Gcm::new(key.as_bytes().into());

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| OnetapError::AuthenticationFailure)
    }
}
