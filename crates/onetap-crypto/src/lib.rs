//! onetap-crypto: client-side encryption for one-time links
//!
//! Each shared file gets its own freshly generated 256-bit key. The key
//! never reaches the backend: it travels only in the fragment of the
//! capability link.
//!
//! Envelope format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: AES-256-GCM ciphertext][16 bytes: GCM tag]
//! ```
//!
//! Randomness comes from an injected [`CryptoProvider`], so the cipher has
//! no ambient host dependency and tests can run against a seeded source.

pub mod cipher;
pub mod codec;
pub mod keys;
pub mod provider;

pub use cipher::{Cipher, Envelope};
pub use codec::{decode, decode_key, encode, encode_key};
pub use keys::SymmetricKey;
pub use provider::{CryptoProvider, OsProvider, SeededProvider};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
