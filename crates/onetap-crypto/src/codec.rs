//! Key text codec: URL-safe base64 without padding
//!
//! The output uses only `A-Z a-z 0-9 - _`, so it can sit verbatim in a URL
//! fragment.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine};
use onetap_core::{OnetapError, OnetapResult};
use zeroize::Zeroizing;

use crate::keys::SymmetricKey;

pub fn encode(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Decode key text. Padding, `+`, `/`, or any other character outside the
/// URL-safe alphabet is an error, as is an impossible length.
pub fn decode(text: &str) -> OnetapResult<Vec<u8>> {
    B64.decode(text)
        .map_err(|e| OnetapError::InvalidEncoding(e.to_string()))
}

pub fn encode_key(key: &SymmetricKey) -> String {
    encode(key.export_raw().as_slice())
}

/// Decode key text straight into a key, wiping the intermediate buffer.
pub fn decode_key(text: &str) -> OnetapResult<SymmetricKey> {
    let raw = Zeroizing::new(decode(text)?);
    SymmetricKey::import_raw(&raw)
}
