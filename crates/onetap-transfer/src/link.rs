//! Capability links
//!
//! ```text
//! <origin>/view/<objectId>#key=<urlsafe-base64-no-pad(key)>&filename=<percent-encoded-utf8>
//! ```
//!
//! The key and filename live only in the fragment, which user agents never
//! send to the server when resolving the link.

use std::fmt;

use onetap_core::{ObjectId, OnetapError, OnetapResult};
use onetap_crypto::SymmetricKey;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;
use zeroize::Zeroize;

/// Filename used when a link carries none.
pub const DEFAULT_FILENAME: &str = "downloaded-file";

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A parsed capability link. The key text is wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct CapabilityLink {
    origin: String,
    object_id: ObjectId,
    key_text: String,
    filename: String,
}

impl CapabilityLink {
    /// Assemble the recipient-facing URL.
    ///
    /// Fragment parameters are always written `key` first, then `filename`.
    pub fn build(origin: &str, object_id: &ObjectId, key: &SymmetricKey, filename: &str) -> String {
        let mut key_text = onetap_crypto::encode_key(key);
        let url = format!(
            "{}/view/{}#key={}&filename={}",
            origin.trim_end_matches('/'),
            object_id,
            key_text,
            utf8_percent_encode(filename, COMPONENT)
        );
        key_text.zeroize();
        url
    }

    /// Parse a capability link without touching the network.
    ///
    /// The object id is the last path segment and must not be empty. `key`
    /// and `filename` may appear in either order and are percent-decoded
    /// (`+` stays a literal plus). A missing or empty `key` is `MissingKey`,
    /// a missing `filename` falls back to [`DEFAULT_FILENAME`].
    pub fn parse(link: &str) -> OnetapResult<Self> {
        let url = Url::parse(link.trim())
            .map_err(|e| OnetapError::InvalidLink(format!("not a URL: {e}")))?;

        let segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OnetapError::InvalidLink("no object id in path".into()))?;
        let object_id = ObjectId::new(segment)?;

        let fragment = url.fragment().ok_or(OnetapError::MissingKey)?;

        let mut key_text = None;
        let mut filename = None;
        for pair in fragment.split('&') {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            match name {
                "key" if key_text.is_none() => key_text = Some(decode_param(value)),
                "filename" if filename.is_none() => filename = Some(decode_param(value)),
                _ => {}
            }
        }

        let key_text = key_text
            .filter(|k| !k.is_empty())
            .ok_or(OnetapError::MissingKey)?;
        let filename = filename
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

        Ok(Self {
            origin: url.origin().ascii_serialization(),
            object_id,
            key_text,
            filename,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn key_text(&self) -> &str {
        &self.key_text
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Decode the key text. Bad alphabet or length fails here, before any
    /// network call.
    pub fn key(&self) -> OnetapResult<SymmetricKey> {
        onetap_crypto::decode_key(&self.key_text)
    }
}

fn decode_param(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

impl Drop for CapabilityLink {
    fn drop(&mut self) {
        self.key_text.zeroize();
    }
}

impl fmt::Debug for CapabilityLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityLink")
            .field("origin", &self.origin)
            .field("object_id", &self.object_id)
            .field("key_text", &"[REDACTED]")
            .field("filename", &self.filename)
            .finish()
    }
}
