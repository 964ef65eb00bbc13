//! Per-file symmetric key: generation, raw export, raw import

use onetap_core::{OnetapError, OnetapResult};
use zeroize::{Zeroize, Zeroizing};

use crate::provider::CryptoProvider;
use crate::KEY_SIZE;

/// A per-file 256-bit AES key. Zeroized on drop.
///
/// Deliberately not `Clone`: one owner per encrypt or decrypt call.
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Draw a fresh key from `provider`.
    pub fn generate(provider: &dyn CryptoProvider) -> OnetapResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        provider.fill_random(&mut bytes)?;
        Ok(Self { bytes })
    }

    /// Import raw key bytes. Anything but exactly 32 bytes is rejected.
    pub fn import_raw(raw: &[u8]) -> OnetapResult<Self> {
        let bytes: [u8; KEY_SIZE] = raw
            .try_into()
            .map_err(|_| OnetapError::InvalidKeyLength { len: raw.len() })?;
        Ok(Self { bytes })
    }

    /// Copy of the raw key bytes, wiped when the copy is dropped.
    pub fn export_raw(&self) -> Zeroizing<[u8; KEY_SIZE]> {
        Zeroizing::new(self.bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{OsProvider, SeededProvider};

    #[test]
    fn test_key_generation() {
        let k1 = SymmetricKey::generate(&OsProvider).unwrap();
        let k2 = SymmetricKey::generate(&OsProvider).unwrap();
        assert_ne!(k1.export_raw(), k2.export_raw(), "random keys must differ");
    }

    #[test]
    fn test_export_import_roundtrip() {
        let key = SymmetricKey::generate(&SeededProvider::new(1)).unwrap();
        let raw = key.export_raw();
        let imported = SymmetricKey::import_raw(raw.as_slice()).unwrap();
        assert_eq!(key.export_raw(), imported.export_raw());
    }

    #[test]
    fn test_import_wrong_length() {
        for len in [0, 16, 31, 33, 64] {
            let raw = vec![0u8; len];
            match SymmetricKey::import_raw(&raw) {
                Err(OnetapError::InvalidKeyLength { len: got }) => assert_eq!(got, len),
                other => panic!("expected InvalidKeyLength for {len} bytes, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_debug_redacts() {
        let key = SymmetricKey::import_raw(&[0x41u8; KEY_SIZE]).unwrap();
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("65"));
    }
}
