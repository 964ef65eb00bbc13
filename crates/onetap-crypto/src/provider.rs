//! Source of randomness for key and nonce generation

use std::sync::{Arc, Mutex};

use onetap_core::{OnetapError, OnetapResult};
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

/// Capability to draw cryptographically secure random bytes.
///
/// Passed into [`crate::Cipher`] instead of being reached for globally.
pub trait CryptoProvider: Send + Sync {
    fn fill_random(&self, dest: &mut [u8]) -> OnetapResult<()>;
}

impl<P: CryptoProvider + ?Sized> CryptoProvider for Arc<P> {
    fn fill_random(&self, dest: &mut [u8]) -> OnetapResult<()> {
        (**self).fill_random(dest)
    }
}

impl<P: CryptoProvider + ?Sized> CryptoProvider for &P {
    fn fill_random(&self, dest: &mut [u8]) -> OnetapResult<()> {
        (**self).fill_random(dest)
    }
}

/// The operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProvider;

impl CryptoProvider for OsProvider {
    fn fill_random(&self, dest: &mut [u8]) -> OnetapResult<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| OnetapError::CryptoFailure(format!("OS random source failed: {e}")))
    }
}

/// Deterministic generator seeded from a fixed value.
///
/// Reproducible output for tests and test vectors. Never use it to share
/// real files: anyone with the seed can recompute every key.
#[derive(Debug)]
pub struct SeededProvider {
    rng: Mutex<StdRng>,
}

impl SeededProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl CryptoProvider for SeededProvider {
    fn fill_random(&self, dest: &mut [u8]) -> OnetapResult<()> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| OnetapError::CryptoFailure("seeded generator poisoned".into()))?;
        rng.fill_bytes(dest);
        Ok(())
    }
}
