//! Pre-flight capacity check
//!
//! Decides from a snapshot taken just before the upload whether the file can
//! fit. The snapshot races with other clients' uploads; the backend still
//! rejects writes that do not fit, so a stale `Allow` costs one failed
//! upload and never correctness.

use onetap_core::{OnetapError, OnetapResult, QuotaSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny { required: u64, available: u64 },
}

impl QuotaDecision {
    pub fn into_result(self) -> OnetapResult<()> {
        match self {
            QuotaDecision::Allow => Ok(()),
            QuotaDecision::Deny {
                required,
                available,
            } => Err(OnetapError::QuotaExceeded {
                required,
                available,
            }),
        }
    }
}

pub fn check(file_size: u64, snapshot: QuotaSnapshot) -> QuotaDecision {
    if file_size > snapshot.available_bytes {
        QuotaDecision::Deny {
            required: file_size,
            available: snapshot.available_bytes,
        }
    } else {
        QuotaDecision::Allow
    }
}

/// Human-readable size with 1024-based units, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {}", UNITS[unit])
}
