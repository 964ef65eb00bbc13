//! onetap-transfer: send and receive pipelines over a storage backend
//!
//! The orchestrator couples [`onetap_crypto::Cipher`] to an
//! [`onetap_storage::Backend`]. Plaintext and keys never leave this process;
//! the backend only ever sees sealed envelopes.

pub mod engine;
pub mod link;
pub mod materialize;
pub mod media;
pub mod quota;

pub use engine::{
    ReceiveState, SendState, Stage, StageFn, TransferOrchestrator, TransferOutcome,
    TransferSettings,
};
pub use link::{CapabilityLink, DEFAULT_FILENAME};
pub use materialize::materialize;
pub use media::{MediaType, Preview};
pub use quota::{format_size, QuotaDecision};
