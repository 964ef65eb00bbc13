pub mod config;
pub mod error;
pub mod types;

pub use error::{OnetapError, OnetapResult};
pub use types::{Expiry, ExpiryUnit, ObjectId, QuotaSnapshot};
