//! onetap-storage: the backend the encrypted envelopes are stored on
//!
//! The backend only ever sees envelopes, object ids, and expiry. It is the
//! sole authority on one-time access, expiry, and real capacity.

pub mod backend;
pub mod http;
pub mod operator;

pub use backend::Backend;
pub use http::HttpBackend;
pub use operator::{build_fs_operator, build_operator, OperatorBackend, S3Config};
