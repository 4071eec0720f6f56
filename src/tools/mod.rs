//! Caller-facing layer over the adapters.
//!
//! - `guard`: read/write classification and the read-only guard
//! - `session`: one adapter wrapped with the guard and the relationship enhancer

pub mod guard;
pub mod session;

pub use guard::{ALLOW_WRITE_FLAG, is_write_operation, validate_query};
pub use session::DatabaseSession;
