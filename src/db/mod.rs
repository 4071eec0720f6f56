//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The adapter capability contract and backend dispatch
//! - One adapter per backend family (MySQL protocol, Oracle, SQLite, Redis)
//! - Batch schema assembly from bulk catalog rows
//! - Relationship inference over assembled schemas
//! - Row decoding and parameter binding for the sqlx backends

pub mod adapter;
pub mod assembler;
pub mod enhancer;
pub mod mysql;
pub mod oracle;
pub(crate) mod params;
pub mod redis;
pub mod sqlite;
pub mod types;

pub use adapter::{Adapter, DbAdapter};
pub use assembler::{CatalogRows, assemble};
pub use enhancer::{EnhancerConfig, EnhancerConfigUpdate, RelationshipEnhancer};
pub use mysql::MySqlAdapter;
pub use oracle::OracleAdapter;
pub use redis::RedisAdapter;
pub use sqlite::SqliteAdapter;
