//! DB Schema Bridge Library
//!
//! A uniform query and schema introspection layer over heterogeneous databases
//! (MySQL-protocol servers, Oracle, SQLite and Redis), built so an AI assistant
//! can read a normalized schema with inferred relationships and run guarded
//! statements.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod tools;

pub use config::Config;
pub use error::{DbError, DbResult};
pub use tools::DatabaseSession;
