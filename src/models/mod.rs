//! Data models for the schema bridge.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{AdapterConfig, DatabaseType, OracleConfig, ServerConfig, SqliteConfig};
pub use query::{QueryParam, QueryResult};
pub use schema::{
    ColumnInfo, ForeignKeyInfo, IndexInfo, RelationshipInfo, RelationshipSource,
    RelationshipType, SchemaInfo, TableInfo,
};
