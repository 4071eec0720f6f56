//! Error types for the schema bridge.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each variant carries a human-readable cause, translated from backend-native
//! error codes where a stable code exists, so that an AI assistant can diagnose
//! misconfiguration without ever seeing credentials.

use crate::models::DatabaseType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Not connected to {database_type}: call connect() first")]
    NotConnected { database_type: DatabaseType },

    #[error("Query execution failed: {message}")]
    Execution {
        message: String,
        /// Backend error code, e.g. "1146" (MySQL) or "ORA-00942"
        code: Option<String>,
        suggestion: String,
    },

    #[error("Schema retrieval failed: {message}")]
    SchemaRetrieval { message: String },

    #[error(
        "Operation rejected: the session is in read-only safety mode and a write operation ({keyword}) was detected. To execute write statements, restart with {flag}."
    )]
    SafetyRejection { keyword: String, flag: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a not-connected error for the given backend.
    pub fn not_connected(database_type: DatabaseType) -> Self {
        Self::NotConnected { database_type }
    }

    /// Create an execution error with an optional backend code.
    pub fn execution(
        message: impl Into<String>,
        code: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            code,
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema retrieval error.
    pub fn schema_retrieval(message: impl Into<String>) -> Self {
        Self::SchemaRetrieval {
            message: message.into(),
        }
    }

    /// Create a safety rejection naming the detected keyword and the enabling flag.
    pub fn safety_rejection(keyword: impl Into<String>, flag: impl Into<String>) -> Self {
        Self::SafetyRejection {
            keyword: keyword.into(),
            flag: flag.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Re-wrap a catalog query failure as a schema retrieval error.
    ///
    /// `NotConnected` passes through untouched so callers can still tell the
    /// two apart.
    pub fn into_schema_retrieval(self) -> Self {
        match self {
            Self::NotConnected { .. } | Self::SchemaRetrieval { .. } => self,
            Self::Execution { message, .. }
            | Self::Connection { message, .. }
            | Self::InvalidInput { message }
            | Self::Internal { message } => Self::SchemaRetrieval { message },
            Self::SafetyRejection { keyword, .. } => Self::SchemaRetrieval {
                message: format!("catalog query rejected ({keyword})"),
            },
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Execution { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Convert sqlx errors raised while a session is live into DbError.
///
/// Connect-time failures are translated by the owning adapter instead, since
/// the same driver error means something different before a session exists.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                if db_err.is_unique_violation() {
                    return DbError::execution(
                        format!("Unique constraint violated: {}", db_err.message()),
                        code,
                        "A row with the same unique key already exists",
                    );
                }
                if db_err.is_foreign_key_violation() {
                    return DbError::execution(
                        format!("Foreign key constraint violated: {}", db_err.message()),
                        code,
                        "Check that the referenced row exists",
                    );
                }
                DbError::execution(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::execution(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::execution(
                format!("Column not found: {}", col),
                None,
                "Check the column names in the statement",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            other => DbError::execution(
                other.to_string(),
                None,
                "Check the statement and the database server logs",
            ),
        }
    }
}

impl From<redis::RedisError> for DbError {
    fn from(err: redis::RedisError) -> Self {
        let code = err.code().map(|c| c.to_string());
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            return DbError::connection(
                format!("Redis connection error: {}", err),
                "Check that the Redis server is running and reachable",
            );
        }
        DbError::execution(
            format!("Redis command failed: {}", err),
            code,
            "Check the command name and its arguments",
        )
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
