//! Adapter capability contract and backend dispatch.
//!
//! Every backend implements [`DbAdapter`]. The closed set of backends is the
//! [`Adapter`] enum, chosen once from an [`AdapterConfig`]; calls are forwarded
//! with [`impl_adapter_dispatch!`] instead of trait objects.

use crate::db::mysql::MySqlAdapter;
use crate::db::oracle::OracleAdapter;
use crate::db::redis::RedisAdapter;
use crate::db::sqlite::SqliteAdapter;
use crate::error::DbResult;
use crate::models::{AdapterConfig, DatabaseType, QueryParam, QueryResult, SchemaInfo};
use crate::tools::guard;

/// Operations every backend supports.
///
/// One adapter owns at most one live connection. Callers serialize calls on an
/// instance; nothing runs in the background between calls.
#[allow(async_fn_in_trait)]
pub trait DbAdapter {
    /// Backend family of this adapter.
    fn database_type(&self) -> DatabaseType;

    /// Whether a live session is held.
    fn is_connected(&self) -> bool;

    /// Open the session. Failures carry a translated, credential-free cause.
    async fn connect(&mut self) -> DbResult<()>;

    /// Close the session. A no-op when not connected; close errors are logged
    /// and swallowed.
    async fn disconnect(&mut self);

    /// Run exactly one statement with positional parameters.
    async fn execute_query(
        &mut self,
        statement: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult>;

    /// Read the catalog and assemble the normalized schema.
    async fn get_schema(&mut self) -> DbResult<SchemaInfo>;

    /// The keyword or command that makes `statement` a write, if any.
    fn write_keyword(&self, statement: &str) -> Option<&'static str> {
        guard::write_keyword(statement, self.database_type())
    }

    /// Pure read/write predicate.
    fn is_write_operation(&self, statement: &str) -> bool {
        self.write_keyword(statement).is_some()
    }
}

/// Macro for forwarding a call to whichever backend an [`Adapter`] holds.
///
/// # Example
///
/// ```ignore
/// impl_adapter_dispatch!(self, a => a.connect().await)
/// ```
#[macro_export]
macro_rules! impl_adapter_dispatch {
    ($adapter:expr, $a:ident => $body:expr) => {
        match $adapter {
            $crate::db::adapter::Adapter::MySql($a) => $body,
            $crate::db::adapter::Adapter::Oracle($a) => $body,
            $crate::db::adapter::Adapter::Sqlite($a) => $body,
            $crate::db::adapter::Adapter::Redis($a) => $body,
        }
    };
}

pub use impl_adapter_dispatch;

/// One adapter of any supported backend.
#[derive(Debug)]
pub enum Adapter {
    MySql(MySqlAdapter),
    Oracle(OracleAdapter),
    Sqlite(SqliteAdapter),
    Redis(RedisAdapter),
}

impl Adapter {
    /// Build an unconnected adapter for `config`.
    pub fn new(config: AdapterConfig) -> Self {
        match config {
            AdapterConfig::MySql(c) => Self::MySql(MySqlAdapter::new(c)),
            AdapterConfig::Oracle(c) => Self::Oracle(OracleAdapter::new(c)),
            AdapterConfig::Sqlite(c) => Self::Sqlite(SqliteAdapter::new(c)),
            AdapterConfig::Redis(c) => Self::Redis(RedisAdapter::new(c)),
        }
    }
}

impl DbAdapter for Adapter {
    fn database_type(&self) -> DatabaseType {
        impl_adapter_dispatch!(self, a => a.database_type())
    }

    fn is_connected(&self) -> bool {
        impl_adapter_dispatch!(self, a => a.is_connected())
    }

    async fn connect(&mut self) -> DbResult<()> {
        impl_adapter_dispatch!(self, a => a.connect().await)
    }

    async fn disconnect(&mut self) {
        impl_adapter_dispatch!(self, a => a.disconnect().await)
    }

    async fn execute_query(
        &mut self,
        statement: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        impl_adapter_dispatch!(self, a => a.execute_query(statement, params).await)
    }

    async fn get_schema(&mut self) -> DbResult<SchemaInfo> {
        impl_adapter_dispatch!(self, a => a.get_schema().await)
    }

    fn write_keyword(&self, statement: &str) -> Option<&'static str> {
        impl_adapter_dispatch!(self, a => a.write_keyword(statement))
    }
}
