//! A guarded database session.
//!
//! `DatabaseSession` pairs one adapter with the read-only guard and an optional
//! relationship enhancer. It is what the CLI drives: statements are classified
//! before they reach the backend, and schemas come back enhanced.

use tracing::{debug, info};

use crate::db::{Adapter, DbAdapter, RelationshipEnhancer};
use crate::error::DbResult;
use crate::models::{AdapterConfig, DatabaseType, QueryParam, QueryResult, SchemaInfo};
use crate::tools::guard;

#[derive(Debug)]
pub struct DatabaseSession {
    adapter: Adapter,
    allow_write: bool,
    enhancer: Option<RelationshipEnhancer>,
}

impl DatabaseSession {
    /// Read-only session with the default enhancer.
    pub fn new(config: AdapterConfig) -> Self {
        Self::from_adapter(Adapter::new(config))
    }

    pub fn from_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            allow_write: false,
            enhancer: Some(RelationshipEnhancer::default()),
        }
    }

    /// Permit write statements.
    pub fn with_allow_write(mut self, allow_write: bool) -> Self {
        self.allow_write = allow_write;
        self
    }

    /// Replace the enhancer; `None` returns schemas as the catalog reports them.
    pub fn with_enhancer(mut self, enhancer: Option<RelationshipEnhancer>) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn database_type(&self) -> DatabaseType {
        self.adapter.database_type()
    }

    pub fn allow_write(&self) -> bool {
        self.allow_write
    }

    pub fn enhancer(&self) -> Option<&RelationshipEnhancer> {
        self.enhancer.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    pub async fn connect(&mut self) -> DbResult<()> {
        self.adapter.connect().await
    }

    pub async fn disconnect(&mut self) {
        self.adapter.disconnect().await
    }

    /// Run one statement after the read-only check.
    ///
    /// Rejected writes never reach the backend, connected or not.
    pub async fn execute_query(
        &mut self,
        statement: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        guard::validate_query(statement, self.database_type(), self.allow_write)?;
        self.adapter.execute_query(statement, params).await
    }

    /// Fetch the schema and enhance its relationships when an enhancer is set.
    pub async fn get_schema(&mut self) -> DbResult<SchemaInfo> {
        let schema = self.adapter.get_schema().await?;
        info!(
            database = %schema.database_name,
            tables = schema.tables.len(),
            "Schema retrieved"
        );
        match &self.enhancer {
            Some(enhancer) => {
                let enhanced = enhancer.enhance_schema(schema);
                debug!(
                    relationships = enhanced.relationships().len(),
                    "Relationships enhanced"
                );
                Ok(enhanced)
            }
            None => Ok(schema),
        }
    }
}
