//! MySQL-protocol adapter (MySQL, MariaDB, GoldenDB).
//!
//! Holds a single `MySqlConnection`. Schema retrieval issues one bulk query per
//! catalog table in `information_schema` and assembles the result in memory.

use std::time::Instant;

use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{Connection, Executor, Row};
use tracing::{debug, info, warn};

use crate::db::adapter::DbAdapter;
use crate::db::assembler::{
    self, CatalogRows, ColumnRow, ForeignKeyRow, IndexRow, PrimaryKeyRow, TableStatsRow,
};
use crate::db::params::bind_params;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam, QueryResult, SchemaInfo, ServerConfig};
use crate::tools::guard;

// =============================================================================
// Catalog Queries
// =============================================================================

mod queries {
    pub const VERSION: &str = "SELECT VERSION() AS version";

    pub const CURRENT_DATABASE: &str = "SELECT DATABASE() AS db";

    pub const COLUMNS: &str = r#"
        SELECT
            CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_COMMENT USING utf8) AS COLUMN_COMMENT
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE()
        ORDER BY TABLE_NAME, ORDINAL_POSITION
        "#;

    pub const INDEXES: &str = r#"
        SELECT
            CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
            CONVERT(INDEX_NAME USING utf8) AS INDEX_NAME,
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            NON_UNIQUE,
            SEQ_IN_INDEX
        FROM information_schema.STATISTICS
        WHERE TABLE_SCHEMA = DATABASE()
        ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX
        "#;

    pub const TABLE_STATS: &str = r#"
        SELECT
            CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
            TABLE_ROWS,
            CONVERT(TABLE_COMMENT USING utf8) AS TABLE_COMMENT
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        AND TABLE_TYPE = 'BASE TABLE'
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(kcu.TABLE_NAME USING utf8) AS TABLE_NAME,
            CONVERT(kcu.CONSTRAINT_NAME USING utf8) AS CONSTRAINT_NAME,
            CONVERT(kcu.COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(kcu.REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
            CONVERT(kcu.REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME,
            CONVERT(rc.DELETE_RULE USING utf8) AS DELETE_RULE,
            CONVERT(rc.UPDATE_RULE USING utf8) AS UPDATE_RULE
        FROM information_schema.KEY_COLUMN_USAGE kcu
        JOIN information_schema.REFERENTIAL_CONSTRAINTS rc
            ON kcu.CONSTRAINT_NAME = rc.CONSTRAINT_NAME
            AND kcu.TABLE_SCHEMA = rc.CONSTRAINT_SCHEMA
            AND kcu.TABLE_NAME = rc.TABLE_NAME
        WHERE kcu.TABLE_SCHEMA = DATABASE()
        AND kcu.REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY kcu.TABLE_NAME, kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;
}

// MySQL server error numbers with a stable meaning.
const ER_DUP_ENTRY: u16 = 1062;
const ER_ACCESS_DENIED: u16 = 1045;
const ER_BAD_DB: u16 = 1049;
const ER_NO_SUCH_TABLE: u16 = 1146;
const ER_BAD_FIELD: u16 = 1054;
const ER_PARSE: u16 = 1064;

/// Adapter for any server speaking the MySQL wire protocol.
pub struct MySqlAdapter {
    config: ServerConfig,
    conn: Option<MySqlConnection>,
}

impl std::fmt::Debug for MySqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlAdapter")
            .field("config", &self.config)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl MySqlAdapter {
    pub fn new(config: ServerConfig) -> Self {
        Self { config, conn: None }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .charset("utf8mb4");
        if let Some(user) = &self.config.user {
            options = options.username(user);
        }
        if let Some(password) = &self.config.password {
            options = options.password(password);
        }
        if let Some(database) = &self.config.database {
            options = options.database(database);
        }
        options
    }

    fn conn(&mut self) -> DbResult<&mut MySqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::not_connected(DatabaseType::MySql))
    }

    async fn read_catalog(conn: &mut MySqlConnection) -> DbResult<CatalogRows> {
        let column_rows = (&mut *conn).fetch_all(queries::COLUMNS).await?;
        let index_rows = (&mut *conn).fetch_all(queries::INDEXES).await?;
        let stats_rows = (&mut *conn).fetch_all(queries::TABLE_STATS).await?;

        let fk_rows = assembler::foreign_key_rows_or_empty(
            DatabaseType::MySql,
            (&mut *conn).fetch_all(queries::FOREIGN_KEYS).await,
        );

        debug!(
            columns = column_rows.len(),
            indexes = index_rows.len(),
            tables = stats_rows.len(),
            foreign_keys = fk_rows.len(),
            "Read MySQL catalog"
        );

        let mut rows = CatalogRows::default();

        for row in &column_rows {
            rows.columns.push(ColumnRow {
                table: get_string(row, "TABLE_NAME"),
                name: get_string(row, "COLUMN_NAME"),
                data_type: get_string(row, "COLUMN_TYPE"),
                nullable: get_string(row, "IS_NULLABLE") == "YES",
                default_value: get_optional_string(row, "COLUMN_DEFAULT"),
                comment: get_optional_string(row, "COLUMN_COMMENT"),
            });
        }

        for row in &index_rows {
            let table = get_string(row, "TABLE_NAME");
            let name = get_string(row, "INDEX_NAME");
            let column = get_string(row, "COLUMN_NAME");
            let is_primary = name == "PRIMARY";
            if is_primary {
                match key_position(try_get_u64(row, "SEQ_IN_INDEX")) {
                    Some(position) => rows.primary_keys.push(PrimaryKeyRow {
                        table: table.clone(),
                        column: column.clone(),
                        position,
                    }),
                    None => warn!(
                        table = %table,
                        column = %column,
                        "Skipping primary-key column without a readable key position"
                    ),
                }
            }
            rows.indexes.push(IndexRow {
                table,
                name,
                column,
                unique: try_get_u64(row, "NON_UNIQUE") == Some(0),
                is_primary,
            });
        }

        for row in &stats_rows {
            rows.stats.push(TableStatsRow {
                table: get_string(row, "TABLE_NAME"),
                estimated_rows: try_get_u64(row, "TABLE_ROWS").unwrap_or(0),
                comment: get_optional_string(row, "TABLE_COMMENT"),
            });
        }

        for row in &fk_rows {
            rows.foreign_keys.push(ForeignKeyRow {
                table: get_string(row, "TABLE_NAME"),
                constraint: get_string(row, "CONSTRAINT_NAME"),
                column: get_string(row, "COLUMN_NAME"),
                referenced_table: get_string(row, "REFERENCED_TABLE_NAME"),
                referenced_column: get_optional_string(row, "REFERENCED_COLUMN_NAME"),
                on_delete: get_optional_string(row, "DELETE_RULE"),
                on_update: get_optional_string(row, "UPDATE_RULE"),
            });
        }

        Ok(rows)
    }
}

impl DbAdapter for MySqlAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySql
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> DbResult<()> {
        if self.conn.is_some() {
            debug!("MySQL adapter already connected");
            return Ok(());
        }

        let options = self.connect_options();
        let mut conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| translate_connect_error(&e, &self.config))?;
        conn.ping()
            .await
            .map_err(|e| translate_connect_error(&e, &self.config))?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            database = ?self.config.database,
            "Connected to MySQL"
        );
        self.conn = Some(conn);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            match conn.close().await {
                Ok(()) => info!("Disconnected from MySQL"),
                Err(e) => warn!(error = %e, "Error while closing MySQL connection"),
            }
        }
    }

    async fn execute_query(
        &mut self,
        statement: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let conn = self.conn()?;
        guard::ensure_single_statement(statement, DatabaseType::MySql)?;
        let start = Instant::now();
        debug!(sql = %statement, params = params.len(), "Executing MySQL statement");

        if guard::mysql_write_keyword(statement).is_some() {
            // Without params, execute raw SQL: some statements cannot be prepared
            let result = if params.is_empty() {
                (&mut *conn).execute(statement).await
            } else {
                bind_params::<MySql>(statement, params)
                    .execute(&mut *conn)
                    .await
            };
            let result = result.map_err(translate_execute_error)?;

            let elapsed = start.elapsed().as_millis() as u64;
            return Ok(QueryResult::write_result(result.rows_affected(), elapsed)
                .with_metadata("lastInsertId", result.last_insert_id()));
        }

        let rows: Result<Vec<MySqlRow>, sqlx::Error> = if params.is_empty() {
            (&mut *conn).fetch_all(statement).await
        } else {
            bind_params::<MySql>(statement, params)
                .fetch_all(&mut *conn)
                .await
        };
        let rows = rows.map_err(translate_execute_error)?;

        let field_count = rows.first().map(|r| r.columns().len()).unwrap_or(0);
        let row_count = rows.len();
        let json_rows = rows.iter().map(|r| r.to_json_map()).collect();
        let elapsed = start.elapsed().as_millis() as u64;

        Ok(QueryResult::with_rows(json_rows, elapsed)
            .with_metadata("fieldCount", field_count)
            .with_metadata("rowCount", row_count))
    }

    async fn get_schema(&mut self) -> DbResult<SchemaInfo> {
        let configured_database = self.config.database.clone();
        let conn = self.conn()?;

        let version: Option<String> = sqlx::query_scalar(queries::VERSION)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| DbError::from(e).into_schema_retrieval())?;
        let current_db: Option<Option<String>> = sqlx::query_scalar(queries::CURRENT_DATABASE)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| DbError::from(e).into_schema_retrieval())?;

        let database_name = current_db
            .flatten()
            .or(configured_database)
            .unwrap_or_else(|| "unknown".to_string());

        let rows = Self::read_catalog(conn)
            .await
            .map_err(DbError::into_schema_retrieval)?;

        Ok(assembler::assemble(
            DatabaseType::MySql,
            database_name,
            version.unwrap_or_else(|| "unknown".to_string()),
            rows,
        ))
    }
}

// =============================================================================
// Error Translation
// =============================================================================

fn mysql_error_number(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|e| e.number()),
        _ => None,
    }
}

/// Translate a connect-time failure into a credential-free connection error.
pub(crate) fn translate_connect_error(err: &sqlx::Error, config: &ServerConfig) -> DbError {
    let endpoint = format!("{}:{}", config.host, config.port);
    match mysql_error_number(err) {
        Some(ER_ACCESS_DENIED) => {
            return DbError::connection(
                format!(
                    "Access denied for user '{}': invalid credentials",
                    config.user.as_deref().unwrap_or("")
                ),
                "Verify the username and password",
            );
        }
        Some(ER_BAD_DB) => {
            return DbError::connection(
                format!(
                    "Unknown database '{}'",
                    config.database.as_deref().unwrap_or("")
                ),
                "Check that the database name exists on the server",
            );
        }
        _ => {}
    }

    match err {
        sqlx::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::ConnectionRefused => {
            DbError::connection(
                format!("No MySQL server listening at {}", endpoint),
                "Check that the server is running and the host/port are correct",
            )
        }
        sqlx::Error::Io(io_err) => DbError::connection(
            format!("Cannot reach {}: {}", endpoint, io_err),
            "Check network connectivity and the host name",
        ),
        sqlx::Error::Tls(tls_err) => DbError::connection(
            format!("TLS error: {}", tls_err),
            "Verify TLS configuration and certificates",
        ),
        sqlx::Error::Database(db_err) => DbError::connection(
            db_err.message().to_string(),
            "Check the server logs for details",
        ),
        other => DbError::connection(
            format!("Failed to connect to {}: {}", endpoint, other),
            "Verify the host, port and credentials",
        ),
    }
}

/// Translate a statement failure, naming the stable cases.
fn translate_execute_error(err: sqlx::Error) -> DbError {
    let code = mysql_error_number(&err);
    let message = match &err {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        _ => return DbError::from(err),
    };
    match code {
        Some(ER_NO_SUCH_TABLE) => DbError::execution(
            format!("Object not found: {}", message),
            code.map(|c| c.to_string()),
            "Check the table name; use the schema to list existing tables",
        ),
        Some(ER_DUP_ENTRY) => DbError::execution(
            format!("Unique constraint violated: {}", message),
            code.map(|c| c.to_string()),
            "A row with the same unique key already exists",
        ),
        Some(ER_BAD_FIELD) => DbError::execution(
            message,
            code.map(|c| c.to_string()),
            "Check the column names against the schema",
        ),
        Some(ER_PARSE) => DbError::execution(
            message,
            code.map(|c| c.to_string()),
            "Check the SQL syntax",
        ),
        _ => DbError::from(err),
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

/// Try to get a u64 value from a row, handling MySQL version differences.
/// MySQL 5.x may return BIGINT (i64), MySQL 8.x returns BIGINT UNSIGNED (u64).
/// 1-based key position; `None` when missing or out of range.
fn key_position(seq_in_index: Option<u64>) -> Option<u32> {
    seq_in_index
        .and_then(|seq| u32::try_from(seq).ok())
        .filter(|seq| *seq > 0)
}

fn try_get_u64(row: &MySqlRow, column: &str) -> Option<u64> {
    if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(column) {
        return Some(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(column) {
        return Some(v.max(0) as u64);
    }
    if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(column) {
        return Some(v as u64);
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(column) {
        return Some(v.max(0) as u64);
    }
    None
}

/// Safely get a string from a MySQL row.
/// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
fn get_string(row: &MySqlRow, column: &str) -> String {
    get_optional_string(row, column).unwrap_or_default()
}

/// Safely get an optional string from a MySQL row.
fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(column)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}
