//! Oracle adapter over the `oracle` crate.
//!
//! The driver is blocking, so every call runs on tokio's blocking pool with a
//! shared handle to the single session. Autocommit stays off: writes become
//! durable only when the caller issues `COMMIT`.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use oracle::sql_type::{OracleType, ToSql};
use oracle::{Connection, Row};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::db::adapter::DbAdapter;
use crate::db::assembler::{
    self, CatalogRows, ColumnRow, ForeignKeyRow, IndexRow, PrimaryKeyRow, TableStatsRow,
};
use crate::db::types::{decode_binary_value, float_to_json};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, OracleConfig, QueryParam, QueryResult, SchemaInfo};
use crate::tools::guard;

mod queries {
    pub const VERSION: &str = "SELECT banner FROM v$version WHERE banner LIKE 'Oracle%'";

    pub const CURRENT_USER: &str = "SELECT USER FROM DUAL";

    pub const PING: &str = "SELECT 1 FROM DUAL";

    pub const COLUMNS: &str = r#"
        SELECT TABLE_NAME, COLUMN_NAME, DATA_TYPE, DATA_LENGTH, DATA_PRECISION,
               DATA_SCALE, NULLABLE, DATA_DEFAULT
        FROM ALL_TAB_COLUMNS
        WHERE OWNER = USER
        ORDER BY TABLE_NAME, COLUMN_ID
        "#;

    pub const COLUMN_COMMENTS: &str = r#"
        SELECT TABLE_NAME, COLUMN_NAME, COMMENTS
        FROM ALL_COL_COMMENTS
        WHERE OWNER = USER
        AND COMMENTS IS NOT NULL
        "#;

    pub const PRIMARY_KEYS: &str = r#"
        SELECT cons.TABLE_NAME, cols.COLUMN_NAME, cols.POSITION, cons.INDEX_NAME
        FROM ALL_CONSTRAINTS cons
        JOIN ALL_CONS_COLUMNS cols
            ON cons.CONSTRAINT_NAME = cols.CONSTRAINT_NAME
            AND cons.OWNER = cols.OWNER
        WHERE cons.CONSTRAINT_TYPE = 'P'
        AND cons.OWNER = USER
        ORDER BY cons.TABLE_NAME, cols.POSITION
        "#;

    pub const INDEXES: &str = r#"
        SELECT i.TABLE_NAME, i.INDEX_NAME, i.UNIQUENESS, ic.COLUMN_NAME
        FROM ALL_INDEXES i
        JOIN ALL_IND_COLUMNS ic
            ON i.INDEX_NAME = ic.INDEX_NAME
            AND i.OWNER = ic.INDEX_OWNER
        WHERE i.OWNER = USER
        AND i.INDEX_TYPE != 'LOB'
        ORDER BY i.TABLE_NAME, i.INDEX_NAME, ic.COLUMN_POSITION
        "#;

    pub const TABLE_STATS: &str = r#"
        SELECT t.TABLE_NAME, t.NUM_ROWS, c.COMMENTS
        FROM ALL_TABLES t
        LEFT JOIN ALL_TAB_COMMENTS c
            ON c.OWNER = t.OWNER
            AND c.TABLE_NAME = t.TABLE_NAME
        WHERE t.OWNER = USER
        AND t.TEMPORARY = 'N'
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            c.TABLE_NAME,
            c.CONSTRAINT_NAME,
            cc.COLUMN_NAME,
            rc.TABLE_NAME AS REFERENCED_TABLE,
            rcc.COLUMN_NAME AS REFERENCED_COLUMN,
            c.DELETE_RULE
        FROM ALL_CONSTRAINTS c
        JOIN ALL_CONS_COLUMNS cc
            ON c.CONSTRAINT_NAME = cc.CONSTRAINT_NAME AND c.OWNER = cc.OWNER
        JOIN ALL_CONSTRAINTS rc
            ON c.R_CONSTRAINT_NAME = rc.CONSTRAINT_NAME AND c.R_OWNER = rc.OWNER
        JOIN ALL_CONS_COLUMNS rcc
            ON rc.CONSTRAINT_NAME = rcc.CONSTRAINT_NAME
            AND rc.OWNER = rcc.OWNER
            AND cc.POSITION = rcc.POSITION
        WHERE c.CONSTRAINT_TYPE = 'R'
        AND c.OWNER = USER
        ORDER BY c.TABLE_NAME, c.CONSTRAINT_NAME, cc.POSITION
        "#;
}

// Oracle error numbers with a stable meaning.
const ORA_UNIQUE_CONSTRAINT: u32 = 1;
const ORA_TABLE_NOT_FOUND: u32 = 942;
const ORA_INVALID_CREDENTIALS: u32 = 1017;
const ORA_UNRESOLVED_IDENTIFIER: u32 = 12154;
const ORA_NO_LISTENER: u32 = 12541;

/// Adapter for an Oracle database.
pub struct OracleAdapter {
    config: OracleConfig,
    conn: Option<Arc<Connection>>,
}

impl std::fmt::Debug for OracleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleAdapter")
            .field("config", &self.config)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl OracleAdapter {
    pub fn new(config: OracleConfig) -> Self {
        Self { config, conn: None }
    }

    /// Run `f` against the session on the blocking pool.
    async fn run_blocking<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(
            self.conn
                .as_ref()
                .ok_or_else(|| DbError::not_connected(DatabaseType::Oracle))?,
        );
        tokio::task::spawn_blocking(move || f(&conn))
            .await
            .map_err(|e| DbError::internal(format!("Oracle worker task failed: {}", e)))?
    }
}

impl DbAdapter for OracleAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Oracle
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> DbResult<()> {
        if self.conn.is_some() {
            debug!("Oracle adapter already connected");
            return Ok(());
        }

        let connect_string = self.config.resolve_connect_string().ok_or_else(|| {
            DbError::connection(
                "No Oracle service given",
                "Set one of connect string, service name, SID or database",
            )
        })?;
        if let Some(dir) = &self.config.client_lib_dir {
            init_client(dir)?;
        }

        let user = self.config.server.user.clone().unwrap_or_default();
        let password = self.config.server.password.clone().unwrap_or_default();
        let target = connect_string.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::connect(&user, &password, &target)?;
            conn.query_row(queries::PING, &[])?;
            Ok::<_, oracle::Error>(conn)
        })
        .await
        .map_err(|e| DbError::internal(format!("Oracle worker task failed: {}", e)))?
        .map_err(|e| translate_connect_error(&e.to_string()))?;

        info!(connect_string = %connect_string, "Connected to Oracle");
        self.conn = Some(Arc::new(conn));
        Ok(())
    }

    async fn disconnect(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let closed = tokio::task::spawn_blocking(move || conn.close()).await;
        match closed {
            Ok(Ok(())) => info!("Disconnected from Oracle"),
            Ok(Err(e)) => warn!(error = %e, "Error while closing Oracle connection"),
            Err(e) => warn!(error = %e, "Oracle close task failed"),
        }
    }

    async fn execute_query(
        &mut self,
        statement: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let sql = strip_statement_terminator(statement).to_string();
        let params = params.to_vec();
        debug!(sql = %sql, params = params.len(), "Executing Oracle statement");

        self.run_blocking(move |conn| {
            let start = Instant::now();
            execute_blocking(conn, &sql, &params, start).map_err(|e| {
                let message = e.to_string();
                translate_execute_error(&message)
            })
        })
        .await
    }

    async fn get_schema(&mut self) -> DbResult<SchemaInfo> {
        self.run_blocking(|conn| {
            let version = match conn.query_row_as::<Option<String>>(queries::VERSION, &[]) {
                Ok(banner) => banner,
                Err(e) => {
                    debug!(error = %e, "Oracle version banner unavailable");
                    None
                }
            };
            let database_name = conn
                .query_row_as::<Option<String>>(queries::CURRENT_USER, &[])
                .map_err(|e| DbError::schema_retrieval(e.to_string()))?;

            let rows = read_catalog(conn).map_err(|e| DbError::schema_retrieval(e.to_string()))?;

            Ok(assembler::assemble(
                DatabaseType::Oracle,
                database_name.unwrap_or_else(|| "unknown".to_string()),
                version.unwrap_or_else(|| "unknown".to_string()),
                rows,
            ))
        })
        .await
    }
}

// =============================================================================
// Client Initialization
// =============================================================================

/// Point the driver at a native client library directory, once per process.
fn init_client(lib_dir: &Path) -> DbResult<()> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();

    INIT.get_or_init(|| {
        let mut params = oracle::InitParams::new();
        params
            .oracle_client_lib_dir(lib_dir)
            .map_err(|e| e.to_string())?;
        match params.init() {
            Ok(true) => {
                info!(lib_dir = %lib_dir.display(), "Oracle client initialized");
                Ok(())
            }
            // Someone else initialized the client first
            Ok(false) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    })
    .clone()
    .map_err(|message| {
        DbError::connection(
            format!("Oracle client initialization failed: {}", message),
            "Check that the client library directory holds an Oracle Instant Client",
        )
    })
}

// =============================================================================
// Statement Execution
// =============================================================================

/// Plain SQL must not end in `;` (ORA-00933). PL/SQL blocks keep theirs.
fn strip_statement_terminator(statement: &str) -> &str {
    let trimmed = statement.trim();
    if guard::leading_keyword(trimmed, &["BEGIN", "DECLARE"]).is_some() {
        return trimmed;
    }
    match trimmed.strip_suffix(';') {
        Some(rest) => rest.trim_end(),
        None => trimmed,
    }
}

fn to_sql_param(param: &QueryParam) -> Box<dyn ToSql> {
    match param {
        QueryParam::Null => Box::new(None::<String>),
        QueryParam::Bool(v) => Box::new(i64::from(*v)),
        QueryParam::Int(v) => Box::new(*v),
        QueryParam::Float(v) => Box::new(*v),
        QueryParam::String(v) => Box::new(v.clone()),
    }
}

fn execute_blocking(
    conn: &Connection,
    sql: &str,
    params: &[QueryParam],
    start: Instant,
) -> oracle::Result<QueryResult> {
    let boxed: Vec<Box<dyn ToSql>> = params.iter().map(to_sql_param).collect();
    let bind: Vec<&dyn ToSql> = boxed.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.statement(sql).build()?;

    if stmt.is_query() {
        let result_set = stmt.query(&bind)?;
        let columns: Vec<(String, OracleType)> = result_set
            .column_info()
            .iter()
            .map(|c| (c.name().to_lowercase(), c.oracle_type().clone()))
            .collect();

        let mut rows = Vec::new();
        for row in result_set {
            rows.push(row_to_json(&row?, &columns)?);
        }
        let elapsed = start.elapsed().as_millis() as u64;
        return Ok(QueryResult::with_rows(rows, elapsed).with_metadata("columnCount", columns.len()));
    }

    stmt.execute(&bind)?;
    let elapsed = start.elapsed().as_millis() as u64;
    if stmt.is_dml() {
        return Ok(QueryResult::write_result(stmt.row_count()?, elapsed));
    }
    Ok(QueryResult::with_rows(Vec::new(), elapsed))
}

fn row_to_json(
    row: &Row,
    columns: &[(String, OracleType)],
) -> oracle::Result<serde_json::Map<String, JsonValue>> {
    let mut map = serde_json::Map::with_capacity(columns.len());
    for ((name, oracle_type), value) in columns.iter().zip(row.sql_values()) {
        let json = if value.is_null()? {
            JsonValue::Null
        } else {
            match oracle_type {
                OracleType::Number(..)
                | OracleType::Float(..)
                | OracleType::BinaryFloat
                | OracleType::BinaryDouble
                | OracleType::Int64
                | OracleType::UInt64 => number_to_json(&value.get::<String>()?),
                OracleType::Raw(..) | OracleType::LongRaw | OracleType::BLOB => {
                    decode_binary_value(&value.get::<Vec<u8>>()?)
                }
                _ => JsonValue::String(value.get::<String>()?),
            }
        };
        map.insert(name.clone(), json);
    }
    Ok(map)
}

/// Oracle numbers arrive as decimal text; keep integers exact.
fn number_to_json(text: &str) -> JsonValue {
    if let Ok(i) = text.parse::<i64>() {
        return JsonValue::from(i);
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => float_to_json(f),
        _ => JsonValue::String(text.to_string()),
    }
}

// =============================================================================
// Catalog
// =============================================================================

fn read_catalog(conn: &Connection) -> oracle::Result<CatalogRows> {
    let column_rows = fetch_all(conn, queries::COLUMNS)?;
    let comment_rows = fetch_all(conn, queries::COLUMN_COMMENTS)?;
    let pk_rows = fetch_all(conn, queries::PRIMARY_KEYS)?;
    let index_rows = fetch_all(conn, queries::INDEXES)?;
    let stats_rows = fetch_all(conn, queries::TABLE_STATS)?;

    let fk_rows = assembler::foreign_key_rows_or_empty(
        DatabaseType::Oracle,
        fetch_all(conn, queries::FOREIGN_KEYS),
    );

    debug!(
        columns = column_rows.len(),
        comments = comment_rows.len(),
        primary_keys = pk_rows.len(),
        indexes = index_rows.len(),
        tables = stats_rows.len(),
        foreign_keys = fk_rows.len(),
        "Read Oracle catalog"
    );

    let mut comments: HashMap<(String, String), String> = HashMap::new();
    for row in &comment_rows {
        let (Some(table), Some(column), Some(comment)) = (
            text(row, "TABLE_NAME"),
            text(row, "COLUMN_NAME"),
            text(row, "COMMENTS"),
        ) else {
            continue;
        };
        comments.insert((table, column), comment);
    }

    let mut rows = CatalogRows::default();

    for row in &column_rows {
        let (Some(table), Some(column)) = (text(row, "TABLE_NAME"), text(row, "COLUMN_NAME"))
        else {
            continue;
        };
        let comment = comments.remove(&(table.clone(), column.clone()));
        rows.columns.push(ColumnRow {
            table: table.to_lowercase(),
            name: column.to_lowercase(),
            data_type: format_oracle_type(
                text(row, "DATA_TYPE").as_deref(),
                number(row, "DATA_LENGTH"),
                number(row, "DATA_PRECISION"),
                number(row, "DATA_SCALE"),
            ),
            nullable: text(row, "NULLABLE").as_deref() == Some("Y"),
            default_value: text(row, "DATA_DEFAULT")
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            comment,
        });
    }

    let mut pk_indexes: HashSet<(String, String)> = HashSet::new();
    for row in &pk_rows {
        let (Some(table), Some(column)) = (text(row, "TABLE_NAME"), text(row, "COLUMN_NAME"))
        else {
            continue;
        };
        if let Some(index) = text(row, "INDEX_NAME") {
            pk_indexes.insert((table.clone(), index));
        }
        rows.primary_keys.push(PrimaryKeyRow {
            table: table.to_lowercase(),
            column: column.to_lowercase(),
            position: number(row, "POSITION").unwrap_or(0).max(0) as u32,
        });
    }

    for row in &index_rows {
        let (Some(table), Some(name), Some(column)) = (
            text(row, "TABLE_NAME"),
            text(row, "INDEX_NAME"),
            text(row, "COLUMN_NAME"),
        ) else {
            continue;
        };
        let is_primary = pk_indexes.contains(&(table.clone(), name.clone()));
        rows.indexes.push(IndexRow {
            table: table.to_lowercase(),
            name,
            column: column.to_lowercase(),
            unique: text(row, "UNIQUENESS").as_deref() == Some("UNIQUE"),
            is_primary,
        });
    }

    for row in &stats_rows {
        let Some(table) = text(row, "TABLE_NAME") else {
            continue;
        };
        rows.stats.push(TableStatsRow {
            table: table.to_lowercase(),
            estimated_rows: number(row, "NUM_ROWS").unwrap_or(0).max(0) as u64,
            comment: text(row, "COMMENTS"),
        });
    }

    for row in &fk_rows {
        let (Some(table), Some(constraint), Some(column), Some(referenced_table)) = (
            text(row, "TABLE_NAME"),
            text(row, "CONSTRAINT_NAME"),
            text(row, "COLUMN_NAME"),
            text(row, "REFERENCED_TABLE"),
        ) else {
            continue;
        };
        rows.foreign_keys.push(ForeignKeyRow {
            table: table.to_lowercase(),
            constraint,
            column: column.to_lowercase(),
            referenced_table: referenced_table.to_lowercase(),
            referenced_column: text(row, "REFERENCED_COLUMN").map(|c| c.to_lowercase()),
            on_delete: text(row, "DELETE_RULE"),
            on_update: None,
        });
    }

    Ok(rows)
}

fn fetch_all(conn: &Connection, sql: &str) -> oracle::Result<Vec<Row>> {
    conn.query(sql, &[])?.collect()
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get::<_, Option<String>>(column).ok().flatten()
}

fn number(row: &Row, column: &str) -> Option<i64> {
    row.get::<_, Option<i64>>(column).ok().flatten()
}

/// Rebuild a declared type from the catalog's split type columns.
fn format_oracle_type(
    data_type: Option<&str>,
    length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    let Some(data_type) = data_type.filter(|t| !t.is_empty()) else {
        return "UNKNOWN".to_string();
    };
    match data_type {
        "NUMBER" => match (precision, scale) {
            (Some(p), Some(s)) if s > 0 => format!("NUMBER({},{})", p, s),
            (Some(p), _) => format!("NUMBER({})", p),
            _ => "NUMBER".to_string(),
        },
        "VARCHAR2" | "CHAR" | "NVARCHAR2" | "NCHAR" | "RAW" => match length {
            Some(len) if len > 0 => format!("{}({})", data_type, len),
            _ => data_type.to_string(),
        },
        "TIMESTAMP" => match scale {
            Some(s) => format!("TIMESTAMP({})", s),
            None => "TIMESTAMP".to_string(),
        },
        other => other.to_string(),
    }
}

// =============================================================================
// Error Translation
// =============================================================================

/// Extract the number of the first `ORA-nnnnn` code in a driver message.
fn ora_code(message: &str) -> Option<u32> {
    let start = message.find("ORA-")? + 4;
    let digits: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn translate_connect_error(message: &str) -> DbError {
    match ora_code(message) {
        Some(ORA_INVALID_CREDENTIALS) => DbError::connection(
            "Invalid username or password",
            "Verify the Oracle username and password",
        ),
        Some(ORA_UNRESOLVED_IDENTIFIER) => DbError::connection(
            "Could not resolve the connect identifier",
            "Check the service name, SID or TNS configuration",
        ),
        Some(ORA_NO_LISTENER) => DbError::connection(
            "No listener at the given host and port",
            "Check that the Oracle listener is running and the port is correct",
        ),
        _ => DbError::connection(
            message.to_string(),
            "Verify the host, port, service and credentials",
        ),
    }
}

fn translate_execute_error(message: &str) -> DbError {
    let code = ora_code(message);
    let code_text = code.map(|c| format!("ORA-{:05}", c));
    match code {
        Some(ORA_TABLE_NOT_FOUND) => DbError::execution(
            "Table or view does not exist",
            code_text,
            "Check the object name and that the current user can see it",
        ),
        Some(ORA_UNIQUE_CONSTRAINT) => DbError::execution(
            "Unique constraint violated",
            code_text,
            "A row with the same unique key already exists",
        ),
        _ => DbError::execution(
            message.to_string(),
            code_text,
            "Check the SQL syntax and referenced objects",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServerConfig;

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_statement_terminator("SELECT 1 FROM DUAL;"), "SELECT 1 FROM DUAL");
        assert_eq!(strip_statement_terminator("  SELECT 1 FROM DUAL ;  "), "SELECT 1 FROM DUAL");
        assert_eq!(strip_statement_terminator("SELECT 1 FROM DUAL"), "SELECT 1 FROM DUAL");
        assert_eq!(
            strip_statement_terminator("BEGIN update_stats(); END;"),
            "BEGIN update_stats(); END;"
        );
        assert_eq!(
            strip_statement_terminator("declare x number; begin null; end;"),
            "declare x number; begin null; end;"
        );
    }

    #[test]
    fn test_format_oracle_type() {
        assert_eq!(format_oracle_type(Some("NUMBER"), Some(22), Some(10), Some(2)), "NUMBER(10,2)");
        assert_eq!(format_oracle_type(Some("NUMBER"), Some(22), Some(10), Some(0)), "NUMBER(10)");
        assert_eq!(format_oracle_type(Some("NUMBER"), Some(22), None, None), "NUMBER");
        assert_eq!(format_oracle_type(Some("VARCHAR2"), Some(100), None, None), "VARCHAR2(100)");
        assert_eq!(format_oracle_type(Some("RAW"), Some(16), None, None), "RAW(16)");
        assert_eq!(format_oracle_type(Some("TIMESTAMP"), Some(11), None, Some(6)), "TIMESTAMP(6)");
        assert_eq!(format_oracle_type(Some("DATE"), Some(7), None, None), "DATE");
        assert_eq!(format_oracle_type(None, None, None, None), "UNKNOWN");
    }

    #[test]
    fn test_ora_code() {
        assert_eq!(ora_code("ORA-01017: invalid username/password; logon denied"), Some(1017));
        assert_eq!(ora_code("ORA-12541: TNS:no listener"), Some(12541));
        assert_eq!(ora_code("DPI-1047: Cannot locate a 64-bit Oracle Client library"), None);
    }

    #[test]
    fn test_translate_connect_error() {
        let err = translate_connect_error("ORA-01017: invalid username/password; logon denied");
        assert!(err.to_string().contains("Invalid username or password"));
        let err = translate_connect_error("ORA-12154: TNS:could not resolve");
        assert!(err.to_string().contains("resolve"));
        let err = translate_connect_error("ORA-12541: TNS:no listener");
        assert!(err.to_string().contains("No listener"));
    }

    #[test]
    fn test_translate_execute_error() {
        let err = translate_execute_error("ORA-00942: table or view does not exist");
        match err {
            DbError::Execution { message, code, .. } => {
                assert_eq!(message, "Table or view does not exist");
                assert_eq!(code.as_deref(), Some("ORA-00942"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let err = translate_execute_error("ORA-00001: unique constraint (APP.PK) violated");
        assert!(err.to_string().contains("Unique constraint"));
    }

    #[test]
    fn test_number_to_json() {
        assert_eq!(number_to_json("42"), JsonValue::from(42));
        assert_eq!(number_to_json("3.5"), JsonValue::from(3.5));
        assert_eq!(
            number_to_json("123456789012345678901234567890"),
            JsonValue::from(1.2345678901234568e29)
        );
    }

    #[tokio::test]
    async fn test_connect_without_service_fails() {
        let mut adapter = OracleAdapter::new(OracleConfig::new(ServerConfig::new("localhost", 1521)));
        let err = adapter.connect().await.unwrap_err();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(!adapter.is_connected());
    }
}
