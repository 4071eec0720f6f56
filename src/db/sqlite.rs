//! Embedded-file adapter over sqlx SQLite.
//!
//! Catalog reads join `sqlite_master` with the pragma table-valued functions
//! (`pragma_table_info`, `pragma_index_list`, `pragma_index_info`,
//! `pragma_foreign_key_list`), so a schema costs a fixed number of statements
//! however many tables the file holds. Row counts are exact `COUNT(*)` values
//! gathered with one `UNION ALL` statement per chunk of tables.

use std::time::Instant;

use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Connection, Executor, Row};
use tracing::{debug, info, warn};

use crate::db::adapter::DbAdapter;
use crate::db::assembler::{
    self, CatalogRows, ColumnRow, ForeignKeyRow, IndexRow, PrimaryKeyRow, TableStatsRow,
};
use crate::db::params::bind_params;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam, QueryResult, SchemaInfo, SqliteConfig};
use crate::tools::guard;

mod queries {
    pub const VERSION: &str = "SELECT sqlite_version()";

    pub const TABLES: &str = r#"
        SELECT name FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
        ORDER BY name
        "#;

    pub const COLUMNS: &str = r#"
        SELECT
            m.name AS table_name,
            p.name AS column_name,
            p.type AS data_type,
            p."notnull" AS not_null,
            p.dflt_value AS default_value,
            p.pk AS pk_position
        FROM sqlite_master m
        JOIN pragma_table_info(m.name) p
        WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite\_%' ESCAPE '\'
        ORDER BY m.name, p.cid
        "#;

    pub const INDEXES: &str = r#"
        SELECT
            m.name AS table_name,
            il.name AS index_name,
            il."unique" AS is_unique,
            il.origin AS origin,
            ii.name AS column_name
        FROM sqlite_master m
        JOIN pragma_index_list(m.name) il
        JOIN pragma_index_info(il.name) ii
        WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite\_%' ESCAPE '\'
        ORDER BY m.name, il.name, ii.seqno
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            m.name AS table_name,
            fk.id AS fk_id,
            fk."table" AS referenced_table,
            fk."from" AS column_name,
            fk."to" AS referenced_column,
            fk.on_update AS on_update,
            fk.on_delete AS on_delete
        FROM sqlite_master m
        JOIN pragma_foreign_key_list(m.name) fk
        WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite\_%' ESCAPE '\'
        ORDER BY m.name, fk.id, fk.seq
        "#;
}

/// Tables counted per `UNION ALL` statement; stays under SQLite's
/// compound-select limit.
const COUNT_CHUNK_SIZE: usize = 200;

/// Adapter for a single SQLite database file.
pub struct SqliteAdapter {
    config: SqliteConfig,
    conn: Option<SqliteConnection>,
}

impl std::fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("config", &self.config)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl SqliteAdapter {
    pub fn new(config: SqliteConfig) -> Self {
        Self { config, conn: None }
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.config.file_path)
            .create_if_missing(!self.config.readonly)
            .read_only(self.config.readonly)
            .foreign_keys(true)
    }

    fn conn(&mut self) -> DbResult<&mut SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::not_connected(DatabaseType::Sqlite))
    }

    async fn read_catalog(conn: &mut SqliteConnection) -> DbResult<CatalogRows> {
        Self::read_catalog_with(conn, queries::FOREIGN_KEYS).await
    }

    async fn read_catalog_with(
        conn: &mut SqliteConnection,
        foreign_keys_query: &str,
    ) -> DbResult<CatalogRows> {
        let table_rows = (&mut *conn).fetch_all(queries::TABLES).await?;
        let column_rows = (&mut *conn).fetch_all(queries::COLUMNS).await?;
        let index_rows = (&mut *conn).fetch_all(queries::INDEXES).await?;

        let fk_rows = assembler::foreign_key_rows_or_empty(
            DatabaseType::Sqlite,
            (&mut *conn).fetch_all(foreign_keys_query).await,
        );

        let tables: Vec<String> = table_rows
            .iter()
            .filter_map(|row| get_optional_string(row, "name"))
            .collect();
        let stats = count_rows(conn, &tables).await;

        debug!(
            tables = tables.len(),
            columns = column_rows.len(),
            indexes = index_rows.len(),
            foreign_keys = fk_rows.len(),
            "Read SQLite catalog"
        );

        let mut rows = CatalogRows {
            stats,
            ..CatalogRows::default()
        };

        for row in &column_rows {
            let table = get_string(row, "table_name");
            let name = get_string(row, "column_name");
            let pk_position = get_i64(row, "pk_position");
            if pk_position > 0 {
                rows.primary_keys.push(PrimaryKeyRow {
                    table: table.clone(),
                    column: name.clone(),
                    position: pk_position as u32,
                });
            }
            rows.columns.push(ColumnRow {
                table,
                name,
                data_type: get_string(row, "data_type"),
                nullable: get_i64(row, "not_null") == 0,
                default_value: get_optional_string(row, "default_value"),
                comment: None,
            });
        }

        for row in &index_rows {
            // Expression index members have no column name
            let Some(column) = get_optional_string(row, "column_name") else {
                continue;
            };
            rows.indexes.push(IndexRow {
                table: get_string(row, "table_name"),
                name: get_string(row, "index_name"),
                column,
                unique: get_i64(row, "is_unique") != 0,
                is_primary: get_string(row, "origin") == "pk",
            });
        }

        for row in &fk_rows {
            let table = get_string(row, "table_name");
            let constraint = format!("fk_{}_{}", table, get_i64(row, "fk_id"));
            rows.foreign_keys.push(ForeignKeyRow {
                table,
                constraint,
                column: get_string(row, "column_name"),
                referenced_table: get_string(row, "referenced_table"),
                referenced_column: get_optional_string(row, "referenced_column"),
                on_delete: referential_action(get_optional_string(row, "on_delete")),
                on_update: referential_action(get_optional_string(row, "on_update")),
            });
        }

        Ok(rows)
    }
}

impl DbAdapter for SqliteAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> DbResult<()> {
        if self.conn.is_some() {
            debug!("SQLite adapter already connected");
            return Ok(());
        }

        let options = self.connect_options();
        let conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| translate_open_error(&e, &self.config))?;

        info!(
            file = %self.config.file_path.display(),
            readonly = self.config.readonly,
            "Opened SQLite database"
        );
        self.conn = Some(conn);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            match conn.close().await {
                Ok(()) => info!("Closed SQLite database"),
                Err(e) => warn!(error = %e, "Error while closing SQLite database"),
            }
        }
    }

    async fn execute_query(
        &mut self,
        statement: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let conn = self.conn()?;
        guard::ensure_single_statement(statement, DatabaseType::Sqlite)?;
        let start = Instant::now();
        debug!(sql = %statement, params = params.len(), "Executing SQLite statement");

        if guard::sql_write_keyword(statement).is_some() {
            let result = if params.is_empty() {
                (&mut *conn).execute(statement).await
            } else {
                bind_params::<Sqlite>(statement, params)
                    .execute(&mut *conn)
                    .await
            };
            let result = result?;

            let elapsed = start.elapsed().as_millis() as u64;
            return Ok(QueryResult::write_result(result.rows_affected(), elapsed)
                .with_metadata("lastInsertRowid", result.last_insert_rowid()));
        }

        let rows: Result<Vec<SqliteRow>, sqlx::Error> = if params.is_empty() {
            (&mut *conn).fetch_all(statement).await
        } else {
            bind_params::<Sqlite>(statement, params)
                .fetch_all(&mut *conn)
                .await
        };
        let rows = rows?;

        let field_count = rows.first().map(|r| r.columns().len()).unwrap_or(0);
        let row_count = rows.len();
        let json_rows = rows.iter().map(|r| r.to_json_map()).collect();
        let elapsed = start.elapsed().as_millis() as u64;

        Ok(QueryResult::with_rows(json_rows, elapsed)
            .with_metadata("fieldCount", field_count)
            .with_metadata("rowCount", row_count))
    }

    async fn get_schema(&mut self) -> DbResult<SchemaInfo> {
        let database_name = self.config.database_name();
        let conn = self.conn()?;

        let version: String = sqlx::query_scalar(queries::VERSION)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| DbError::from(e).into_schema_retrieval())?;

        let rows = Self::read_catalog(conn)
            .await
            .map_err(DbError::into_schema_retrieval)?;

        Ok(assembler::assemble(
            DatabaseType::Sqlite,
            database_name,
            version,
            rows,
        ))
    }
}

/// Count rows of every table, `COUNT_CHUNK_SIZE` tables per statement.
///
/// Counts are advisory. When a batch fails (a virtual table whose module is
/// not loaded, say) its tables are counted one by one, and a table that still
/// cannot be counted is logged and left without an estimate.
async fn count_rows(conn: &mut SqliteConnection, tables: &[String]) -> Vec<TableStatsRow> {
    let mut stats = Vec::with_capacity(tables.len());
    for chunk in tables.chunks(COUNT_CHUNK_SIZE) {
        let sql = count_statement(chunk);
        match (&mut *conn).fetch_all(sql.as_str()).await {
            Ok(rows) => stats.extend(rows.iter().map(stats_row)),
            Err(e) => {
                debug!(
                    error = %e,
                    tables = chunk.len(),
                    "Batched row count failed, counting tables one by one"
                );
                for table in chunk {
                    let sql = count_statement(std::slice::from_ref(table));
                    match (&mut *conn).fetch_all(sql.as_str()).await {
                        Ok(rows) => stats.extend(rows.iter().map(stats_row)),
                        Err(e) => warn!(
                            table = %table,
                            error = %e,
                            "Cannot count rows, leaving table without an estimate"
                        ),
                    }
                }
            }
        }
    }
    stats
}

fn stats_row(row: &SqliteRow) -> TableStatsRow {
    TableStatsRow {
        table: get_string(row, "table_name"),
        estimated_rows: get_i64(row, "row_count").max(0) as u64,
        comment: None,
    }
}

fn count_statement(tables: &[String]) -> String {
    tables
        .iter()
        .map(|table| {
            format!(
                "SELECT {} AS table_name, COUNT(*) AS row_count FROM {}",
                quote_literal(table),
                quote_identifier(table)
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ALL ")
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQLite reports the default action as `NO ACTION`; that is the same as none.
fn referential_action(action: Option<String>) -> Option<String> {
    action.filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case("NO ACTION"))
}

fn translate_open_error(err: &sqlx::Error, config: &SqliteConfig) -> DbError {
    let path = config.file_path.display();
    let suggestion = if config.readonly {
        "Read-only mode never creates the file; check that the path exists and is readable"
    } else {
        "Check that the directory exists and is writable"
    };
    match err {
        sqlx::Error::Database(db_err) => DbError::connection(
            format!("Cannot open SQLite database {}: {}", path, db_err.message()),
            suggestion,
        ),
        other => DbError::connection(
            format!("Cannot open SQLite database {}: {}", path, other),
            suggestion,
        ),
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

fn get_string(row: &SqliteRow, column: &str) -> String {
    get_optional_string(row, column).unwrap_or_default()
}

fn get_optional_string(row: &SqliteRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column).ok().flatten()
}

fn get_i64(row: &SqliteRow, column: &str) -> i64 {
    row.try_get::<Option<i64>, _>(column)
        .ok()
        .flatten()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_statement_quotes_names() {
        let sql = count_statement(&["users".to_string(), "it's \"odd\"".to_string()]);
        assert_eq!(
            sql,
            "SELECT 'users' AS table_name, COUNT(*) AS row_count FROM \"users\" UNION ALL \
             SELECT 'it''s \"odd\"' AS table_name, COUNT(*) AS row_count FROM \"it's \"\"odd\"\"\""
        );
    }

    #[test]
    fn test_no_action_is_absent() {
        assert_eq!(referential_action(Some("NO ACTION".into())), None);
        assert_eq!(referential_action(Some(String::new())), None);
        assert_eq!(referential_action(None), None);
        assert_eq!(
            referential_action(Some("CASCADE".into())),
            Some("CASCADE".to_string())
        );
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.db");
        let mut adapter = SqliteAdapter::new(SqliteConfig::new(&path));
        adapter.connect().await.unwrap();
        assert!(path.exists());
        assert!(adapter.is_connected());

        // A second connect reuses the open session
        adapter.connect().await.unwrap();

        let result = adapter.execute_query("SELECT 1 AS one", &[]).await.unwrap();
        assert_eq!(result.rows[0]["one"], 1);
        assert_eq!(result.metadata["fieldCount"], 1);

        adapter.disconnect().await;
        assert!(!adapter.is_connected());
    }

    async fn connected(dir: &tempfile::TempDir) -> SqliteAdapter {
        let mut adapter = SqliteAdapter::new(SqliteConfig::new(dir.path().join("catalog.db")));
        adapter.connect().await.unwrap();
        for statement in [
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id))",
            "INSERT INTO users (name) VALUES ('ada'), ('grace')",
        ] {
            adapter.execute_query(statement, &[]).await.unwrap();
        }
        adapter
    }

    #[tokio::test]
    async fn test_failed_foreign_key_read_still_assembles_schema() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = connected(&dir).await;
        let conn = adapter.conn().unwrap();

        let rows = SqliteAdapter::read_catalog_with(conn, "SELECT * FROM missing_fk_catalog")
            .await
            .unwrap();
        assert!(rows.foreign_keys.is_empty());

        let schema = assembler::assemble(DatabaseType::Sqlite, "catalog.db", "3", rows);
        assert!(schema.relationships.is_none());
        assert!(schema.table("orders").unwrap().foreign_keys.is_none());
        assert_eq!(schema.table("users").unwrap().estimated_rows, 2);

        // The real catalog query does find the key
        let schema = adapter.get_schema().await.unwrap();
        assert_eq!(schema.relationships().len(), 1);
    }

    #[tokio::test]
    async fn test_uncountable_table_does_not_fail_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = connected(&dir).await;
        let conn = adapter.conn().unwrap();

        let tables = vec![
            "orders".to_string(),
            "vanished".to_string(),
            "users".to_string(),
        ];
        let stats = count_rows(conn, &tables).await;

        let counted: Vec<(&str, u64)> = stats
            .iter()
            .map(|s| (s.table.as_str(), s.estimated_rows))
            .collect();
        assert_eq!(counted, vec![("orders", 0), ("users", 2)]);
    }

    #[tokio::test]
    async fn test_readonly_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let mut adapter = SqliteAdapter::new(SqliteConfig::new(&path).with_readonly(true));

        let err = adapter.connect().await.unwrap_err();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(!path.exists());
    }
}
