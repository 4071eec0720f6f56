//! Key-value adapter over the `redis` crate.
//!
//! Statements are command lines (`HGETALL user:1`). Replies are shaped into
//! rows so callers can treat them like a result set, and the schema is a set of
//! virtual tables describing a sample of the keyspace.

use std::collections::BTreeMap;
use std::time::Instant;

use redis::aio::MultiplexedConnection;
use redis::{ErrorKind, Value};
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use url::Url;

use crate::db::adapter::DbAdapter;
use crate::db::types::{decode_binary_value, float_to_json};
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnInfo, DatabaseType, QueryParam, QueryResult, SchemaInfo, ServerConfig, TableInfo,
};

/// Upper bound on keys sampled for the schema.
const KEY_SAMPLE_LIMIT: usize = 100;

/// Virtual table describing the server itself.
const OVERVIEW_TABLE: &str = "_overview";

/// Adapter for a Redis database.
pub struct RedisAdapter {
    config: ServerConfig,
    conn: Option<MultiplexedConnection>,
}

impl std::fmt::Debug for RedisAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAdapter")
            .field("config", &self.config)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl RedisAdapter {
    pub fn new(config: ServerConfig) -> Self {
        Self { config, conn: None }
    }

    /// Logical database index; `database` holds it as text, default 0.
    fn database_index(&self) -> DbResult<u32> {
        match self.config.database.as_deref().map(str::trim) {
            None | Some("") => Ok(0),
            Some(db) => db.parse().map_err(|_| {
                DbError::invalid_input(format!(
                    "Redis database must be a non-negative integer, got '{}'",
                    db
                ))
            }),
        }
    }

    /// Build the `redis://` URL. Credentials go through `Url` so they are
    /// percent-encoded.
    fn connection_url(&self) -> DbResult<Url> {
        let mut url = Url::parse(&format!(
            "redis://{}:{}/{}",
            self.config.host,
            self.config.port,
            self.database_index()?
        ))
        .map_err(|e| DbError::invalid_input(format!("Invalid Redis host: {}", e)))?;

        if let Some(user) = self.config.user.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(user)
                .map_err(|_| DbError::invalid_input("Redis user cannot be set on this URL"))?;
        }
        if let Some(password) = self.config.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| DbError::invalid_input("Redis password cannot be set on this URL"))?;
        }
        Ok(url)
    }

    fn conn(&mut self) -> DbResult<&mut MultiplexedConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::not_connected(DatabaseType::Redis))
    }
}

impl DbAdapter for RedisAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Redis
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> DbResult<()> {
        if self.conn.is_some() {
            debug!("Redis adapter already connected");
            return Ok(());
        }

        let url = self.connection_url()?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| translate_connect_error(&e, &self.config))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| translate_connect_error(&e, &self.config))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| translate_connect_error(&e, &self.config))?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            database = self.database_index()?,
            "Connected to Redis"
        );
        self.conn = Some(conn);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            info!("Disconnected from Redis");
        }
    }

    async fn execute_query(
        &mut self,
        statement: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let conn = self.conn()?;

        let mut parts = statement.split_whitespace();
        let command = parts
            .next()
            .ok_or_else(|| DbError::invalid_input("Empty Redis command"))?
            .to_uppercase();

        let mut cmd = redis::cmd(&command);
        for arg in parts {
            cmd.arg(arg);
        }
        for param in params {
            cmd.arg(param.to_argument());
        }

        debug!(command = %command, params = params.len(), "Executing Redis command");
        let start = Instant::now();
        let reply: Value = cmd.query_async(conn).await?;
        let elapsed = start.elapsed().as_millis() as u64;

        let rows = shape_reply(&command, &reply);
        Ok(QueryResult::with_rows(rows, elapsed)
            .with_metadata("command", command)
            .with_metadata("rawResult", value_to_json(&reply)))
    }

    async fn get_schema(&mut self) -> DbResult<SchemaInfo> {
        let database_name = format!("db{}", self.database_index()?);
        let conn = self.conn()?;

        let info: String = redis::cmd("INFO")
            .arg("server")
            .query_async(&mut *conn)
            .await
            .map_err(|e| DbError::from(e).into_schema_retrieval())?;
        let version = parse_server_version(&info).unwrap_or_else(|| "unknown".to_string());

        let keys = sample_keys(conn)
            .await
            .map_err(|e| DbError::from(e).into_schema_retrieval())?;
        let types: Vec<String> = if keys.is_empty() {
            Vec::new()
        } else {
            let mut pipe = redis::pipe();
            for key in &keys {
                pipe.cmd("TYPE").arg(key);
            }
            pipe.query_async(&mut *conn)
                .await
                .map_err(|e| DbError::from(e).into_schema_retrieval())?
        };

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for key_type in types {
            *counts.entry(key_type).or_default() += 1;
        }
        debug!(keys = keys.len(), types = counts.len(), "Sampled Redis keyspace");

        Ok(SchemaInfo {
            database_type: DatabaseType::Redis,
            database_name,
            version,
            tables: keyspace_tables(&counts),
            relationships: None,
        })
    }
}

/// Collect up to `KEY_SAMPLE_LIMIT` keys with `SCAN`.
async fn sample_keys(conn: &mut MultiplexedConnection) -> redis::RedisResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("COUNT")
            .arg(KEY_SAMPLE_LIMIT)
            .query_async(&mut *conn)
            .await?;
        keys.extend(batch);
        if next == 0 || keys.len() >= KEY_SAMPLE_LIMIT {
            break;
        }
        cursor = next;
    }
    keys.truncate(KEY_SAMPLE_LIMIT);
    Ok(keys)
}

/// Build the virtual tables: the overview plus one table per sampled key type.
fn keyspace_tables(counts: &BTreeMap<String, u64>) -> Vec<TableInfo> {
    let mut tables = vec![
        TableInfo::new(OVERVIEW_TABLE)
            .with_comment("Server and keyspace overview")
            .with_column(ColumnInfo::new("metric", "string", false))
            .with_column(ColumnInfo::new("value", "string", false))
            .with_estimated_rows(5),
    ];

    for (key_type, count) in counts {
        let mut table = TableInfo::new(format!("keys_{}", key_type))
            .with_comment(format!(
                "Keys of type {} in a sample of at most {} keys; counts are approximate",
                key_type, KEY_SAMPLE_LIMIT
            ))
            .with_column(ColumnInfo::new("key", "string", false))
            .with_column(ColumnInfo::new("type", "string", false))
            .with_primary_key("key")
            .with_estimated_rows(*count);

        table = match key_type.as_str() {
            "string" => table.with_column(ColumnInfo::new("value", "string", true)),
            "list" => table.with_column(ColumnInfo::new("length", "number", false)),
            "set" | "zset" => table.with_column(ColumnInfo::new("cardinality", "number", false)),
            "hash" => table.with_column(ColumnInfo::new("field_count", "number", false)),
            _ => table,
        };
        tables.push(table);
    }
    tables
}

fn parse_server_version(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("redis_version:"))
        .map(|v| v.trim().to_string())
}

// =============================================================================
// Reply Shaping
// =============================================================================

/// Turn a reply into rows.
///
/// Nil becomes `{result: null}`, an even-length `HGETALL` reply becomes one
/// object, other arrays become `{index, value}` rows and scalars `{result}`.
fn shape_reply(command: &str, reply: &Value) -> Vec<serde_json::Map<String, JsonValue>> {
    match reply {
        Value::Nil => vec![single("result", JsonValue::Null)],
        Value::Array(items) | Value::Set(items) => {
            if command.eq_ignore_ascii_case("HGETALL") && items.len() % 2 == 0 {
                let object = items
                    .chunks(2)
                    .map(|pair| (value_to_key(&pair[0]), value_to_json(&pair[1])))
                    .collect();
                return vec![object];
            }
            items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let mut row = single("index", JsonValue::from(index));
                    row.insert("value".to_string(), value_to_json(item));
                    row
                })
                .collect()
        }
        Value::Map(pairs) => vec![
            pairs
                .iter()
                .map(|(k, v)| (value_to_key(k), value_to_json(v)))
                .collect(),
        ],
        other => vec![single("result", value_to_json(other))],
    }
}

fn single(key: &str, value: JsonValue) -> serde_json::Map<String, JsonValue> {
    let mut row = serde_json::Map::new();
    row.insert(key.to_string(), value);
    row
}

fn value_to_key(value: &Value) -> String {
    match value_to_json(value) {
        JsonValue::String(s) => s,
        other => other.to_string(),
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Nil => JsonValue::Null,
        Value::Int(i) => JsonValue::from(*i),
        Value::BulkString(bytes) => decode_binary_value(bytes),
        Value::SimpleString(s) => JsonValue::String(s.clone()),
        Value::Okay => JsonValue::String("OK".to_string()),
        Value::Array(items) | Value::Set(items) => {
            JsonValue::Array(items.iter().map(value_to_json).collect())
        }
        Value::Map(pairs) => JsonValue::Object(
            pairs
                .iter()
                .map(|(k, v)| (value_to_key(k), value_to_json(v)))
                .collect(),
        ),
        Value::Double(f) => float_to_json(*f),
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::VerbatimString { text, .. } => JsonValue::String(text.clone()),
        other => JsonValue::String(format!("{:?}", other)),
    }
}

fn translate_connect_error(err: &redis::RedisError, config: &ServerConfig) -> DbError {
    let endpoint = format!("{}:{}", config.host, config.port);
    if err.kind() == ErrorKind::AuthenticationFailed {
        return DbError::connection(
            "Authentication failed: invalid credentials",
            "Verify the Redis user and password",
        );
    }
    if err.is_connection_refusal() {
        return DbError::connection(
            format!("No Redis server listening at {}", endpoint),
            "Check that the server is running and the host/port are correct",
        );
    }
    if err.is_io_error() || err.is_timeout() {
        return DbError::connection(
            format!("Cannot reach {}: {}", endpoint, err),
            "Check network connectivity and the host name",
        );
    }
    DbError::connection(
        format!("Failed to connect to {}: {}", endpoint, err),
        "Verify the host, port, database index and credentials",
    )
}
