//! Read/write safety classification and the read-only guard.
//!
//! Classification is lexical: skip leading whitespace and comments, then match
//! the first keyword. This keeps it usable for dialects no SQL parser accepts
//! (PL/SQL blocks, key-value commands) at the cost of treating any statement
//! that starts with a read keyword as a read.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;

/// Command-line flag that lifts read-only safety mode.
pub const ALLOW_WRITE_FLAG: &str = "--danger-allow-write";

/// Leading keywords that make a SQL statement a write on every SQL backend.
pub const SQL_WRITE_KEYWORDS: &[&str] = &[
    "DELETE", "DROP", "TRUNCATE", "UPDATE", "INSERT", "ALTER", "CREATE", "RENAME", "REPLACE",
];

/// Additional leading keywords for Oracle (DML merge, PL/SQL blocks, transaction control).
pub const ORACLE_WRITE_KEYWORDS: &[&str] =
    &["MERGE", "BEGIN", "DECLARE", "CALL", "COMMIT", "ROLLBACK"];

/// Mutating key-value commands.
pub const REDIS_WRITE_COMMANDS: &[&str] = &[
    "SET", "SETEX", "PSETEX", "SETNX", "MSET", "MSETNX", "GETSET", "GETDEL", "GETEX",
    "DEL", "UNLINK", "FLUSHDB", "FLUSHALL", "LPUSH", "RPUSH", "LPUSHX", "RPUSHX", "LPOP", "RPOP",
    "LSET", "LREM", "LINSERT", "LTRIM", "RPOPLPUSH", "LMOVE", "SADD", "SREM", "SPOP", "SMOVE",
    "ZADD", "ZREM", "ZINCRBY", "ZPOPMIN", "ZPOPMAX", "ZREMRANGEBYSCORE", "ZREMRANGEBYRANK",
    "HSET", "HSETNX", "HMSET", "HDEL", "HINCRBY", "HINCRBYFLOAT", "INCR", "DECR", "INCRBY",
    "DECRBY", "INCRBYFLOAT", "APPEND", "SETRANGE", "SETBIT", "EXPIRE", "EXPIREAT", "PEXPIRE",
    "PEXPIREAT", "PERSIST", "RENAME", "RENAMENX", "COPY", "MOVE",
];

/// Strip leading whitespace, `--` line comments and `/* */` block comments.
///
/// An unterminated block comment swallows the rest of the input.
pub fn skip_leading_comments(statement: &str) -> &str {
    let mut rest = statement;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(pos) => &after[pos + 1..],
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(pos) => &after[pos + 2..],
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// Return the keyword from `keywords` that `statement` starts with, if any.
///
/// Matching is ASCII case-insensitive and requires a word boundary after the
/// keyword, so `UPDATES` or `SET_X` do not match.
pub fn leading_keyword(statement: &str, keywords: &[&'static str]) -> Option<&'static str> {
    let body = skip_leading_comments(statement);
    keywords.iter().copied().find(|kw| {
        body.len() >= kw.len()
            && body.is_char_boundary(kw.len())
            && body[..kw.len()].eq_ignore_ascii_case(kw)
            && body[kw.len()..]
                .chars()
                .next()
                .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
    })
}

/// Detect the write keyword of a SQL statement (MySQL-protocol and SQLite rules).
pub fn sql_write_keyword(statement: &str) -> Option<&'static str> {
    leading_keyword(statement, SQL_WRITE_KEYWORDS)
}

/// Detect the write keyword of a MySQL-protocol statement.
///
/// The server executes the body of `/*! ... */` and `/*!50000 ... */` comments,
/// so their markers are opened up before the leading keyword is matched.
pub fn mysql_write_keyword(statement: &str) -> Option<&'static str> {
    if !statement.contains("/*!") {
        return sql_write_keyword(statement);
    }
    sql_write_keyword(&open_executable_comments(statement))
}

fn open_executable_comments(statement: &str) -> String {
    let mut out = String::with_capacity(statement.len());
    let mut rest = statement;
    while let Some(pos) = rest.find("/*!") {
        out.push_str(&rest[..pos]);
        out.push(' ');
        rest = rest[pos + 3..].trim_start_matches(|c: char| c.is_ascii_digit());
    }
    out.push_str(rest);
    out
}

/// Detect the write keyword of an Oracle statement.
pub fn oracle_write_keyword(statement: &str) -> Option<&'static str> {
    sql_write_keyword(statement).or_else(|| leading_keyword(statement, ORACLE_WRITE_KEYWORDS))
}

/// Detect the mutating command of a key-value command line.
///
/// Only the first whitespace-separated token is looked at.
pub fn redis_write_command(command: &str) -> Option<&'static str> {
    let token = command.split_whitespace().next()?;
    REDIS_WRITE_COMMANDS
        .iter()
        .copied()
        .find(|c| c.eq_ignore_ascii_case(token))
}

/// Detect the write keyword of `statement` under the rules of `database_type`.
pub fn write_keyword(statement: &str, database_type: DatabaseType) -> Option<&'static str> {
    match database_type {
        DatabaseType::MySql => mysql_write_keyword(statement),
        DatabaseType::Sqlite => sql_write_keyword(statement),
        DatabaseType::Oracle => oracle_write_keyword(statement),
        DatabaseType::Redis => redis_write_command(statement),
    }
}

/// Check whether `statement` is a write under the rules of `database_type`.
pub fn is_write_operation(statement: &str, database_type: DatabaseType) -> bool {
    write_keyword(statement, database_type).is_some()
}

/// Lexical rules that differ between the SQL dialects the single-statement
/// check understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    /// `#` comments, `--` only before whitespace, backslash escapes in
    /// strings, and `/*! */` bodies that the server executes
    MySql,
    /// `[bracketed]` identifiers
    Sqlite,
}

/// Byte offset where a second statement starts, if `sql` holds more than one.
///
/// A `;` outside quotes and comments ends the statement; after it only
/// whitespace, comments and further `;` may follow.
fn trailing_statement_offset(sql: &str, dialect: Dialect) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    let mut terminated = false;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let line_comment = match dialect {
            Dialect::MySql => {
                b == b'#'
                    || (b == b'-'
                        && next == Some(b'-')
                        && bytes.get(i + 2).is_none_or(|c| c.is_ascii_whitespace()))
            }
            Dialect::Sqlite => b == b'-' && next == Some(b'-'),
        };
        if line_comment {
            i = match bytes[i..].iter().position(|&c| c == b'\n') {
                Some(pos) => i + pos + 1,
                None => bytes.len(),
            };
            continue;
        }
        if b == b'/' && next == Some(b'*') {
            if dialect == Dialect::MySql && bytes.get(i + 2) == Some(&b'!') {
                // Executable comment: its body is code, scan it as such
                if terminated {
                    return Some(i);
                }
                i += 3;
                continue;
            }
            i = match sql[i + 2..].find("*/") {
                Some(pos) => i + 2 + pos + 2,
                None => bytes.len(),
            };
            continue;
        }
        if b == b';' {
            terminated = true;
            i += 1;
            continue;
        }
        if terminated {
            return Some(i);
        }

        i = match b {
            b'\'' | b'"' | b'`' => skip_quoted(bytes, i, dialect == Dialect::MySql),
            b'[' if dialect == Dialect::Sqlite => match bytes[i..].iter().position(|&c| c == b']') {
                Some(pos) => i + pos + 1,
                None => bytes.len(),
            },
            _ => i + 1,
        };
    }
    None
}

/// Offset just past the quoted run starting at `start`. A doubled quote is an
/// escaped quote; backslash escapes apply only when `backslash_escapes` is set.
fn skip_quoted(bytes: &[u8], start: usize, backslash_escapes: bool) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
        } else if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
            } else {
                return i + 1;
            }
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// Reject input that holds more than one statement.
///
/// Applies to the MySQL-protocol and SQLite backends, whose drivers would
/// otherwise run every statement of a `;`-separated script. Oracle executes a
/// single statement (PL/SQL blocks legitimately contain `;`) and key-value
/// commands have no terminator, so both pass unchecked.
pub fn ensure_single_statement(statement: &str, database_type: DatabaseType) -> DbResult<()> {
    let dialect = match database_type {
        DatabaseType::MySql => Dialect::MySql,
        DatabaseType::Sqlite => Dialect::Sqlite,
        DatabaseType::Oracle | DatabaseType::Redis => return Ok(()),
    };
    match trailing_statement_offset(statement, dialect) {
        Some(offset) => Err(DbError::invalid_input(format!(
            "Only one statement per call is supported; a second statement starts at byte {}",
            offset
        ))),
        None => Ok(()),
    }
}

/// Reject writes unless `allow_write` is set.
///
/// # Examples
///
/// ```
/// use db_schema_bridge::models::DatabaseType;
/// use db_schema_bridge::tools::guard::validate_query;
///
/// assert!(validate_query("SELECT 1", DatabaseType::MySql, false).is_ok());
/// assert!(validate_query("DELETE FROM t", DatabaseType::MySql, false).is_err());
/// assert!(validate_query("DELETE FROM t", DatabaseType::MySql, true).is_ok());
/// ```
pub fn validate_query(
    statement: &str,
    database_type: DatabaseType,
    allow_write: bool,
) -> DbResult<()> {
    if allow_write {
        return Ok(());
    }
    match write_keyword(statement, database_type) {
        Some(keyword) => Err(DbError::safety_rejection(keyword, ALLOW_WRITE_FLAG)),
        None => Ok(()),
    }
}
