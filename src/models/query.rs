//! Query-related data models.
//!
//! This module defines positional statement parameters and the uniform result
//! every adapter returns.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A positional parameter value for a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl QueryParam {
    /// Render the parameter as a single command argument.
    ///
    /// Used by the key-value adapter, which appends parameters to the command
    /// line instead of binding them.
    pub fn to_argument(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
        }
    }

    /// Parse a raw command-line argument into the narrowest matching parameter.
    ///
    /// `null` becomes NULL, `true`/`false` booleans, then integers and floats;
    /// everything else stays a string.
    pub fn from_cli_arg(raw: &str) -> Self {
        match raw {
            "null" | "NULL" => return Self::Null,
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => Self::Float(f),
            _ => Self::String(raw.to_string()),
        }
    }
}

impl From<&str> for QueryParam {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for QueryParam {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for QueryParam {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for QueryParam {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Outcome of one executed statement.
///
/// Never mutated after an adapter returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    /// Wall-clock milliseconds spent in the adapter
    pub execution_time: u64,
    /// Backend-specific extras (field counts, last insert id, raw replies)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, JsonValue>,
}

impl QueryResult {
    /// Create a result carrying rows.
    pub fn with_rows(rows: Vec<serde_json::Map<String, JsonValue>>, execution_time: u64) -> Self {
        Self {
            rows,
            affected_rows: None,
            execution_time,
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a result for write operations (INSERT/UPDATE/DELETE).
    pub fn write_result(affected_rows: u64, execution_time: u64) -> Self {
        Self {
            rows: Vec::new(),
            affected_rows: Some(affected_rows),
            execution_time,
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_from_cli_arg() {
        assert_eq!(QueryParam::from_cli_arg("null"), QueryParam::Null);
        assert_eq!(QueryParam::from_cli_arg("true"), QueryParam::Bool(true));
        assert_eq!(QueryParam::from_cli_arg("42"), QueryParam::Int(42));
        assert_eq!(QueryParam::from_cli_arg("1.5"), QueryParam::Float(1.5));
        assert_eq!(
            QueryParam::from_cli_arg("alice"),
            QueryParam::String("alice".to_string())
        );
        // "NaN" parses as f64 but is not a useful number
        assert_eq!(
            QueryParam::from_cli_arg("NaN"),
            QueryParam::String("NaN".to_string())
        );
    }

    #[test]
    fn test_query_param_to_argument() {
        assert_eq!(QueryParam::Int(7).to_argument(), "7");
        assert_eq!(QueryParam::Bool(false).to_argument(), "false");
        assert_eq!(QueryParam::Null.to_argument(), "null");
        assert_eq!(QueryParam::from("v").to_argument(), "v");
    }

    #[test]
    fn test_query_param_deserialize_untagged() {
        let params: Vec<QueryParam> = serde_json::from_str(r#"[null, true, 3, 2.5, "x"]"#).unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Null,
                QueryParam::Bool(true),
                QueryParam::Int(3),
                QueryParam::Float(2.5),
                QueryParam::String("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_result_write() {
        let result = QueryResult::write_result(5, 20);
        assert!(result.rows.is_empty());
        assert_eq!(result.affected_rows, Some(5));
    }

    #[test]
    fn test_query_result_serializes_camel_case() {
        let result = QueryResult::write_result(1, 3).with_metadata("lastInsertId", 9);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["affectedRows"], 1);
        assert_eq!(json["executionTime"], 3);
        assert_eq!(json["metadata"]["lastInsertId"], 9);
    }
}
