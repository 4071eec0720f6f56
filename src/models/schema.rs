//! Schema-related data models.
//!
//! This module defines the normalized structural description every adapter
//! produces, independent of the backend it was read from.

use serde::{Deserialize, Serialize};

use super::DatabaseType;

/// Normalized description of one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub database_type: DatabaseType,
    pub database_name: String,
    pub version: String,
    /// Sorted by name (ordinal, case-sensitive), no duplicates
    pub tables: Vec<TableInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<RelationshipInfo>>,
}

impl SchemaInfo {
    /// Look up a table by exact name.
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Relationships as a slice; empty when absent.
    pub fn relationships(&self) -> &[RelationshipInfo] {
        self.relationships.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub columns: Vec<ColumnInfo>,
    /// Subset of column names, in key order
    pub primary_keys: Vec<String>,
    /// Never contains the engine's synthetic primary-key index
    pub indexes: Vec<IndexInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_keys: Option<Vec<ForeignKeyInfo>>,
    pub estimated_rows: u64,
}

impl TableInfo {
    /// Create a table with no columns or keys.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            columns: Vec::new(),
            primary_keys: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: None,
            estimated_rows: 0,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_keys.push(column.into());
        self
    }

    pub fn with_index(mut self, index: IndexInfo) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_estimated_rows(mut self, estimated_rows: u64) -> Self {
        self.estimated_rows = estimated_rows;
        self
    }

    /// Find a column by name, ignoring ASCII case.
    pub fn column_ignore_case(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Check whether `name` is part of the primary key, ignoring ASCII case.
    pub fn is_primary_key_ignore_case(&self, name: &str) -> bool {
        self.primary_keys
            .iter()
            .any(|pk| pk.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    /// Backend-native type string, e.g. `varchar(255)` or `NUMBER(10,2)`
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            comment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// In index order
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexInfo {
    pub fn new(name: impl Into<String>, columns: Vec<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            columns,
            unique,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    /// Same length as `columns`, matched by position
    pub referenced_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
}

/// Cardinality of a relationship seen from its source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    #[serde(rename = "one-to-one")]
    OneToOne,
    #[serde(rename = "many-to-one")]
    ManyToOne,
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneToOne => write!(f, "one-to-one"),
            Self::ManyToOne => write!(f, "many-to-one"),
        }
    }
}

/// Where a relationship came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipSource {
    /// Declared foreign-key constraint
    ForeignKey,
    /// Guessed from naming conventions
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipInfo {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RelationshipSource>,
    /// In [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint_name: Option<String>,
}

impl RelationshipInfo {
    /// Relationship backed by a declared foreign key; source left unset.
    pub fn from_foreign_key(table: &str, fk: &ForeignKeyInfo) -> Self {
        Self {
            from_table: table.to_string(),
            from_columns: fk.columns.clone(),
            to_table: fk.referenced_table.clone(),
            to_columns: fk.referenced_columns.clone(),
            relationship_type: RelationshipType::ManyToOne,
            source: None,
            confidence: None,
            constraint_name: Some(fk.name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_serialization() {
        let rel = RelationshipInfo {
            from_table: "orders".to_string(),
            from_columns: vec!["user_id".to_string()],
            to_table: "users".to_string(),
            to_columns: vec!["id".to_string()],
            relationship_type: RelationshipType::OneToOne,
            source: Some(RelationshipSource::ForeignKey),
            confidence: Some(1.0),
            constraint_name: None,
        };
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(json["type"], "one-to-one");
        assert_eq!(json["source"], "foreign_key");
        assert_eq!(json["fromTable"], "orders");
        assert!(json.get("constraintName").is_none());
    }

    #[test]
    fn test_schema_info_omits_absent_relationships() {
        let schema = SchemaInfo {
            database_type: DatabaseType::Sqlite,
            database_name: "app.db".to_string(),
            version: "3.45.0".to_string(),
            tables: vec![
                TableInfo::new("users").with_column(ColumnInfo::new("id", "INTEGER", false)),
            ],
            relationships: None,
        };
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["databaseType"], "sqlite");
        assert!(json.get("relationships").is_none());
        assert_eq!(json["tables"][0]["columns"][0]["type"], "INTEGER");
        assert!(schema.relationships().is_empty());
    }

    #[test]
    fn test_table_lookups_ignore_case() {
        let table = TableInfo::new("Users")
            .with_column(ColumnInfo::new("ID", "int", false))
            .with_primary_key("ID");
        assert!(table.column_ignore_case("id").is_some());
        assert!(table.is_primary_key_ignore_case("id"));
        assert!(table.column_ignore_case("name").is_none());
    }

    #[test]
    fn test_relationship_from_foreign_key() {
        let fk = ForeignKeyInfo {
            name: "fk_orders_user".to_string(),
            columns: vec!["user_id".to_string()],
            referenced_table: "users".to_string(),
            referenced_columns: vec!["id".to_string()],
            on_delete: Some("CASCADE".to_string()),
            on_update: None,
        };
        let rel = RelationshipInfo::from_foreign_key("orders", &fk);
        assert_eq!(rel.relationship_type, RelationshipType::ManyToOne);
        assert_eq!(rel.source, None);
        assert_eq!(rel.constraint_name.as_deref(), Some("fk_orders_user"));
    }
}
