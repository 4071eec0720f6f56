//! Batch schema assembly.
//!
//! Each adapter reads its catalog with a handful of bulk queries (all columns,
//! all index memberships, all table statistics, all foreign-key mappings) and
//! converts the raw rows into the backend-neutral row types below. [`assemble`]
//! then builds the normalized [`SchemaInfo`] in memory, so the number of round
//! trips does not grow with the number of tables.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::models::{
    ColumnInfo, DatabaseType, ForeignKeyInfo, IndexInfo, RelationshipInfo, SchemaInfo, TableInfo,
};

/// One row of the bulk column query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub table: String,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub comment: Option<String>,
}

/// One primary-key member. `position` is 1-based key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyRow {
    pub table: String,
    pub column: String,
    pub position: u32,
}

/// One index/column membership row, in index column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub table: String,
    pub name: String,
    pub column: String,
    pub unique: bool,
    /// Engine-generated index backing the primary key; never reported
    pub is_primary: bool,
}

/// Table-level statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatsRow {
    pub table: String,
    pub estimated_rows: u64,
    pub comment: Option<String>,
}

/// One local/referenced column pair of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRow {
    pub table: String,
    pub constraint: String,
    pub column: String,
    pub referenced_table: String,
    /// `None` when the constraint targets the referenced table's primary key implicitly
    pub referenced_column: Option<String>,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

/// Everything the bulk catalog queries returned.
#[derive(Debug, Clone, Default)]
pub struct CatalogRows {
    pub columns: Vec<ColumnRow>,
    pub primary_keys: Vec<PrimaryKeyRow>,
    pub indexes: Vec<IndexRow>,
    pub stats: Vec<TableStatsRow>,
    pub foreign_keys: Vec<ForeignKeyRow>,
}

#[derive(Debug, Default)]
struct IndexAcc {
    columns: Vec<String>,
    unique: bool,
    is_primary: bool,
}

#[derive(Debug)]
struct ForeignKeyAcc {
    columns: Vec<String>,
    referenced_table: String,
    referenced_columns: Vec<Option<String>>,
    on_delete: Option<String>,
    on_update: Option<String>,
}

/// Assemble a normalized schema from bulk catalog rows.
///
/// - Only tables with at least one column are reported, sorted by name.
/// - Columns keep the order the catalog reported them in; repeats are ignored.
/// - Primary keys are ordered by key position and restricted to known columns.
/// - The primary-key index is dropped from `indexes`.
/// - Every distinct foreign key yields one many-to-one relationship with no
///   source set; `relationships` is `None` when there are none.
pub fn assemble(
    database_type: DatabaseType,
    database_name: impl Into<String>,
    version: impl Into<String>,
    rows: CatalogRows,
) -> SchemaInfo {
    let CatalogRows {
        columns,
        primary_keys,
        indexes,
        stats,
        foreign_keys,
    } = rows;

    let mut columns_by_table: BTreeMap<String, Vec<ColumnInfo>> = BTreeMap::new();
    for row in columns {
        let table_columns = columns_by_table.entry(row.table).or_default();
        if table_columns.iter().any(|c| c.name == row.name) {
            continue;
        }
        table_columns.push(ColumnInfo {
            name: row.name,
            data_type: row.data_type,
            nullable: row.nullable,
            default_value: row.default_value,
            comment: row.comment.filter(|c| !c.is_empty()),
        });
    }

    let mut pks_by_table: HashMap<String, Vec<(u32, String)>> = HashMap::new();
    for row in primary_keys {
        let pks = pks_by_table.entry(row.table).or_default();
        if !pks.iter().any(|(_, c)| *c == row.column) {
            pks.push((row.position, row.column));
        }
    }
    let pks_by_table: HashMap<String, Vec<String>> = pks_by_table
        .into_iter()
        .map(|(table, mut pks)| {
            pks.sort_by_key(|(pos, _)| *pos);
            (table, pks.into_iter().map(|(_, c)| c).collect())
        })
        .collect();

    let mut indexes_by_table: HashMap<String, BTreeMap<String, IndexAcc>> = HashMap::new();
    for row in indexes {
        let acc = indexes_by_table
            .entry(row.table)
            .or_default()
            .entry(row.name)
            .or_default();
        if !acc.columns.contains(&row.column) {
            acc.columns.push(row.column);
        }
        acc.unique |= row.unique;
        acc.is_primary |= row.is_primary;
    }

    let mut stats_by_table: HashMap<String, TableStatsRow> = stats
        .into_iter()
        .map(|row| (row.table.clone(), row))
        .collect();

    let mut fks_by_table: HashMap<String, BTreeMap<String, ForeignKeyAcc>> = HashMap::new();
    for row in foreign_keys {
        let acc = fks_by_table
            .entry(row.table)
            .or_default()
            .entry(row.constraint)
            .or_insert_with(|| ForeignKeyAcc {
                columns: Vec::new(),
                referenced_table: row.referenced_table,
                referenced_columns: Vec::new(),
                on_delete: row.on_delete,
                on_update: row.on_update,
            });
        if !acc.columns.contains(&row.column) {
            acc.columns.push(row.column);
            acc.referenced_columns.push(row.referenced_column);
        }
    }

    let mut tables = Vec::with_capacity(columns_by_table.len());
    let mut relationships = Vec::new();

    for (name, table_columns) in columns_by_table {
        if table_columns.is_empty() {
            continue;
        }

        let primary_keys: Vec<String> = pks_by_table
            .get(&name)
            .map(|pks| {
                pks.iter()
                    .filter(|pk| table_columns.iter().any(|c| c.name == **pk))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let indexes: Vec<IndexInfo> = indexes_by_table
            .remove(&name)
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, acc)| !acc.is_primary && !acc.columns.is_empty())
            .map(|(index_name, acc)| IndexInfo::new(index_name, acc.columns, acc.unique))
            .collect();

        let (estimated_rows, comment) = stats_by_table
            .remove(&name)
            .map(|s| (s.estimated_rows, s.comment.filter(|c| !c.is_empty())))
            .unwrap_or((0, None));

        let fks: Vec<ForeignKeyInfo> = fks_by_table
            .remove(&name)
            .unwrap_or_default()
            .into_iter()
            .map(|(constraint, acc)| {
                let referenced_pks = pks_by_table
                    .get(&acc.referenced_table)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let referenced_columns = resolve_referenced_columns(
                    &acc.columns,
                    acc.referenced_columns,
                    referenced_pks,
                );
                ForeignKeyInfo {
                    name: constraint,
                    columns: acc.columns,
                    referenced_table: acc.referenced_table,
                    referenced_columns,
                    on_delete: acc.on_delete,
                    on_update: acc.on_update,
                }
            })
            .collect();

        relationships.extend(fks.iter().map(|fk| RelationshipInfo::from_foreign_key(&name, fk)));

        tables.push(TableInfo {
            name,
            comment,
            columns: table_columns,
            primary_keys,
            indexes,
            foreign_keys: (!fks.is_empty()).then_some(fks),
            estimated_rows,
        });
    }

    debug!(
        tables = tables.len(),
        relationships = relationships.len(),
        "Assembled schema"
    );

    SchemaInfo {
        database_type,
        database_name: database_name.into(),
        version: version.into(),
        tables,
        relationships: (!relationships.is_empty()).then_some(relationships),
    }
}

/// Rows of the foreign-key catalog read, or none when that read failed.
///
/// Foreign keys are the one optional catalog input: a failed read is logged
/// and the schema is assembled without them, so `relationships` stays absent
/// while the rest of the schema is still returned.
pub fn foreign_key_rows_or_empty<R, E: std::fmt::Display>(
    database_type: DatabaseType,
    result: Result<Vec<R>, E>,
) -> Vec<R> {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            warn!(
                database_type = %database_type,
                error = %e,
                "Failed to read foreign keys, continuing without them"
            );
            Vec::new()
        }
    }
}

/// Fill in referenced columns the catalog left implicit.
///
/// A missing entry takes the referenced table's primary-key column at the same
/// position, falling back to the local column name when the key is shorter.
fn resolve_referenced_columns(
    local_columns: &[String],
    referenced: Vec<Option<String>>,
    referenced_pks: &[String],
) -> Vec<String> {
    referenced
        .into_iter()
        .enumerate()
        .map(|(i, col)| {
            col.filter(|c| !c.is_empty())
                .or_else(|| referenced_pks.get(i).cloned())
                .unwrap_or_else(|| local_columns[i].clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RelationshipType;

    fn col(table: &str, name: &str, data_type: &str) -> ColumnRow {
        ColumnRow {
            table: table.to_string(),
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            default_value: None,
            comment: None,
        }
    }

    fn pk(table: &str, column: &str, position: u32) -> PrimaryKeyRow {
        PrimaryKeyRow {
            table: table.to_string(),
            column: column.to_string(),
            position,
        }
    }

    fn idx(table: &str, name: &str, column: &str, unique: bool, is_primary: bool) -> IndexRow {
        IndexRow {
            table: table.to_string(),
            name: name.to_string(),
            column: column.to_string(),
            unique,
            is_primary,
        }
    }

    fn fk(table: &str, constraint: &str, column: &str, target: &str, target_col: Option<&str>) -> ForeignKeyRow {
        ForeignKeyRow {
            table: table.to_string(),
            constraint: constraint.to_string(),
            column: column.to_string(),
            referenced_table: target.to_string(),
            referenced_column: target_col.map(str::to_string),
            on_delete: Some("CASCADE".to_string()),
            on_update: None,
        }
    }

    fn shop_rows() -> CatalogRows {
        CatalogRows {
            columns: vec![
                col("users", "id", "int"),
                col("users", "email", "varchar(255)"),
                col("orders", "id", "int"),
                col("orders", "user_id", "int"),
                col("orders", "total", "decimal(10,2)"),
            ],
            primary_keys: vec![pk("users", "id", 1), pk("orders", "id", 1)],
            indexes: vec![
                idx("users", "PRIMARY", "id", true, true),
                idx("users", "uk_email", "email", true, false),
                idx("orders", "PRIMARY", "id", true, true),
                idx("orders", "idx_user", "user_id", false, false),
            ],
            stats: vec![TableStatsRow {
                table: "orders".to_string(),
                estimated_rows: 42,
                comment: Some("customer orders".to_string()),
            }],
            foreign_keys: vec![fk("orders", "fk_orders_user", "user_id", "users", Some("id"))],
        }
    }

    #[test]
    fn test_tables_sorted_and_columns_in_catalog_order() {
        let schema = assemble(DatabaseType::MySql, "shop", "8.0.36", shop_rows());
        let names: Vec<_> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "users"]);

        let orders = schema.table("orders").unwrap();
        let cols: Vec<_> = orders.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(cols, vec!["id", "user_id", "total"]);
        assert_eq!(orders.estimated_rows, 42);
        assert_eq!(orders.comment.as_deref(), Some("customer orders"));
        assert_eq!(schema.table("users").unwrap().estimated_rows, 0);
    }

    #[test]
    fn test_primary_key_index_is_dropped() {
        let schema = assemble(DatabaseType::MySql, "shop", "8.0.36", shop_rows());
        let users = schema.table("users").unwrap();
        assert_eq!(users.primary_keys, vec!["id"]);
        assert_eq!(users.indexes, vec![IndexInfo::new("uk_email", vec!["email".to_string()], true)]);
    }

    #[test]
    fn test_foreign_keys_become_many_to_one_relationships() {
        let schema = assemble(DatabaseType::MySql, "shop", "8.0.36", shop_rows());
        let rels = schema.relationships.as_ref().unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].from_table, "orders");
        assert_eq!(rels[0].to_table, "users");
        assert_eq!(rels[0].from_columns, vec!["user_id"]);
        assert_eq!(rels[0].to_columns, vec!["id"]);
        assert_eq!(rels[0].relationship_type, RelationshipType::ManyToOne);
        assert_eq!(rels[0].source, None);
        assert_eq!(rels[0].constraint_name.as_deref(), Some("fk_orders_user"));

        let orders = schema.table("orders").unwrap();
        let fks = orders.foreign_keys.as_ref().unwrap();
        assert_eq!(fks[0].on_delete.as_deref(), Some("CASCADE"));
        assert!(schema.table("users").unwrap().foreign_keys.is_none());
    }

    #[test]
    fn test_no_foreign_keys_means_no_relationships() {
        let mut rows = shop_rows();
        rows.foreign_keys.clear();
        let schema = assemble(DatabaseType::MySql, "shop", "8.0.36", rows);
        assert!(schema.relationships.is_none());
    }

    #[test]
    fn test_failed_foreign_key_read_yields_schema_without_relationships() {
        let fk_rows: Vec<ForeignKeyRow> =
            foreign_key_rows_or_empty(DatabaseType::Oracle, Err("ORA-01031: insufficient privileges"));
        assert!(fk_rows.is_empty());

        let rows = CatalogRows {
            foreign_keys: fk_rows,
            ..shop_rows()
        };
        let schema = assemble(DatabaseType::Oracle, "SHOP", "19c", rows);
        assert!(!schema.tables.is_empty());
        assert!(schema.relationships.is_none());
        assert!(schema.tables.iter().all(|t| t.foreign_keys.is_none()));
    }

    #[test]
    fn test_successful_foreign_key_read_is_kept() {
        let fk_rows = foreign_key_rows_or_empty::<_, String>(
            DatabaseType::MySql,
            Ok(shop_rows().foreign_keys),
        );
        assert_eq!(fk_rows, shop_rows().foreign_keys);
    }

    #[test]
    fn test_tables_without_columns_are_skipped() {
        let mut rows = shop_rows();
        rows.stats.push(TableStatsRow {
            table: "ghost".to_string(),
            estimated_rows: 1,
            comment: None,
        });
        rows.indexes.push(idx("ghost", "idx_x", "x", false, false));
        let schema = assemble(DatabaseType::MySql, "shop", "8.0.36", rows);
        assert!(schema.table("ghost").is_none());
        assert_eq!(schema.tables.len(), 2);
    }

    #[test]
    fn test_composite_keys_keep_key_order() {
        let rows = CatalogRows {
            columns: vec![
                col("line_items", "order_id", "int"),
                col("line_items", "line_no", "int"),
                col("line_items", "sku", "text"),
            ],
            primary_keys: vec![pk("line_items", "line_no", 2), pk("line_items", "order_id", 1)],
            indexes: vec![
                idx("line_items", "uk_sku", "sku", true, false),
                idx("line_items", "uk_sku", "order_id", true, false),
            ],
            ..CatalogRows::default()
        };
        let schema = assemble(DatabaseType::Sqlite, "app.db", "3.45.0", rows);
        let table = schema.table("line_items").unwrap();
        assert_eq!(table.primary_keys, vec!["order_id", "line_no"]);
        assert_eq!(table.indexes[0].columns, vec!["sku", "order_id"]);
    }

    #[test]
    fn test_duplicate_rows_are_ignored() {
        let mut rows = shop_rows();
        rows.columns.push(col("users", "email", "varchar(255)"));
        rows.foreign_keys.push(fk("orders", "fk_orders_user", "user_id", "users", Some("id")));
        let schema = assemble(DatabaseType::MySql, "shop", "8.0.36", rows);
        assert_eq!(schema.table("users").unwrap().columns.len(), 2);
        assert_eq!(schema.relationships().len(), 1);
        assert_eq!(schema.relationships()[0].from_columns.len(), 1);
    }

    #[test]
    fn test_implicit_referenced_column_resolves_to_primary_key() {
        let mut rows = shop_rows();
        rows.foreign_keys = vec![fk("orders", "fk_orders_0", "user_id", "users", None)];
        let schema = assemble(DatabaseType::Sqlite, "shop.db", "3.45.0", rows);
        assert_eq!(schema.relationships()[0].to_columns, vec!["id"]);
    }

    #[test]
    fn test_primary_key_must_name_a_column() {
        let mut rows = shop_rows();
        rows.primary_keys.push(pk("users", "missing", 2));
        let schema = assemble(DatabaseType::MySql, "shop", "8.0.36", rows);
        assert_eq!(schema.table("users").unwrap().primary_keys, vec!["id"]);
    }
}
