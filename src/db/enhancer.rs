//! Relationship inference and cardinality refinement.
//!
//! The enhancer takes the tables and declared relationships of an assembled
//! schema and produces the list a language model should see:
//!
//! 1. Declared relationships are tagged `foreign_key` with confidence 1.0.
//! 2. Columns that look like references by naming convention (`user_id`,
//!    `userId`, `region_code`, `order_no`) get an `inferred` relationship when a
//!    plausible target table exists.
//! 3. Relationships whose local columns exactly match a unique index on the
//!    source table are reclassified one-to-one.
//!
//! Table and column names are matched ignoring ASCII case; emitted names keep
//! the spelling the schema uses. The enhancer holds no state besides its
//! configuration, so independent schemas can be enhanced concurrently.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::{
    RelationshipInfo, RelationshipSource, RelationshipType, SchemaInfo, TableInfo,
};

/// Default minimum confidence for inferred relationships.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

const BASE_CONFIDENCE: f64 = 0.95;
const NUMBER_SUFFIX_CONFIDENCE: f64 = 0.75;
const CAMEL_CASE_PENALTY: f64 = 0.05;

/// Candidate target-table name suffixes, in priority order, with their offset
/// from the rule's base confidence.
const CANDIDATE_SUFFIXES: &[(&str, f64)] = &[
    ("s", 0.0),
    ("es", 0.0),
    ("", -0.05),
    ("_info", -0.10),
    ("_list", -0.10),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhancerConfig {
    pub enable_inferred_relationships: bool,
    pub enable_relationship_type_refinement: bool,
    /// In [0, 1]; inferred relationships scoring lower are dropped
    pub min_confidence_threshold: f64,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            enable_inferred_relationships: true,
            enable_relationship_type_refinement: true,
            min_confidence_threshold: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// Partial configuration update; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnhancerConfigUpdate {
    pub enable_inferred_relationships: Option<bool>,
    pub enable_relationship_type_refinement: Option<bool>,
    pub min_confidence_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipEnhancer {
    config: EnhancerConfig,
}

impl RelationshipEnhancer {
    /// Create an enhancer. The threshold is clamped to [0, 1].
    pub fn new(config: EnhancerConfig) -> Self {
        Self {
            config: EnhancerConfig {
                min_confidence_threshold: clamp_unit(config.min_confidence_threshold),
                ..config
            },
        }
    }

    /// Current configuration.
    pub fn config(&self) -> EnhancerConfig {
        self.config
    }

    /// Merge a partial update into the current configuration.
    pub fn update_config(&mut self, update: EnhancerConfigUpdate) {
        if let Some(v) = update.enable_inferred_relationships {
            self.config.enable_inferred_relationships = v;
        }
        if let Some(v) = update.enable_relationship_type_refinement {
            self.config.enable_relationship_type_refinement = v;
        }
        if let Some(v) = update.min_confidence_threshold {
            self.config.min_confidence_threshold = clamp_unit(v);
        }
    }

    /// Tag, infer and refine relationships for `tables`.
    ///
    /// Declared relationships come first, in their original order, followed by
    /// inferred ones in table then column order.
    pub fn enhance(
        &self,
        tables: &[TableInfo],
        explicit: &[RelationshipInfo],
    ) -> Vec<RelationshipInfo> {
        let mut relationships: Vec<RelationshipInfo> = explicit
            .iter()
            .cloned()
            .map(|rel| RelationshipInfo {
                source: Some(RelationshipSource::ForeignKey),
                confidence: Some(1.0),
                ..rel
            })
            .collect();

        if self.config.enable_inferred_relationships {
            let inferred = self.infer(tables, explicit);
            debug!(
                explicit = relationships.len(),
                inferred = inferred.len(),
                "Inferred relationships"
            );
            relationships.extend(inferred);
        }

        if self.config.enable_relationship_type_refinement {
            refine_cardinality(tables, &mut relationships);
        }

        relationships
    }

    /// Enhance a whole schema, replacing its relationships.
    ///
    /// `relationships` stays `None` when nothing is declared or inferred.
    pub fn enhance_schema(&self, mut schema: SchemaInfo) -> SchemaInfo {
        let explicit = schema.relationships.take().unwrap_or_default();
        let enhanced = self.enhance(&schema.tables, &explicit);
        schema.relationships = (!enhanced.is_empty()).then_some(enhanced);
        schema
    }

    fn infer(&self, tables: &[TableInfo], explicit: &[RelationshipInfo]) -> Vec<RelationshipInfo> {
        let by_name: HashMap<String, &TableInfo> = tables
            .iter()
            .map(|t| (t.name.to_ascii_lowercase(), t))
            .collect();

        // Every local column of every declared relationship is off limits.
        let claimed: HashSet<(String, String)> = explicit
            .iter()
            .flat_map(|rel| {
                rel.from_columns.iter().map(|c| {
                    (
                        rel.from_table.to_ascii_lowercase(),
                        c.to_ascii_lowercase(),
                    )
                })
            })
            .collect();

        let mut inferred = Vec::new();
        for table in tables {
            let table_key = table.name.to_ascii_lowercase();
            for column in &table.columns {
                if claimed.contains(&(table_key.clone(), column.name.to_ascii_lowercase())) {
                    continue;
                }
                if table.is_primary_key_ignore_case(&column.name) {
                    continue;
                }
                let Some(rel) = infer_column(table, &column.name, &by_name) else {
                    continue;
                };
                if rel.confidence.unwrap_or(0.0) >= self.config.min_confidence_threshold {
                    inferred.push(rel);
                }
            }
        }
        inferred
    }
}

/// A naming rule that matched a column.
struct RuleMatch {
    base: String,
    target_column: String,
    base_confidence: f64,
    penalty: f64,
}

/// Apply the naming rules to one column; the first matching rule wins.
fn match_rule(column: &str) -> Option<RuleMatch> {
    let lower = column.to_ascii_lowercase();

    if let Some(base) = lower.strip_suffix("_id").filter(|b| !b.is_empty()) {
        return Some(RuleMatch {
            base: base.to_string(),
            target_column: "id".to_string(),
            base_confidence: BASE_CONFIDENCE,
            penalty: 0.0,
        });
    }

    // camelCase is judged on the original spelling: `customerId`, not `customerid`.
    if let Some(base) = column.strip_suffix("Id").filter(|b| !b.is_empty()) {
        return Some(RuleMatch {
            base: base.to_ascii_lowercase(),
            target_column: "id".to_string(),
            base_confidence: BASE_CONFIDENCE,
            penalty: CAMEL_CASE_PENALTY,
        });
    }

    if let Some(base) = lower.strip_suffix("_code").filter(|b| !b.is_empty()) {
        return Some(RuleMatch {
            base: base.to_string(),
            target_column: "code".to_string(),
            base_confidence: BASE_CONFIDENCE,
            penalty: 0.0,
        });
    }

    if let Some(base) = lower.strip_suffix("_no").filter(|b| !b.is_empty()) {
        return Some(RuleMatch {
            base: base.to_string(),
            target_column: column.to_string(),
            base_confidence: NUMBER_SUFFIX_CONFIDENCE,
            penalty: 0.0,
        });
    }

    None
}

/// Try to infer a relationship for `column` of `table`.
fn infer_column(
    table: &TableInfo,
    column: &str,
    by_name: &HashMap<String, &TableInfo>,
) -> Option<RelationshipInfo> {
    let rule = match_rule(column)?;

    for (suffix, offset) in CANDIDATE_SUFFIXES {
        let candidate_key = format!("{}{}", rule.base, suffix);
        let Some(target) = by_name.get(&candidate_key) else {
            continue;
        };
        if target.name.eq_ignore_ascii_case(&table.name) {
            continue;
        }

        let target_column = target
            .column_ignore_case(&rule.target_column)
            .map(|c| c.name.clone())
            .or_else(|| {
                target
                    .primary_keys
                    .iter()
                    .find(|pk| pk.eq_ignore_ascii_case(&rule.target_column))
                    .cloned()
            });
        let Some(target_column) = target_column else {
            continue;
        };

        let confidence = round2((rule.base_confidence + offset - rule.penalty).max(0.0));
        return Some(RelationshipInfo {
            from_table: table.name.clone(),
            from_columns: vec![column.to_string()],
            to_table: target.name.clone(),
            to_columns: vec![target_column],
            relationship_type: RelationshipType::ManyToOne,
            source: Some(RelationshipSource::Inferred),
            confidence: Some(confidence),
            constraint_name: None,
        });
    }

    None
}

/// Reclassify relationships backed by a unique index as one-to-one.
fn refine_cardinality(tables: &[TableInfo], relationships: &mut [RelationshipInfo]) {
    let by_name: HashMap<String, &TableInfo> = tables
        .iter()
        .map(|t| (t.name.to_ascii_lowercase(), t))
        .collect();

    for rel in relationships.iter_mut() {
        let Some(table) = by_name.get(&rel.from_table.to_ascii_lowercase()) else {
            continue;
        };
        if has_matching_unique_index(table, &rel.from_columns) {
            rel.relationship_type = RelationshipType::OneToOne;
        }
    }
}

/// Check for a unique index whose column set equals `columns` (order ignored).
fn has_matching_unique_index(table: &TableInfo, columns: &[String]) -> bool {
    if columns.is_empty() {
        return false;
    }
    let wanted = normalized_set(columns);
    table
        .indexes
        .iter()
        .filter(|idx| idx.unique)
        .any(|idx| normalized_set(&idx.columns) == wanted)
}

fn normalized_set(columns: &[String]) -> Vec<String> {
    let mut set: Vec<String> = columns.iter().map(|c| c.to_ascii_lowercase()).collect();
    set.sort();
    set.dedup();
    set
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        DEFAULT_MIN_CONFIDENCE
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnInfo, DatabaseType, IndexInfo};

    fn table(name: &str, columns: &[&str], pks: &[&str]) -> TableInfo {
        let mut t = TableInfo::new(name);
        for c in columns {
            t = t.with_column(ColumnInfo::new(*c, "int", true));
        }
        for pk in pks {
            t = t.with_primary_key(*pk);
        }
        t
    }

    fn explicit(from: &str, col: &str, to: &str) -> RelationshipInfo {
        RelationshipInfo {
            from_table: from.to_string(),
            from_columns: vec![col.to_string()],
            to_table: to.to_string(),
            to_columns: vec!["id".to_string()],
            relationship_type: RelationshipType::ManyToOne,
            source: None,
            confidence: None,
            constraint_name: Some(format!("fk_{from}_{col}")),
        }
    }

    fn find<'a>(rels: &'a [RelationshipInfo], from: &str, col: &str) -> Option<&'a RelationshipInfo> {
        rels.iter()
            .find(|r| r.from_table == from && r.from_columns == [col.to_string()])
    }

    #[test]
    fn test_explicit_relationships_are_tagged() {
        let tables = vec![
            table("orders", &["id", "user_id"], &["id"]),
            table("users", &["id"], &["id"]),
        ];
        let rels = RelationshipEnhancer::default()
            .enhance(&tables, &[explicit("orders", "user_id", "users")]);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].source, Some(RelationshipSource::ForeignKey));
        assert_eq!(rels[0].confidence, Some(1.0));
        assert_eq!(rels[0].constraint_name.as_deref(), Some("fk_orders_user_id"));
    }

    #[test]
    fn test_snake_case_id_inferred_at_095() {
        let tables = vec![
            table("orders", &["id", "foo_id"], &["id"]),
            table("foos", &["id"], &["id"]),
        ];
        let rels = RelationshipEnhancer::default().enhance(&tables, &[]);
        let rel = find(&rels, "orders", "foo_id").unwrap();
        assert_eq!(rel.to_table, "foos");
        assert_eq!(rel.to_columns, vec!["id"]);
        assert_eq!(rel.confidence, Some(0.95));
        assert_eq!(rel.source, Some(RelationshipSource::Inferred));
        assert_eq!(rel.relationship_type, RelationshipType::ManyToOne);
    }

    #[test]
    fn test_camel_case_id_inferred_at_090() {
        let tables = vec![
            table("orders", &["id", "fooId"], &["id"]),
            table("foos", &["id"], &["id"]),
        ];
        let rels = RelationshipEnhancer::default().enhance(&tables, &[]);
        let rel = find(&rels, "orders", "fooId").unwrap();
        assert_eq!(rel.to_table, "foos");
        assert_eq!(rel.confidence, Some(0.9));
    }

    #[test]
    fn test_candidate_order_and_offsets() {
        // Singular table: 0.95 - 0.05
        let tables = vec![
            table("orders", &["id", "customer_id"], &["id"]),
            table("customer", &["id"], &["id"]),
        ];
        let rels = RelationshipEnhancer::default().enhance(&tables, &[]);
        assert_eq!(find(&rels, "orders", "customer_id").unwrap().confidence, Some(0.9));

        // `_info` table: 0.95 - 0.10
        let tables = vec![
            table("orders", &["id", "customer_id"], &["id"]),
            table("customer_info", &["id"], &["id"]),
        ];
        let rels = RelationshipEnhancer::default().enhance(&tables, &[]);
        let rel = find(&rels, "orders", "customer_id").unwrap();
        assert_eq!(rel.to_table, "customer_info");
        assert_eq!(rel.confidence, Some(0.85));

        // Plural wins over singular when both exist
        let tables = vec![
            table("orders", &["id", "box_id"], &["id"]),
            table("box", &["id"], &["id"]),
            table("boxes", &["id"], &["id"]),
        ];
        let rels = RelationshipEnhancer::default().enhance(&tables, &[]);
        assert_eq!(find(&rels, "orders", "box_id").unwrap().to_table, "boxes");
    }

    #[test]
    fn test_code_and_no_rules() {
        let tables = vec![
            table("stores", &["id", "region_code", "order_no"], &["id"]),
            table("regions", &["code"], &[]),
            table("orders", &["order_no"], &[]),
        ];
        let rels = RelationshipEnhancer::default().enhance(&tables, &[]);

        let code = find(&rels, "stores", "region_code").unwrap();
        assert_eq!(code.to_table, "regions");
        assert_eq!(code.to_columns, vec!["code"]);
        assert_eq!(code.confidence, Some(0.95));

        let no = find(&rels, "stores", "order_no").unwrap();
        assert_eq!(no.to_table, "orders");
        assert_eq!(no.to_columns, vec!["order_no"]);
        assert_eq!(no.confidence, Some(0.75));
    }

    #[test]
    fn test_target_must_have_column_and_differ_from_source() {
        let tables = vec![
            table("orders", &["id", "foo_id"], &["id"]),
            table("foos", &["uuid"], &["uuid"]),
        ];
        assert!(RelationshipEnhancer::default().enhance(&tables, &[]).is_empty());

        // Self-reference by naming alone is never inferred
        let tables = vec![table("user", &["id", "user_id"], &["id"])];
        assert!(RelationshipEnhancer::default().enhance(&tables, &[]).is_empty());
    }

    #[test]
    fn test_explicit_columns_and_primary_keys_are_skipped() {
        let tables = vec![
            table("orders", &["id", "user_id"], &["id"]),
            table("users", &["id"], &["id"]),
            table("profiles", &["user_id", "bio"], &["user_id"]),
        ];
        let rels = RelationshipEnhancer::default()
            .enhance(&tables, &[explicit("orders", "user_id", "users")]);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].source, Some(RelationshipSource::ForeignKey));
        assert!(find(&rels, "profiles", "user_id").is_none());
    }

    #[test]
    fn test_composite_explicit_key_claims_every_column() {
        let tables = vec![
            table("shipments", &["id", "order_id", "warehouse_id"], &["id"]),
            table("orders", &["id"], &["id"]),
            table("warehouses", &["id"], &["id"]),
        ];
        let composite = RelationshipInfo {
            from_columns: vec!["order_id".to_string(), "warehouse_id".to_string()],
            ..explicit("shipments", "order_id", "orders")
        };
        let rels = RelationshipEnhancer::default().enhance(&tables, &[composite]);
        assert_eq!(rels.len(), 1);
    }

    #[test]
    fn test_matching_ignores_case_but_keeps_spelling() {
        let tables = vec![
            table("ORDERS", &["ID", "CUSTOMER_ID"], &["ID"]),
            table("Customers", &["Id"], &["Id"]),
        ];
        let rels = RelationshipEnhancer::default().enhance(&tables, &[]);
        let rel = find(&rels, "ORDERS", "CUSTOMER_ID").unwrap();
        assert_eq!(rel.to_table, "Customers");
        assert_eq!(rel.to_columns, vec!["Id"]);
    }

    #[test]
    fn test_threshold_filters_and_zero_is_superset() {
        let tables = vec![
            table("orders", &["id", "foo_id", "bar_no"], &["id"]),
            table("foos", &["id"], &["id"]),
            table("bar_list", &["bar_no"], &[]),
        ];
        // bar_no -> bar_list scores 0.75 - 0.10 = 0.65
        let default = RelationshipEnhancer::default().enhance(&tables, &[]);
        assert!(find(&default, "orders", "bar_no").is_none());
        assert!(default.iter().all(|r| r.confidence.unwrap() >= 0.7));

        let permissive = RelationshipEnhancer::new(EnhancerConfig {
            min_confidence_threshold: 0.0,
            ..EnhancerConfig::default()
        })
        .enhance(&tables, &[]);
        assert_eq!(find(&permissive, "orders", "bar_no").unwrap().confidence, Some(0.65));
        assert!(default.iter().all(|r| permissive.contains(r)));

        let strict = RelationshipEnhancer::new(EnhancerConfig {
            min_confidence_threshold: 0.95,
            ..EnhancerConfig::default()
        })
        .enhance(&tables, &[]);
        assert_eq!(strict.len(), 1);
    }

    #[test]
    fn test_unique_index_refines_to_one_to_one() {
        let profiles = table("profiles", &["id", "user_id"], &["id"]).with_index(IndexInfo::new(
            "uk_user",
            vec!["user_id".to_string()],
            true,
        ));
        let tables = vec![profiles, table("users", &["id"], &["id"])];
        let rels = RelationshipEnhancer::default().enhance(&tables, &[]);
        let rel = find(&rels, "profiles", "user_id").unwrap();
        assert_eq!(rel.relationship_type, RelationshipType::OneToOne);
        assert_eq!(rel.source, Some(RelationshipSource::Inferred));
        assert_eq!(rel.confidence, Some(0.95));
    }

    #[test]
    fn test_refinement_requires_exact_set_match() {
        let make = |index_cols: &[&str], unique: bool| {
            let t = table("shipments", &["id", "order_id", "line_no"], &["id"]).with_index(
                IndexInfo::new(
                    "ix",
                    index_cols.iter().map(|c| c.to_string()).collect(),
                    unique,
                ),
            );
            vec![t, table("orders", &["id"], &["id"])]
        };
        let composite = RelationshipInfo {
            from_columns: vec!["order_id".to_string(), "line_no".to_string()],
            ..explicit("shipments", "order_id", "orders")
        };
        let enhancer = RelationshipEnhancer::default();

        let exact = enhancer.enhance(&make(&["line_no", "order_id"], true), &[composite.clone()]);
        assert_eq!(exact[0].relationship_type, RelationshipType::OneToOne);

        let superset = enhancer.enhance(&make(&["order_id", "line_no", "id"], true), &[composite.clone()]);
        assert_eq!(superset[0].relationship_type, RelationshipType::ManyToOne);

        let subset = enhancer.enhance(&make(&["order_id"], true), &[composite.clone()]);
        assert_eq!(subset[0].relationship_type, RelationshipType::ManyToOne);

        let not_unique = enhancer.enhance(&make(&["order_id", "line_no"], false), &[composite]);
        assert_eq!(not_unique[0].relationship_type, RelationshipType::ManyToOne);
    }

    #[test]
    fn test_disabled_passes_only_tag_explicit() {
        let tables = vec![
            table("orders", &["id", "foo_id"], &["id"]),
            table("foos", &["id"], &["id"]),
        ];
        let enhancer = RelationshipEnhancer::new(EnhancerConfig {
            enable_inferred_relationships: false,
            enable_relationship_type_refinement: false,
            ..EnhancerConfig::default()
        });
        assert!(enhancer.enhance(&tables, &[]).is_empty());
    }

    #[test]
    fn test_update_config_merges() {
        let mut enhancer = RelationshipEnhancer::default();
        enhancer.update_config(EnhancerConfigUpdate {
            min_confidence_threshold: Some(1.5),
            ..EnhancerConfigUpdate::default()
        });
        let config = enhancer.config();
        assert_eq!(config.min_confidence_threshold, 1.0);
        assert!(config.enable_inferred_relationships);
        assert!(config.enable_relationship_type_refinement);
    }

    #[test]
    fn test_enhance_schema_keeps_relationships_absent_when_empty() {
        let schema = SchemaInfo {
            database_type: DatabaseType::Sqlite,
            database_name: "app.db".to_string(),
            version: "3.45.0".to_string(),
            tables: vec![table("notes", &["id", "body"], &["id"])],
            relationships: None,
        };
        let enhanced = RelationshipEnhancer::default().enhance_schema(schema);
        assert!(enhanced.relationships.is_none());
    }

    #[test]
    fn test_match_rule_precedence() {
        assert!(match_rule("id").is_none());
        assert!(match_rule("Id").is_none());
        assert!(match_rule("_id").is_none());
        assert!(match_rule("code").is_none());
        assert!(match_rule("no").is_none());
        assert!(match_rule("name").is_none());
        assert_eq!(match_rule("user_id").unwrap().penalty, 0.0);
        assert_eq!(match_rule("userId").unwrap().penalty, CAMEL_CASE_PENALTY);
        assert_eq!(match_rule("userId").unwrap().base, "user");
        // lowercased form has no camelCase marker
        assert!(match_rule("userid").is_none());
    }
}
