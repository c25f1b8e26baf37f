use crate::models::{ColumnDetail, SchemaSnapshot, TableDetail, TableSchema, TableSummary};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

const DETAIL_SUFFIXES: &[&str] = &["_details", "_detail"];
const DATE_MARKERS: &[&str] = &["date", "time", "_at", "year", "month", "period"];
const MAX_KEY_COLUMNS: usize = 10;
const MAX_SAMPLE_ROWS: usize = 2;

static YEAR_PARTITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<base>.+)_y(?P<year>\d+)$").expect("static regex"));

/// Read-only view over one schema snapshot. A catalog without a snapshot
/// answers every question with an empty list.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    snapshot: Option<Arc<SchemaSnapshot>>,
}

impl Catalog {
    pub fn new(snapshot: Arc<SchemaSnapshot>) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables().iter().map(|t| t.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables().iter().any(|t| t.name == name)
    }

    fn tables(&self) -> &[TableSchema] {
        self.snapshot
            .as_deref()
            .map(|s| s.tables.as_slice())
            .unwrap_or(&[])
    }

    pub fn summary(&self) -> Vec<TableSummary> {
        let tables = self.tables();
        let names: HashSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        let partitions = year_partitions(tables.iter().map(|t| t.name.as_str()));

        tables
            .iter()
            .map(|table| TableSummary {
                name: table.name.clone(),
                columns: table.columns.iter().map(|c| c.name.clone()).collect(),
                has_data: table.has_data(),
                row_count: table.row_count,
                year_partitions: partitions.get(table.name.as_str()).cloned().unwrap_or_default(),
                partition_of: partition_base(&table.name).map(str::to_string),
                related_table: related_table(&table.name, &names),
                key_columns: key_columns(table),
            })
            .collect()
    }

    /// Detailed view of the named tables, in snapshot order. Unknown names
    /// are ignored.
    pub fn detail(&self, names: &BTreeSet<String>) -> Vec<TableDetail> {
        self.tables()
            .iter()
            .filter(|t| names.contains(&t.name))
            .map(|table| TableDetail {
                name: table.name.clone(),
                columns: table
                    .columns
                    .iter()
                    .map(|c| ColumnDetail {
                        name: c.name.clone(),
                        data_type: c.data_type.clone(),
                        nullable: c.nullable,
                        primary_key: table.is_primary_key(c),
                    })
                    .collect(),
                indexes: table.indexes.clone(),
                foreign_keys: table.foreign_keys.clone(),
                row_count: table.row_count,
                sample_rows: table.sample_data.iter().take(MAX_SAMPLE_ROWS).cloned().collect(),
            })
            .collect()
    }
}

/// `invoices_y2023` -> `invoices`.
pub fn partition_base(name: &str) -> Option<&str> {
    YEAR_PARTITION
        .captures(name)
        .and_then(|c| c.name("base"))
        .map(|m| m.as_str())
}

/// Base table name -> its `_y<year>` siblings, sorted.
fn year_partitions<'a>(names: impl Iterator<Item = &'a str>) -> HashMap<&'a str, Vec<String>> {
    let mut out: HashMap<&'a str, Vec<String>> = HashMap::new();
    for name in names {
        if let Some(base) = partition_base(name) {
            out.entry(base).or_default().push(name.to_string());
        }
    }
    for siblings in out.values_mut() {
        siblings.sort();
    }
    out
}

fn singular(name: &str) -> Option<&str> {
    name.strip_suffix("es")
        .filter(|stem| stem.ends_with('s') || stem.ends_with('x') || stem.ends_with("ch"))
        .or_else(|| name.strip_suffix('s'))
}

/// Pair `orders` with `order_details` (either direction). A parent is only
/// reported when it exists in the snapshot.
pub fn related_table(name: &str, names: &HashSet<&str>) -> Option<String> {
    for suffix in DETAIL_SUFFIXES {
        if let Some(stem) = name.strip_suffix(suffix) {
            if stem.is_empty() {
                continue;
            }
            let parents = [stem.to_string(), format!("{stem}s"), format!("{stem}es")];
            return parents.into_iter().find(|p| names.contains(p.as_str()));
        }
    }

    for suffix in DETAIL_SUFFIXES {
        let mut candidates = vec![format!("{name}{suffix}")];
        if let Some(stem) = singular(name) {
            candidates.push(format!("{stem}{suffix}"));
        }
        if let Some(found) = candidates.into_iter().find(|c| names.contains(c.as_str())) {
            return Some(found);
        }
    }
    None
}

/// Primary keys, `*_id` and date-like columns, capped.
fn key_columns(table: &TableSchema) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|c| {
            let lower = c.name.to_ascii_lowercase();
            table.is_primary_key(c)
                || lower.ends_with("_id")
                || DATE_MARKERS.iter().any(|m| lower.contains(m))
        })
        .take(MAX_KEY_COLUMNS)
        .map(|c| c.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnSchema;
    use serde_json::json;

    fn column(name: &str, data_type: &str) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            primary_key: false,
        }
    }

    fn table(name: &str, columns: &[&str], row_count: u64) -> TableSchema {
        TableSchema {
            name: name.to_string(),
            columns: columns.iter().map(|c| column(c, "text")).collect(),
            primary_keys: vec!["id".to_string()],
            foreign_keys: vec![],
            row_count,
            sample_data: vec![],
            indexes: vec![format!("{name}_pkey")],
        }
    }

    fn catalog(tables: Vec<TableSchema>) -> Catalog {
        Catalog::new(Arc::new(SchemaSnapshot::new("sales", tables)))
    }

    fn summary_of<'a>(summaries: &'a [TableSummary], name: &str) -> &'a TableSummary {
        summaries.iter().find(|s| s.name == name).expect("table in summary")
    }

    #[test]
    fn year_partitions_attach_to_base_table() {
        let cat = catalog(vec![
            table("invoices", &["id", "total"], 10),
            table("invoices_y2023", &["id", "total"], 5),
            table("invoices_y2022", &["id", "total"], 5),
        ]);
        let summaries = cat.summary();
        let invoices = summary_of(&summaries, "invoices");
        assert_eq!(invoices.year_partitions, vec!["invoices_y2022", "invoices_y2023"]);

        let y2023 = summary_of(&summaries, "invoices_y2023");
        assert!(y2023.year_partitions.is_empty());
        assert_eq!(y2023.partition_of.as_deref(), Some("invoices"));
    }

    #[test]
    fn order_details_pair_with_orders_both_ways() {
        let cat = catalog(vec![
            table("orders", &["id"], 3),
            table("order_details", &["id", "order_id"], 9),
        ]);
        let summaries = cat.summary();
        assert_eq!(
            summary_of(&summaries, "order_details").related_table.as_deref(),
            Some("orders")
        );
        assert_eq!(
            summary_of(&summaries, "orders").related_table.as_deref(),
            Some("order_details")
        );
    }

    #[test]
    fn detail_suffix_without_parent_has_no_relation() {
        let cat = catalog(vec![table("shipment_details", &["id"], 1)]);
        assert_eq!(cat.summary()[0].related_table, None);
    }

    #[test]
    fn key_columns_keep_ids_and_dates_only() {
        let cat = catalog(vec![table(
            "orders",
            &["id", "customer_id", "note", "created_at", "order_date", "amount"],
            1,
        )]);
        let summary = &cat.summary()[0];
        assert_eq!(
            summary.key_columns,
            vec!["id", "customer_id", "created_at", "order_date"]
        );
        assert_eq!(summary.columns.len(), 6);
    }

    #[test]
    fn key_columns_are_capped() {
        let cols: Vec<String> = (0..15).map(|i| format!("ref{i}_id")).collect();
        let refs: Vec<&str> = cols.iter().map(String::as_str).collect();
        let cat = catalog(vec![table("wide", &refs, 1)]);
        assert_eq!(cat.summary()[0].key_columns.len(), 10);
    }

    #[test]
    fn has_data_follows_row_count_and_samples() {
        let mut empty = table("empty", &["id"], 0);
        let mut sampled = table("sampled", &["id"], 0);
        sampled.sample_data = vec![json!({"id": 1}).as_object().cloned().unwrap()];
        empty.sample_data.clear();
        let cat = catalog(vec![empty, sampled]);
        let summaries = cat.summary();
        assert!(!summary_of(&summaries, "empty").has_data);
        assert!(summary_of(&summaries, "sampled").has_data);
    }

    #[test]
    fn detail_only_returns_requested_tables_with_two_samples() {
        let mut orders = table("orders", &["id", "total"], 3);
        orders.sample_data = (1..=3)
            .map(|i| json!({"id": i, "total": 10 * i}).as_object().cloned().unwrap())
            .collect();
        let cat = catalog(vec![orders, table("customers", &["id"], 2)]);

        let names: BTreeSet<String> = ["orders".to_string(), "ghost".to_string()].into();
        let details = cat.detail(&names);
        assert_eq!(details.len(), 1);
        let orders = &details[0];
        assert_eq!(orders.sample_rows.len(), 2);
        assert!(orders.columns[0].primary_key);
        assert!(!orders.columns[1].primary_key);
        assert_eq!(orders.indexes, vec!["orders_pkey"]);
    }

    #[test]
    fn empty_catalog_returns_nothing() {
        let cat = Catalog::empty();
        assert!(cat.summary().is_empty());
        assert!(cat.detail(&BTreeSet::from(["orders".to_string()])).is_empty());
        assert!(!cat.is_loaded());
    }
}
