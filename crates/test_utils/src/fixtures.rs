use catalog::{ColumnSchema, ForeignKey, SchemaSnapshot, TableSchema};
use common::types::{QueryOutcome, Row};
use serde_json::Value;

fn column(name: &str, data_type: &str, primary_key: bool) -> ColumnSchema {
    ColumnSchema {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: !primary_key,
        primary_key,
    }
}

fn table(name: &str, columns: &[(&str, &str)], row_count: u64) -> TableSchema {
    TableSchema {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|(n, t)| column(n, t, *n == "id"))
            .collect(),
        primary_keys: vec!["id".to_string()],
        foreign_keys: vec![],
        row_count,
        sample_data: vec![],
        indexes: vec![format!("{name}_pkey")],
    }
}

/// Small sales database: customers, orders with line items, and yearly
/// invoice partitions.
pub fn sales_snapshot() -> SchemaSnapshot {
    let mut order_details = table(
        "order_details",
        &[
            ("id", "integer"),
            ("order_id", "integer"),
            ("product", "text"),
            ("quantity", "integer"),
        ],
        40,
    );
    order_details.foreign_keys.push(ForeignKey {
        column: "order_id".to_string(),
        references_table: "orders".to_string(),
        references_column: "id".to_string(),
    });

    SchemaSnapshot::new(
        "sales",
        vec![
            table("customers", &[("id", "integer"), ("name", "text"), ("region", "text")], 5),
            table(
                "orders",
                &[
                    ("id", "integer"),
                    ("customer_id", "integer"),
                    ("order_date", "date"),
                    ("total", "numeric"),
                ],
                12,
            ),
            order_details,
            table("invoices", &[("id", "integer"), ("amount", "numeric"), ("issued_at", "timestamp")], 8),
            table(
                "invoices_y2023",
                &[("id", "integer"), ("amount", "numeric"), ("issued_at", "timestamp")],
                3,
            ),
        ],
    )
}

/// Rows from JSON objects; columns are taken from the first row.
pub fn outcome(rows: Vec<Value>) -> QueryOutcome {
    let rows: Vec<Row> = rows
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect();
    let columns = rows
        .first()
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default();
    QueryOutcome::new(columns, rows)
}
