//! Builds a [`SchemaSnapshot`] from a live Postgres store.

use crate::error::CatalogError;
use crate::models::{ColumnSchema, ForeignKey, SchemaSnapshot, TableSchema};
use crate::SchemaCache;
use common::types::{Row, SqlParam};
use serde_json::Value;
use shared_clients::QueryStore;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

const SAMPLE_ROWS: usize = 2;

const COLUMNS_SQL: &str = "SELECT c.table_name::text AS table_name, \
       c.column_name::text AS column_name, \
       c.data_type::text AS data_type, \
       (c.is_nullable = 'YES') AS nullable, \
       c.ordinal_position::int8 AS position \
  FROM information_schema.columns c \
  JOIN information_schema.tables t \
    ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
 WHERE c.table_schema::text = $1 AND t.table_type = 'BASE TABLE' \
 ORDER BY c.table_name, c.ordinal_position";

const PRIMARY_KEYS_SQL: &str = "SELECT kcu.table_name::text AS table_name, \
       kcu.column_name::text AS column_name \
  FROM information_schema.table_constraints tc \
  JOIN information_schema.key_column_usage kcu \
    ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema \
 WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema::text = $1 \
 ORDER BY kcu.table_name, kcu.ordinal_position";

const FOREIGN_KEYS_SQL: &str = "SELECT kcu.table_name::text AS table_name, \
       kcu.column_name::text AS column_name, \
       ccu.table_name::text AS references_table, \
       ccu.column_name::text AS references_column \
  FROM information_schema.table_constraints tc \
  JOIN information_schema.key_column_usage kcu \
    ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema \
  JOIN information_schema.constraint_column_usage ccu \
    ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
 WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema::text = $1 \
 ORDER BY kcu.table_name, kcu.column_name";

const INDEXES_SQL: &str = "SELECT tablename::text AS table_name, indexname::text AS index_name \
  FROM pg_indexes \
 WHERE schemaname::text = $1 \
 ORDER BY tablename, indexname";

const ROW_COUNTS_SQL: &str = "SELECT c.relname::text AS table_name, \
       c.reltuples::int8 AS row_count \
  FROM pg_class c \
  JOIN pg_namespace n ON n.oid = c.relnamespace \
 WHERE n.nspname::text = $1 AND c.relkind IN ('r', 'p')";

fn text(row: &Row, key: &str) -> Result<String, CatalogError> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CatalogError::extraction(format!("catalog row is missing text field '{key}'")))
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Read columns, keys, indexes, estimated row counts and a couple of sample
/// rows for every base table in `schema`.
pub async fn extract_snapshot(
    store: &dyn QueryStore,
    database: &str,
    schema: &str,
) -> Result<SchemaSnapshot, CatalogError> {
    let params = [SqlParam::from(schema)];
    let mut tables: BTreeMap<String, TableSchema> = BTreeMap::new();

    let mut columns = store.execute(COLUMNS_SQL, &params).await?.rows;
    columns.sort_by_key(|r| {
        (
            r.get("table_name").and_then(Value::as_str).map(str::to_string),
            r.get("position").and_then(Value::as_i64),
        )
    });
    for row in &columns {
        let table_name = text(row, "table_name")?;
        let table = tables
            .entry(table_name.clone())
            .or_insert_with(|| TableSchema {
                name: table_name,
                columns: Vec::new(),
                primary_keys: Vec::new(),
                foreign_keys: Vec::new(),
                row_count: 0,
                sample_data: Vec::new(),
                indexes: Vec::new(),
            });
        table.columns.push(ColumnSchema {
            name: text(row, "column_name")?,
            data_type: text(row, "data_type")?,
            nullable: row.get("nullable").and_then(Value::as_bool).unwrap_or(true),
            primary_key: false,
        });
    }
    if tables.is_empty() {
        return Err(CatalogError::extraction(format!(
            "schema '{schema}' in '{database}' has no readable tables"
        )));
    }

    for row in store.execute(PRIMARY_KEYS_SQL, &params).await?.rows {
        let column = text(&row, "column_name")?;
        if let Some(table) = tables.get_mut(&text(&row, "table_name")?) {
            if let Some(c) = table.columns.iter_mut().find(|c| c.name == column) {
                c.primary_key = true;
            }
            table.primary_keys.push(column);
        }
    }

    for row in store.execute(FOREIGN_KEYS_SQL, &params).await?.rows {
        if let Some(table) = tables.get_mut(&text(&row, "table_name")?) {
            table.foreign_keys.push(ForeignKey {
                column: text(&row, "column_name")?,
                references_table: text(&row, "references_table")?,
                references_column: text(&row, "references_column")?,
            });
        }
    }

    for row in store.execute(INDEXES_SQL, &params).await?.rows {
        if let Some(table) = tables.get_mut(&text(&row, "table_name")?) {
            table.indexes.push(text(&row, "index_name")?);
        }
    }

    // reltuples is -1 until the table is first analyzed
    let mut analyzed_empty: HashSet<String> = HashSet::new();
    for row in store.execute(ROW_COUNTS_SQL, &params).await?.rows {
        let name = text(&row, "table_name")?;
        let estimate = row.get("row_count").and_then(Value::as_i64).unwrap_or(-1);
        if let Some(table) = tables.get_mut(&name) {
            table.row_count = estimate.max(0) as u64;
            if estimate == 0 {
                analyzed_empty.insert(name);
            }
        }
    }

    for table in tables.values_mut() {
        if analyzed_empty.contains(&table.name) {
            debug!(table = %table.name, "skipping sample of empty table");
            continue;
        }
        let sql = format!(
            "SELECT * FROM {}.{} LIMIT {SAMPLE_ROWS}",
            quote_ident(schema),
            quote_ident(&table.name)
        );
        let sample = store.execute(&sql, &[]).await?;
        // planner estimates lag behind small freshly loaded tables
        table.row_count = table.row_count.max(sample.row_count as u64);
        table.sample_data = sample.rows;
        debug!(table = %table.name, rows = table.row_count, "extracted table");
    }

    info!(database, schema, tables = tables.len(), "schema extracted");
    Ok(SchemaSnapshot::new(database, tables.into_values().collect()))
}

/// Extract, write to the cache directory and replace the cached copy.
pub async fn refresh_snapshot(
    store: &dyn QueryStore,
    cache: &SchemaCache,
    database: &str,
    schema: &str,
) -> Result<Arc<SchemaSnapshot>, CatalogError> {
    let snapshot = extract_snapshot(store, database, schema).await?;
    cache.persist(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::config::components::connections::DatabaseAdapterType;
    use common::types::QueryOutcome;
    use parking_lot::Mutex;
    use serde_json::json;
    use shared_clients::StoreError;

    #[derive(Default)]
    struct CatalogStore {
        executed: Mutex<Vec<String>>,
    }

    fn rows(values: Vec<Value>) -> QueryOutcome {
        QueryOutcome::new(
            vec![],
            values
                .into_iter()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
        )
    }

    #[async_trait]
    impl QueryStore for CatalogStore {
        async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<QueryOutcome, StoreError> {
            self.executed.lock().push(sql.to_string());
            if sql.contains("information_schema.columns") {
                assert_eq!(params, &[SqlParam::from("public")]);
                return Ok(rows(vec![
                    json!({"table_name": "orders", "column_name": "total", "data_type": "numeric", "nullable": true, "position": 2}),
                    json!({"table_name": "orders", "column_name": "id", "data_type": "integer", "nullable": false, "position": 1}),
                    json!({"table_name": "order_details", "column_name": "order_id", "data_type": "integer", "nullable": false, "position": 1}),
                ]));
            }
            if sql.contains("'PRIMARY KEY'") {
                return Ok(rows(vec![json!({"table_name": "orders", "column_name": "id"})]));
            }
            if sql.contains("'FOREIGN KEY'") {
                return Ok(rows(vec![json!({
                    "table_name": "order_details",
                    "column_name": "order_id",
                    "references_table": "orders",
                    "references_column": "id"
                })]));
            }
            if sql.contains("pg_indexes") {
                return Ok(rows(vec![json!({"table_name": "orders", "index_name": "orders_pkey"})]));
            }
            if sql.contains("pg_class") {
                return Ok(rows(vec![
                    json!({"table_name": "orders", "row_count": -1}),
                    json!({"table_name": "order_details", "row_count": 0}),
                ]));
            }
            if sql.contains("\"orders\"") {
                return Ok(rows(vec![json!({"id": 1, "total": 5}), json!({"id": 2, "total": 7})]));
            }
            Ok(QueryOutcome::default())
        }

        fn adapter_type(&self) -> DatabaseAdapterType {
            DatabaseAdapterType::Postgres
        }
    }

    #[tokio::test]
    async fn assembles_tables_from_catalog_queries() {
        let store = CatalogStore::default();
        let snapshot = extract_snapshot(&store, "sales", "public").await.unwrap();

        let names: Vec<_> = snapshot.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["order_details", "orders"]);

        let orders = snapshot.table("orders").unwrap();
        assert_eq!(orders.columns[0].name, "id");
        assert!(orders.columns[0].primary_key);
        assert!(!orders.columns[0].nullable);
        assert_eq!(orders.primary_keys, vec!["id"]);
        assert_eq!(orders.indexes, vec!["orders_pkey"]);
        assert_eq!(orders.sample_data.len(), 2);
        assert_eq!(orders.row_count, 2);
        assert!(orders.has_data());

        let details = snapshot.table("order_details").unwrap();
        assert_eq!(details.foreign_keys[0].references_table, "orders");
        assert!(!details.has_data());

        let executed = store.executed.lock();
        assert!(executed
            .iter()
            .any(|s| s == "SELECT * FROM \"public\".\"orders\" LIMIT 2"));
        // analyzed and empty, so never sampled
        assert!(!executed.iter().any(|s| s.contains("\"order_details\"")));
    }

    #[tokio::test]
    async fn refresh_writes_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SchemaCache::new(dir.path());
        let snapshot = refresh_snapshot(&CatalogStore::default(), &cache, "sales", "public")
            .await
            .unwrap();
        assert_eq!(snapshot.tables.len(), 2);
        assert!(dir.path().join("sales.json").exists());
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
