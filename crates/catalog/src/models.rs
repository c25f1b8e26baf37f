use chrono::{DateTime, Utc};
use common::types::Row;
use serde::{Deserialize, Serialize};

/// Everything known about one database at extraction time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaSnapshot {
    pub database: String,
    #[serde(default)]
    pub extracted_at: Option<DateTime<Utc>>,
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    pub fn new(database: impl Into<String>, tables: Vec<TableSchema>) -> Self {
        Self {
            database: database.into(),
            extracted_at: Some(Utc::now()),
            tables,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub sample_data: Vec<Row>,
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl TableSchema {
    pub fn has_data(&self) -> bool {
        self.row_count > 0 || !self.sample_data.is_empty()
    }

    pub fn is_primary_key(&self, column: &ColumnSchema) -> bool {
        column.primary_key || self.primary_keys.iter().any(|pk| pk == &column.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

/// Lightweight per-table view used to pick relevant tables.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableSummary {
    pub name: String,
    pub columns: Vec<String>,
    pub has_data: bool,
    pub row_count: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub year_partitions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_table: Option<String>,
    pub key_columns: Vec<String>,
}

/// Full per-table view used to write and repair SQL.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableDetail {
    pub name: String,
    pub columns: Vec<ColumnDetail>,
    pub indexes: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub row_count: u64,
    pub sample_rows: Vec<Row>,
}

impl TableDetail {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnDetail {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}
