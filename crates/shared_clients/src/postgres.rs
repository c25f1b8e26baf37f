use crate::{QueryStore, StoreError};
use async_trait::async_trait;
use common::config::components::connections::DatabaseAdapterType;
use common::types::{QueryOutcome, Row, SqlParam};
use serde_json::Value;
use std::collections::HashSet;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Error, NoTls};
use tracing::{debug, error};

impl From<Error> for StoreError {
    #[track_caller]
    fn from(err: Error) -> Self {
        if let Some(e) = err.as_db_error() {
            // keep the server's message verbatim; repair matching depends on it
            let message = e.message().to_string();
            match e.code() {
                &SqlState::CONNECTION_DOES_NOT_EXIST
                | &SqlState::CONNECTION_FAILURE
                | &SqlState::INVALID_PASSWORD
                | &SqlState::INVALID_AUTHORIZATION_SPECIFICATION => {
                    StoreError::invalid_connection(message)
                }
                &SqlState::SYNTAX_ERROR => StoreError::syntax(message),
                &SqlState::QUERY_CANCELED => StoreError::timeout(message),
                _ => StoreError::query(message),
            }
        } else if err.is_closed() {
            StoreError::invalid_connection(err.to_string())
        } else {
            StoreError::query(err.to_string())
        }
    }
}

pub struct PostgresStore {
    client: Client,
    _driver: tokio::task::JoinHandle<()>, // keep the task alive
}

impl PostgresStore {
    /// Connect and spawn the connection driver in the background. When
    /// `statement_timeout_secs` is set it is applied to the session.
    pub async fn connect(
        host: &str,
        port: u16,
        db: &str,
        user: &str,
        password: &str,
        statement_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        let conn_str = format!(
            "host={} port={} user={} password={} dbname={}",
            host, port, user, password, db
        );
        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection closed: {e}");
            }
        });

        if let Some(secs) = statement_timeout_secs {
            client
                .batch_execute(&format!("SET statement_timeout = {}", secs * 1000))
                .await?;
        }

        Ok(Self {
            client,
            _driver: driver,
        })
    }
}

fn param_type(param: &SqlParam) -> Type {
    match param {
        SqlParam::Null | SqlParam::Text(_) => Type::TEXT,
        SqlParam::Bool(_) => Type::BOOL,
        SqlParam::Int(_) => Type::INT8,
        SqlParam::Float(_) => Type::FLOAT8,
    }
}

fn param_value(param: &SqlParam) -> &(dyn ToSql + Sync) {
    static NULL: Option<&str> = None;
    match param {
        SqlParam::Null => &NULL,
        SqlParam::Bool(v) => v,
        SqlParam::Int(v) => v,
        SqlParam::Float(v) => v,
        SqlParam::Text(v) => v,
    }
}

/// Wrap a statement so every row comes back as one `json` array of its
/// values in column order. This lets any column type (numeric, timestamptz,
/// arrays, ...) reach the caller without per-type decoding, and keeps columns
/// that share a name apart. The newline keeps a trailing `--` comment from
/// swallowing the closing paren.
pub(crate) fn wrap_as_json(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';').trim_end();
    format!(
        "SELECT (SELECT json_agg(e.value ORDER BY e.n) \
FROM json_each(row_to_json(q)) WITH ORDINALITY AS e(key, value, n)) \
FROM ({inner}\n) AS q"
    )
}

/// Result column names with repeats suffixed (`id`, `id_2`, ...) so each
/// one keys its own value in a row.
pub(crate) fn unique_column_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let mut candidate = name.to_string();
        let mut n = 1;
        while !seen.insert(candidate.clone()) {
            n += 1;
            candidate = format!("{name}_{n}");
        }
        out.push(candidate);
    }
    out
}

fn row_from_values(columns: &[String], value: Value) -> Result<Row, StoreError> {
    let values = match value {
        Value::Array(values) => values,
        Value::Null => Vec::new(),
        other => {
            return Err(StoreError::query(format!(
                "expected a json array per row, got {other}"
            )))
        }
    };
    if values.len() != columns.len() {
        return Err(StoreError::query(format!(
            "row has {} values for {} columns",
            values.len(),
            columns.len()
        )));
    }
    Ok(columns.iter().cloned().zip(values).collect())
}

#[async_trait]
impl QueryStore for PostgresStore {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<QueryOutcome, StoreError> {
        let types: Vec<Type> = params.iter().map(param_type).collect();
        let values: Vec<&(dyn ToSql + Sync)> = params.iter().map(param_value).collect();

        // prepare the statement as written first so errors quote it, and so
        // column order survives even when no rows come back
        let stmt = self
            .client
            .prepare_typed(sql.trim().trim_end_matches(';'), &types)
            .await?;
        let columns = unique_column_names(stmt.columns().iter().map(|c| c.name()));

        let wrapped = self.client.prepare_typed(&wrap_as_json(sql), &types).await?;
        let rows = self.client.query(&wrapped, &values).await?;
        debug!(rows = rows.len(), "postgres query returned");

        let mut out: Vec<Row> = Vec::with_capacity(rows.len());
        for row in rows {
            let value: Option<Value> = row.try_get(0)?;
            out.push(row_from_values(&columns, value.unwrap_or(Value::Null))?);
        }

        Ok(QueryOutcome::new(columns, out))
    }

    fn adapter_type(&self) -> DatabaseAdapterType {
        DatabaseAdapterType::Postgres
    }
}
