pub mod llm;
pub mod postgres;

use crate::postgres::PostgresStore;
use async_trait::async_trait;
use common::config::components::connections::{AdapterConnectionDetails, DatabaseAdapterType};
use common::error::diagnostics::DiagnosticMessage;
use common::types::{QueryOutcome, SqlParam};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid connection details: {context}")]
    InvalidConnection { context: DiagnosticMessage },
    #[error("syntax error: {context}")]
    Syntax { context: DiagnosticMessage },
    #[error("statement timed out: {context}")]
    Timeout { context: DiagnosticMessage },
    #[error("query failed: {context}")]
    Query { context: DiagnosticMessage },
    #[error("configuration error: {context}")]
    Config { context: DiagnosticMessage },
}

impl StoreError {
    #[track_caller]
    pub fn invalid_connection(message: impl Into<String>) -> Self {
        Self::InvalidConnection {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    /// The store's own error text, without call-site decoration. Repair
    /// trigger patterns are matched against this.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidConnection { context }
            | Self::Syntax { context }
            | Self::Timeout { context }
            | Self::Query { context }
            | Self::Config { context } => context.message(),
        }
    }
}

/// A relational store the pipeline can run read-only statements against.
#[async_trait]
pub trait QueryStore: Send + Sync {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<QueryOutcome, StoreError>;

    fn adapter_type(&self) -> DatabaseAdapterType;
}

pub type DynStore = Arc<dyn QueryStore>;

pub async fn create_store(conn_details: AdapterConnectionDetails) -> Result<DynStore, StoreError> {
    match conn_details.adapter_type {
        DatabaseAdapterType::Postgres => {
            let port = conn_details.port.parse::<u16>().map_err(|_| {
                StoreError::config(format!("port '{}' is not a valid u16", conn_details.port))
            })?;
            let store = PostgresStore::connect(
                conn_details.host.as_str(),
                port,
                conn_details.database.as_str(),
                conn_details.user.as_str(),
                conn_details.password.as_str(),
                conn_details.statement_timeout_secs,
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}
