use crate::validator::Rejection;
use catalog::error::CatalogError;
use common::error::diagnostics::DiagnosticMessage;
use shared_clients::llm::LlmError;
use shared_clients::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion failed: {context}")]
    Gateway {
        context: DiagnosticMessage,
        #[source]
        source: LlmError,
    },
    #[error("model returned no SQL: {context}")]
    Empty { context: DiagnosticMessage },
    #[error("prompt of {chars} chars exceeds the {limit} char ceiling: {context}")]
    PromptTooLarge {
        chars: usize,
        limit: usize,
        context: DiagnosticMessage,
    },
    #[error("prompt rendering failed: {context}")]
    Template {
        context: DiagnosticMessage,
        #[source]
        source: minijinja::Error,
    },
}

impl GenerationError {
    #[track_caller]
    pub fn empty(message: impl Into<String>) -> Self {
        Self::Empty {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn prompt_too_large(chars: usize, limit: usize) -> Self {
        Self::PromptTooLarge {
            chars,
            limit,
            context: common::diag!("prompt still too large after truncation"),
        }
    }
}

impl From<LlmError> for GenerationError {
    #[track_caller]
    fn from(source: LlmError) -> Self {
        Self::Gateway {
            context: DiagnosticMessage::new("SQL generation".to_string()),
            source,
        }
    }
}

impl From<minijinja::Error> for GenerationError {
    #[track_caller]
    fn from(source: minijinja::Error) -> Self {
        Self::Template {
            context: DiagnosticMessage::new(source.to_string()),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("statement rejected ({source}): {sql}")]
    Rejected {
        sql: String,
        #[source]
        source: Rejection,
    },
    #[error("query failed: {context}")]
    Store {
        sql: String,
        context: DiagnosticMessage,
        #[source]
        source: StoreError,
    },
    #[error("repair could not be generated: {context}")]
    Repair {
        sql: String,
        context: DiagnosticMessage,
        #[source]
        source: Option<LlmError>,
    },
    #[error("repaired query failed: {context}")]
    RepairFailed {
        sql: String,
        context: DiagnosticMessage,
        #[source]
        source: StoreError,
    },
}

impl ExecutionError {
    pub fn rejected(sql: impl Into<String>, source: Rejection) -> Self {
        Self::Rejected {
            sql: sql.into(),
            source,
        }
    }

    #[track_caller]
    pub fn store(sql: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            sql: sql.into(),
            context: DiagnosticMessage::new(source.message().to_string()),
            source,
        }
    }

    #[track_caller]
    pub fn repair(sql: impl Into<String>, message: impl Into<String>, source: Option<LlmError>) -> Self {
        Self::Repair {
            sql: sql.into(),
            context: DiagnosticMessage::new(message.into()),
            source,
        }
    }

    #[track_caller]
    pub fn repair_failed(sql: impl Into<String>, source: StoreError) -> Self {
        Self::RepairFailed {
            sql: sql.into(),
            context: DiagnosticMessage::new(source.message().to_string()),
            source,
        }
    }

    /// The last statement that was attempted.
    pub fn sql(&self) -> &str {
        match self {
            Self::Rejected { sql, .. }
            | Self::Store { sql, .. }
            | Self::Repair { sql, .. }
            | Self::RepairFailed { sql, .. } => sql,
        }
    }
}

/// Everything that ends a question without an answer. Each variant maps to
/// the text shown to the user.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no relevant tables identified")]
    IdentificationEmpty { available: Vec<String> },
    #[error("schema unavailable: {0}")]
    Schema(#[from] CatalogError),
    #[error("generation failed: {0}")]
    Generation(GenerationError),
    #[error("validation rejected: {0}")]
    Validation(ExecutionError),
    #[error("execution failed: {0}")]
    Execution(ExecutionError),
    /// `sql` is the statement being repaired when the repair call failed.
    #[error("completion service timed out: {source}")]
    GatewayTimeout {
        #[source]
        source: LlmError,
        sql: Option<String>,
    },
    #[error("completion service unreachable: {source}")]
    GatewayTransport {
        #[source]
        source: LlmError,
        sql: Option<String>,
    },
}

const TRY_REPHRASING: &str = "The language model service did not respond. Please try rephrasing \
your question or ask again in a moment.";

fn lift_gateway(err: LlmError, sql: Option<&str>) -> Result<PipelineError, LlmError> {
    let sql = sql.map(str::to_string);
    match err {
        source @ LlmError::Timeout { .. } => Ok(PipelineError::GatewayTimeout { source, sql }),
        source @ LlmError::Transport { .. } => Ok(PipelineError::GatewayTransport { source, sql }),
        other => Err(other),
    }
}

impl From<GenerationError> for PipelineError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Gateway { context, source } => match lift_gateway(source, None) {
                Ok(lifted) => lifted,
                Err(source) => Self::Generation(GenerationError::Gateway { context, source }),
            },
            other => Self::Generation(other),
        }
    }
}

impl From<ExecutionError> for PipelineError {
    fn from(err: ExecutionError) -> Self {
        match err {
            e @ ExecutionError::Rejected { .. } => Self::Validation(e),
            ExecutionError::Repair {
                sql,
                context,
                source: Some(source),
            } => match lift_gateway(source, Some(&sql)) {
                Ok(lifted) => lifted,
                Err(source) => Self::Execution(ExecutionError::Repair {
                    sql,
                    context,
                    source: Some(source),
                }),
            },
            other => Self::Execution(other),
        }
    }
}

impl PipelineError {
    /// Text for the `answer` field of a failed response.
    pub fn answer(&self) -> String {
        match self {
            Self::IdentificationEmpty { available } => {
                let mut answer = "I couldn't work out which tables hold the data for that \
question. Try naming the kind of records you mean (for example orders, customers or invoices) \
and the time period you are interested in."
                    .to_string();
                if !available.is_empty() {
                    let shown: Vec<&str> = available.iter().take(10).map(String::as_str).collect();
                    answer.push_str(&format!(" Available tables include: {}.", shown.join(", ")));
                }
                answer
            }
            Self::Schema(_) => {
                "The database schema is not available right now, so the question could not be \
answered. Refresh the schema snapshot and try again."
                    .to_string()
            }
            Self::Generation(GenerationError::PromptTooLarge { .. }) => {
                "The question touches too much of the database to answer in one go. Try asking \
about fewer tables or a narrower topic."
                    .to_string()
            }
            Self::Generation(_) => {
                "I couldn't write a query for that question. Try rephrasing it more specifically."
                    .to_string()
            }
            Self::Validation(err) => match err {
                ExecutionError::Rejected { source, .. } => format!(
                    "The generated query was blocked because only read-only queries are allowed \
({source}). Try rephrasing the question as a request to look up data."
                ),
                other => format!("The generated query was blocked: {other}"),
            },
            Self::Execution(err) => format!(
                "The query could not be run against the database: {}. Try rephrasing the \
question or naming the columns you are interested in.",
                execution_reason(err)
            ),
            Self::GatewayTimeout { .. } | Self::GatewayTransport { .. } => TRY_REPHRASING.to_string(),
        }
    }

    /// Statement to report alongside the failure, if one was produced.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Validation(e) | Self::Execution(e) => Some(e.sql()),
            Self::GatewayTimeout { sql, .. } | Self::GatewayTransport { sql, .. } => sql.as_deref(),
            _ => None,
        }
    }
}

fn execution_reason(err: &ExecutionError) -> String {
    match err {
        ExecutionError::Store { source, .. } | ExecutionError::RepairFailed { source, .. } => {
            source.message().to_string()
        }
        ExecutionError::Repair { context, .. } => context.message().to_string(),
        ExecutionError::Rejected { source, .. } => source.to_string(),
    }
}
