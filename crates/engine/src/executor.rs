use crate::error::ExecutionError;
use crate::generator::SqlCandidate;
use crate::prompt;
use crate::validator::ValidatedSql;
use catalog::TableDetail;
use common::types::{ChatMessage, QueryOutcome};
use minijinja::context;
use serde::Serialize;
use shared_clients::llm::CompletionGateway;
use shared_clients::{QueryStore, StoreError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Where a statement is in its single-retry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Generated,
    Validated,
    Executed,
    Failed,
    Repairing,
    Reexecuted,
    Succeeded,
    PermanentlyFailed,
}

#[derive(Debug, Clone)]
pub struct Execution {
    pub sql: ValidatedSql,
    pub outcome: QueryOutcome,
    pub repaired: bool,
}

#[derive(Serialize)]
struct KnownColumns<'a> {
    name: &'a str,
    columns: Vec<&'a str>,
}

pub struct QueryExecutor {
    store: Arc<dyn QueryStore>,
    gateway: Arc<dyn CompletionGateway>,
    repair_patterns: Vec<String>,
    temperature: f32,
    timeout: Duration,
}

impl QueryExecutor {
    /// `repair_patterns` are matched case-insensitively as substrings of the
    /// store's error message.
    pub fn new(
        store: Arc<dyn QueryStore>,
        gateway: Arc<dyn CompletionGateway>,
        repair_patterns: Vec<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            repair_patterns: repair_patterns.into_iter().map(|p| p.to_lowercase()).collect(),
            temperature,
            timeout,
        }
    }

    pub fn is_repairable(&self, err: &StoreError) -> bool {
        let message = err.message().to_lowercase();
        self.repair_patterns.iter().any(|p| message.contains(p.as_str()))
    }

    async fn execute(&self, sql: &ValidatedSql) -> Result<QueryOutcome, StoreError> {
        let started = Instant::now();
        let result = self.store.execute(sql.as_str(), &[]).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => info!(sql = %sql, elapsed_ms, rows = outcome.row_count, "query executed"),
            Err(e) => warn!(sql = %sql, elapsed_ms, error = %e, "query failed"),
        }
        result
    }

    /// Validate and run `candidate`. A repairable failure gets exactly one
    /// repaired statement, which is validated and run in turn.
    pub async fn run(
        &self,
        question: &str,
        candidate: SqlCandidate,
        tables: &[TableDetail],
    ) -> Result<Execution, ExecutionError> {
        let mut state = ExecState::Generated;
        let sql = ValidatedSql::check(&candidate)
            .map_err(|r| ExecutionError::rejected(candidate.as_str(), r))?;
        transition(&mut state, ExecState::Validated);

        let failure = match self.execute(&sql).await {
            Ok(outcome) => {
                transition(&mut state, ExecState::Executed);
                transition(&mut state, ExecState::Succeeded);
                return Ok(Execution {
                    sql,
                    outcome,
                    repaired: false,
                });
            }
            Err(e) => e,
        };
        transition(&mut state, ExecState::Failed);

        if !self.is_repairable(&failure) {
            transition(&mut state, ExecState::PermanentlyFailed);
            return Err(ExecutionError::store(sql.into_inner(), failure));
        }

        transition(&mut state, ExecState::Repairing);
        let repaired = self.repair(question, &sql, &failure, tables).await?;
        let repaired = ValidatedSql::check(&repaired)
            .map_err(|r| ExecutionError::rejected(repaired.as_str(), r))?;

        match self.execute(&repaired).await {
            Ok(outcome) => {
                transition(&mut state, ExecState::Reexecuted);
                transition(&mut state, ExecState::Succeeded);
                Ok(Execution {
                    sql: repaired,
                    outcome,
                    repaired: true,
                })
            }
            Err(e) => {
                transition(&mut state, ExecState::PermanentlyFailed);
                Err(ExecutionError::repair_failed(repaired.into_inner(), e))
            }
        }
    }

    async fn repair(
        &self,
        question: &str,
        sql: &ValidatedSql,
        failure: &StoreError,
        tables: &[TableDetail],
    ) -> Result<SqlCandidate, ExecutionError> {
        let known: Vec<KnownColumns> = tables
            .iter()
            .map(|t| KnownColumns {
                name: &t.name,
                columns: t.column_names().collect(),
            })
            .collect();
        let prompt = prompt::render(
            prompt::REPAIR,
            context! {
                sql => sql.as_str(),
                error => failure.message(),
                tables => known,
                question => question,
            },
        )
        .map_err(|e| ExecutionError::repair(sql.as_str(), e.to_string(), None))?;

        info!(error = failure.message(), "asking for a repaired statement");
        let reply = self
            .gateway
            .complete(&[ChatMessage::user(prompt)], self.temperature, self.timeout)
            .await
            .map_err(|e| ExecutionError::repair(sql.as_str(), "completion failed", Some(e)))?;

        let candidate = SqlCandidate::from_reply(&reply)
            .ok_or_else(|| ExecutionError::repair(sql.as_str(), "reply contained no statement", None))?;
        info!(sql = %candidate, "repaired statement");
        Ok(candidate)
    }
}

fn transition(state: &mut ExecState, next: ExecState) {
    tracing::debug!(from = ?*state, to = ?next, "execution state");
    *state = next;
}
