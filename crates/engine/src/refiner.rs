use crate::prompt::{self, rows_block};
use common::types::{ChatMessage, QueryOutcome, Row};
use minijinja::context;
use serde_json::Value;
use shared_clients::llm::CompletionGateway;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Turns a result set into a short narrative answer.
pub struct ResultRefiner {
    gateway: Arc<dyn CompletionGateway>,
    temperature: f32,
    timeout: Duration,
    max_rows: usize,
    fallback_rows: usize,
}

impl ResultRefiner {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        temperature: f32,
        timeout: Duration,
        max_rows: usize,
        fallback_rows: usize,
    ) -> Self {
        Self {
            gateway,
            temperature,
            timeout,
            max_rows,
            fallback_rows,
        }
    }

    pub async fn refine(&self, question: &str, sql: &str, outcome: &QueryOutcome) -> String {
        if outcome.is_empty() {
            return no_results(question);
        }

        let shown = outcome.rows.len().min(self.max_rows);
        let rendered = prompt::render(
            prompt::REFINE,
            context! {
                question => question,
                sql => sql,
                row_count => outcome.row_count,
                shown => shown,
                rows => rows_block(&outcome.rows[..shown]),
            },
        );
        let prompt = match rendered {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to render refine prompt");
                return fallback_answer(outcome, self.fallback_rows);
            }
        };

        let messages = [ChatMessage::system(prompt::REFINE_SYSTEM), ChatMessage::user(prompt)];
        match self
            .gateway
            .complete(&messages, self.temperature, self.timeout)
            .await
        {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => {
                warn!("refiner returned an empty answer; using fallback");
                fallback_answer(outcome, self.fallback_rows)
            }
            Err(e) => {
                warn!(error = %e, "refiner failed; using fallback");
                fallback_answer(outcome, self.fallback_rows)
            }
        }
    }
}

pub fn no_results(question: &str) -> String {
    format!(
        "No results were found for \"{}\". The query ran successfully but matched no rows; \
try widening the date range or loosening the filters.",
        question.trim()
    )
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_row(row: &Row) -> String {
    row.iter()
        .map(|(k, v)| format!("{k}: {}", render_value(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Plain listing of the first `limit` rows plus a count of the rest.
pub fn fallback_answer(outcome: &QueryOutcome, limit: usize) -> String {
    let noun = if outcome.row_count == 1 { "row" } else { "rows" };
    let mut out = format!("Found {} {noun}:\n", outcome.row_count);
    for (i, row) in outcome.rows.iter().take(limit).enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, render_row(row));
    }
    let remaining = outcome.row_count.saturating_sub(limit);
    if remaining > 0 {
        let _ = writeln!(out, "...and {remaining} more.");
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_utils::fixtures::outcome;
    use test_utils::ScriptedGateway;

    fn refiner(gateway: Arc<ScriptedGateway>) -> ResultRefiner {
        ResultRefiner::new(gateway, 0.3, Duration::from_secs(5), 100, 10)
    }

    #[tokio::test]
    async fn zero_rows_skip_the_gateway() {
        let gateway = Arc::new(ScriptedGateway::new());
        let answer = refiner(gateway.clone())
            .refine("orders from 1999", "SELECT 1", &outcome(vec![]))
            .await;
        assert!(answer.starts_with("No results were found"));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn prompt_is_capped_at_max_rows() {
        let rows = (0..150).map(|i| json!({"id": i})).collect();
        let gateway = Arc::new(ScriptedGateway::new().reply("  150 orders.  "));
        let answer = refiner(gateway.clone())
            .refine("how many", "SELECT id FROM orders", &outcome(rows))
            .await;
        assert_eq!(answer, "150 orders.");

        let call = &gateway.calls()[0];
        assert_eq!(call.temperature, 0.3);
        let prompt = call.prompt();
        assert!(prompt.contains("150 rows (first 100 shown)"));
        assert!(prompt.contains(r#"{"id":99}"#));
        assert!(!prompt.contains(r#"{"id":100}"#));
    }

    #[tokio::test]
    async fn gateway_failure_falls_back_to_listing() {
        let rows = (1..=12).map(|i| json!({"region": "north", "total": i})).collect();
        let gateway = Arc::new(ScriptedGateway::new().time_out());
        let answer = refiner(gateway)
            .refine("totals", "SELECT region, total FROM t", &outcome(rows))
            .await;
        assert!(answer.starts_with("Found 12 rows:"));
        assert!(answer.contains("1. region: north, total: 1"));
        assert!(answer.contains("10. region: north, total: 10"));
        assert!(!answer.contains("11. "));
        assert!(answer.ends_with("...and 2 more."));
    }

    #[test]
    fn fallback_for_single_row() {
        let answer = fallback_answer(&outcome(vec![json!({"count": 3, "note": null})]), 10);
        assert_eq!(answer, "Found 1 row:\n1. count: 3, note: null");
    }
}
