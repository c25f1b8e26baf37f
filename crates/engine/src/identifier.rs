use crate::prompt::{self, recent_history, summary_fragment};
use catalog::TableSummary;
use common::types::ChatMessage;
use minijinja::context;
use serde_json::Value;
use shared_clients::llm::{parse_llm_json, CompletionGateway, LlmJson};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct IdentifierSettings {
    pub temperature: f32,
    pub timeout: Duration,
    pub schema_chars: usize,
    pub history_turns: usize,
    pub history_chars: usize,
    pub hints: Vec<String>,
    pub term_mappings: BTreeMap<String, Vec<String>>,
}

/// Picks the tables a question needs from the schema summary.
pub struct TableIdentifier {
    gateway: Arc<dyn CompletionGateway>,
    settings: IdentifierSettings,
}

impl TableIdentifier {
    pub fn new(gateway: Arc<dyn CompletionGateway>, settings: IdentifierSettings) -> Self {
        Self { gateway, settings }
    }

    /// Never fails: any gateway or parse problem yields an empty set, and
    /// names the summary doesn't know are dropped.
    pub async fn identify(
        &self,
        question: &str,
        history: &[ChatMessage],
        summary: &[TableSummary],
    ) -> BTreeSet<String> {
        if summary.is_empty() {
            warn!("no schema summary available; skipping table identification");
            return BTreeSet::new();
        }

        let system = match self.system_prompt(summary) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to render identification prompt");
                return BTreeSet::new();
            }
        };

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(recent_history(
            history,
            self.settings.history_turns,
            self.settings.history_chars,
        ));
        messages.push(ChatMessage::user(question));

        let reply = match self
            .gateway
            .complete(&messages, self.settings.temperature, self.settings.timeout)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "table identification failed");
                return BTreeSet::new();
            }
        };

        let known: HashSet<&str> = summary.iter().map(|t| t.name.as_str()).collect();
        let tables = tables_from_reply(&reply, &known);
        info!(tables = ?tables, "identified tables");
        tables
    }

    fn system_prompt(&self, summary: &[TableSummary]) -> Result<String, minijinja::Error> {
        let (fragment, omitted) = summary_fragment(summary, self.settings.schema_chars);
        if omitted > 0 {
            debug!(omitted, "schema summary truncated for identification");
        }
        let terms: Vec<String> = self
            .settings
            .term_mappings
            .iter()
            .map(|(term, tables)| format!("\"{term}\": {}", tables.join(", ")))
            .collect();
        prompt::render(
            prompt::IDENTIFY,
            context! {
                summary => fragment,
                omitted => omitted,
                hints => &self.settings.hints,
                terms => terms,
            },
        )
    }
}

/// Table names from a `{"tables": [...], "reasoning": ...}` reply. A bare
/// array is accepted too.
fn tables_from_reply(reply: &str, known: &HashSet<&str>) -> BTreeSet<String> {
    let value = match parse_llm_json(reply) {
        LlmJson::Parsed(v) => v,
        LlmJson::Fenced(v) => {
            debug!("identification reply needed unwrapping");
            v
        }
        LlmJson::Unparseable(text) => {
            warn!(reply = %text, "identification reply is not JSON");
            return BTreeSet::new();
        }
    };

    if let Some(reasoning) = value.get("reasoning").and_then(Value::as_str) {
        debug!(reasoning, "identification reasoning");
    }

    let names = match &value {
        Value::Array(items) => items.as_slice(),
        other => match other.get("tables").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => {
                warn!("identification reply has no tables list");
                return BTreeSet::new();
            }
        },
    };

    names
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|name| {
            let keep = known.contains(name);
            if !keep {
                debug!(table = name, "dropping unknown table from identification");
            }
            keep
        })
        .map(str::to_string)
        .collect()
}
