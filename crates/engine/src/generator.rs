use crate::error::GenerationError;
use crate::prompt::{self, column_block, recent_history, schema_block};
use catalog::{TableDetail, TableSummary};
use common::types::ChatMessage;
use common::utils::truncate_chars;
use minijinja::context;
use shared_clients::llm::{strip_code_fences, CompletionGateway};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const ROW_LIMIT: usize = 1000;

/// One statement proposed by the model. A repair produces a new candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlCandidate(String);

impl SqlCandidate {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    /// Strip code fences and surrounding whitespace from a model reply.
    /// `None` when nothing is left.
    pub fn from_reply(reply: &str) -> Option<Self> {
        let sql = strip_code_fences(reply);
        let sql = sql.trim();
        if sql.is_empty() {
            None
        } else {
            Some(Self(sql.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SqlCandidate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub temperature: f32,
    pub timeout: Duration,
    pub prompt_chars: usize,
    pub history_turns: usize,
    pub history_chars: usize,
}

pub struct SqlGenerator {
    gateway: Arc<dyn CompletionGateway>,
    settings: GeneratorSettings,
}

struct PromptParts {
    schema: String,
    columns: String,
    history: Vec<ChatMessage>,
}

impl PromptParts {
    fn messages(&self, question: &str) -> Result<Vec<ChatMessage>, minijinja::Error> {
        let system = prompt::render(
            prompt::GENERATE,
            context! {
                schema_block => &self.schema,
                column_block => &self.columns,
                row_limit => ROW_LIMIT,
            },
        )?;
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(question));
        Ok(messages)
    }
}

fn prompt_chars(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| m.content.chars().count()).sum()
}

fn shrink(text: &str, numerator: usize, denominator: usize) -> String {
    let target = text.chars().count() * numerator / denominator;
    truncate_chars(text, target)
}

impl SqlGenerator {
    pub fn new(gateway: Arc<dyn CompletionGateway>, settings: GeneratorSettings) -> Self {
        Self { gateway, settings }
    }

    /// Build the prompt under the ceiling. Cuts are applied in order until
    /// it fits: schema listing to a quarter, column listing to a half,
    /// each history message to three quarters.
    fn fit_prompt(
        &self,
        question: &str,
        mut parts: PromptParts,
    ) -> Result<Vec<ChatMessage>, GenerationError> {
        let limit = self.settings.prompt_chars;
        let mut messages = parts.messages(question)?;

        for step in 0..3 {
            let chars = prompt_chars(&messages);
            if chars <= limit {
                return Ok(messages);
            }
            debug!(chars, limit, step, "generation prompt over ceiling; truncating");
            match step {
                0 => parts.schema = shrink(&parts.schema, 1, 4),
                1 => parts.columns = shrink(&parts.columns, 1, 2),
                _ => {
                    for message in &mut parts.history {
                        message.content = shrink(&message.content, 3, 4);
                    }
                }
            }
            messages = parts.messages(question)?;
        }

        let chars = prompt_chars(&messages);
        if chars <= limit {
            Ok(messages)
        } else {
            warn!(chars, limit, "generation prompt too large after truncation");
            Err(GenerationError::prompt_too_large(chars, limit))
        }
    }

    pub async fn generate(
        &self,
        question: &str,
        tables: &[TableDetail],
        history: &[ChatMessage],
        summary: &[TableSummary],
    ) -> Result<SqlCandidate, GenerationError> {
        let parts = PromptParts {
            schema: schema_block(summary),
            columns: column_block(tables),
            history: recent_history(history, self.settings.history_turns, self.settings.history_chars),
        };
        let messages = self.fit_prompt(question, parts)?;

        let reply = logging::timeit!("generated sql", {
            self.gateway
                .complete(&messages, self.settings.temperature, self.settings.timeout)
                .await?
        });

        let candidate = SqlCandidate::from_reply(&reply)
            .ok_or_else(|| GenerationError::empty("reply contained no statement"))?;
        info!(sql = %candidate, "generated statement");
        Ok(candidate)
    }
}
