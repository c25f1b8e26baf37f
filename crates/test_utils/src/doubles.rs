//! Scripted stand-ins for the completion service and the store. Each call
//! pops the next queued reply and records what it was asked.

use async_trait::async_trait;
use common::config::components::connections::DatabaseAdapterType;
use common::types::{ChatMessage, QueryOutcome, SqlParam};
use parking_lot::Mutex;
use shared_clients::llm::{CompletionGateway, LlmError, Phase};
use shared_clients::{QueryStore, StoreError};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayCall {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GatewayCall {
    /// All message contents joined, for prompt assertions.
    pub fn prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, content: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(content.into()));
        self
    }

    pub fn fail(self, err: LlmError) -> Self {
        self.replies.lock().push_back(Err(err));
        self
    }

    pub fn time_out(self) -> Self {
        self.fail(LlmError::timeout(Phase::FirstByte, Duration::from_secs(300)))
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        self.calls.lock().push(GatewayCall {
            messages: messages.to_vec(),
            temperature,
            timeout,
        });
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::transport("no scripted reply left")))
    }
}

pub enum StoreReply {
    Rows(QueryOutcome),
    Error(String),
}

#[derive(Default)]
pub struct ScriptedStore {
    replies: Mutex<VecDeque<StoreReply>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(self, outcome: QueryOutcome) -> Self {
        self.replies.lock().push_back(StoreReply::Rows(outcome));
        self
    }

    pub fn error(self, message: impl Into<String>) -> Self {
        self.replies.lock().push_back(StoreReply::Error(message.into()));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl QueryStore for ScriptedStore {
    async fn execute(&self, sql: &str, _params: &[SqlParam]) -> Result<QueryOutcome, StoreError> {
        self.executed.lock().push(sql.to_string());
        match self.replies.lock().pop_front() {
            Some(StoreReply::Rows(outcome)) => Ok(outcome),
            Some(StoreReply::Error(message)) => Err(StoreError::query(message)),
            None => Err(StoreError::query("no scripted result left")),
        }
    }

    fn adapter_type(&self) -> DatabaseAdapterType {
        DatabaseAdapterType::Postgres
    }
}
