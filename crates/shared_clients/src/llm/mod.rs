//! Client for the hosted chat-completion service shared by every reasoning
//! stage of the pipeline.

mod client;
mod error;
pub mod parse;
mod resolve;

pub use client::LlmClient;
pub use error::{LlmError, Phase};
pub use parse::{parse_llm_json, strip_code_fences, LlmJson};

use async_trait::async_trait;
use common::types::ChatMessage;
use std::time::Duration;

/// One completion round trip. Implementations never retry; callers decide.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, LlmError>;
}
