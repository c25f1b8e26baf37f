use super::error::{LlmError, Phase};
use super::parse::parse_completion;
use super::resolve::{run_watchdog, AbortOnDrop, PhaseTimer, Resolver};
use super::CompletionGateway;
use async_trait::async_trait;
use common::config::components::llm::{ApiFlavor, LlmConfig};
use common::types::ChatMessage;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// HTTP client for the completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    endpoint: String,
    model: String,
    flavor: ApiFlavor,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: &str, model: &str, flavor: ApiFlavor, api_key: Option<String>) -> Self {
        let base = base_url.trim_end_matches('/');
        let endpoint = match flavor {
            ApiFlavor::OpenAi => format!("{base}/chat/completions"),
            ApiFlavor::Ollama => format!("{base}/api/chat"),
        };
        Self {
            client: Client::new(),
            endpoint,
            model: model.to_string(),
            flavor,
            api_key,
        }
    }

    pub fn from_config(cfg: &LlmConfig, api_key: Option<String>) -> Self {
        Self::new(&cfg.base_url, &cfg.model, cfg.flavor, api_key)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, messages: &[ChatMessage], temperature: f32) -> reqwest::RequestBuilder {
        let builder = self.client.post(&self.endpoint);
        let builder = match self.flavor {
            ApiFlavor::OpenAi => builder.json(&OpenAiRequest {
                model: &self.model,
                messages,
                temperature,
            }),
            ApiFlavor::Ollama => builder.json(&OllamaRequest {
                model: &self.model,
                messages,
                stream: false,
                options: OllamaOptions { temperature },
            }),
        };
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl CompletionGateway for LlmClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("llm_request", %request_id, model = %self.model);
        let request = self.build_request(messages, temperature);
        let started = Instant::now();

        let (resolver, rx) = Resolver::<Result<String, LlmError>>::new();
        let timer = PhaseTimer::start(timeout);

        let reader = {
            let resolver = resolver.clone();
            let timer = timer.clone();
            tokio::spawn(
                async move {
                    let outcome = async {
                        let response = request.send().await?;
                        timer.rearm(Phase::Body);
                        debug!(status = %response.status(), "llm headers received");
                        let status = response.status();
                        let body = response.bytes().await?;
                        parse_completion(status, &body)
                    }
                    .await;
                    resolver.resolve(outcome);
                }
                .instrument(span.clone()),
            )
        };
        let watchdog = tokio::spawn(run_watchdog(timer, resolver.clone()));
        let _guard = AbortOnDrop(vec![reader.abort_handle(), watchdog.abort_handle()]);

        let outcome = rx
            .await
            .unwrap_or_else(|_| Err(LlmError::transport("request task ended without a result")));

        // dropping the guard aborts the reader too, which releases the
        // connection when the watchdog won
        let _enter = span.enter();
        match &outcome {
            Ok(text) => info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                chars = text.len(),
                "llm completion received"
            ),
            Err(e) => warn!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "llm completion failed: {e}"
            ),
        }
        outcome
    }
}
