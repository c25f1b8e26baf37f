use serde::Deserialize;
use std::time::Duration;

/// Request/response shape spoken by the completion endpoint.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    /// `POST {base_url}/chat/completions`, answer in `choices[0].message.content`.
    #[default]
    OpenAi,
    /// `POST {base_url}/api/chat`, answer in `message.content`.
    Ollama,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub flavor: ApiFlavor,
    /// Environment variable holding the bearer token. `None` sends no
    /// `Authorization` header (local servers).
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_identify_temperature")]
    pub identify_temperature: f32,
    #[serde(default = "default_generate_temperature")]
    pub generate_temperature: f32,
    #[serde(default = "default_refine_temperature")]
    pub refine_temperature: f32,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_identify_temperature() -> f32 {
    0.1
}

fn default_generate_temperature() -> f32 {
    0.1
}

fn default_refine_temperature() -> f32 {
    0.3
}
