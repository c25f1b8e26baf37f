use super::{connect, load_config, runtime};
use clap::Args;
use common::error::AskError;
use common::types::ChatMessage;
use engine::Pipeline;
use shared_clients::llm::LlmClient;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Args)]
pub struct AskArgs {
    /// The question, in plain language
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,
    /// JSON file holding earlier turns as `[{"role": "user", "content": "..."}]`
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,
}

fn load_history(path: &Path) -> Result<Vec<ChatMessage>, AskError> {
    let json = fs::read_to_string(path).map_err(|e| AskError::Config(e.into()))?;
    serde_json::from_str(&json).map_err(|e| AskError::Config(e.into()))
}

pub fn handle_ask(args: &AskArgs, config_path: Option<PathBuf>) -> Result<(), AskError> {
    let cfg = load_config(config_path)?;
    let history = match &args.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    let question = args.question.join(" ");

    let response = runtime()?.block_on(async {
        let store = connect(&cfg).await?;
        let client = LlmClient::from_config(&cfg.project.llm, cfg.api_key.clone());
        info!(endpoint = client.endpoint(), "using completion service");
        let pipeline = Pipeline::from_config(&cfg, Arc::new(client), store);
        Ok::<_, AskError>(pipeline.process_question(&question, &history).await)
    })?;

    let out = serde_json::to_string_pretty(&response).map_err(|e| AskError::Run(e.into()))?;
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::Role;

    #[test]
    fn reads_history_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(
            &path,
            r#"[{"role": "user", "content": "show orders"}, {"role": "assistant", "content": "ok"}]"#,
        )
        .unwrap();
        let history = load_history(&path).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[test]
    fn malformed_history_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_history(&path), Err(AskError::Config(_))));
    }
}
