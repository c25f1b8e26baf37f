use crate::error::PipelineError;
use crate::executor::QueryExecutor;
use crate::generator::{GeneratorSettings, SqlGenerator};
use crate::identifier::{IdentifierSettings, TableIdentifier};
use crate::refiner::ResultRefiner;
use catalog::SchemaCache;
use common::config::components::connections::DatabaseAdapterType;
use common::config::components::global::AskConfig;
use common::config::components::llm::LlmConfig;
use common::config::components::pipeline::PipelineConfig;
use common::types::{ChatMessage, QueryOutcome};
use serde::{Deserialize, Serialize};
use shared_clients::llm::CompletionGateway;
use shared_clients::QueryStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What the caller gets back for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub success: bool,
    pub answer: String,
    pub sql_query: Option<String>,
    pub query_result: Option<QueryOutcome>,
}

impl PipelineResponse {
    fn failure(err: &PipelineError) -> Self {
        Self {
            success: false,
            answer: err.answer(),
            sql_query: err.sql().map(str::to_string),
            query_result: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub timeout: Duration,
    pub identify_temperature: f32,
    pub generate_temperature: f32,
    pub refine_temperature: f32,
    pub identify_schema_chars: usize,
    pub generate_prompt_chars: usize,
    pub history_turns: usize,
    pub history_chars: usize,
    pub refine_rows: usize,
    pub fallback_rows: usize,
    pub repair_patterns: Vec<String>,
    pub hints: Vec<String>,
    pub term_mappings: BTreeMap<String, Vec<String>>,
}

impl PipelineSettings {
    pub fn from_config(llm: &LlmConfig, pipeline: &PipelineConfig, repair_patterns: Vec<String>) -> Self {
        Self {
            timeout: llm.timeout(),
            identify_temperature: llm.identify_temperature,
            generate_temperature: llm.generate_temperature,
            refine_temperature: llm.refine_temperature,
            identify_schema_chars: pipeline.identify_schema_chars,
            generate_prompt_chars: pipeline.generate_prompt_chars,
            history_turns: pipeline.history_turns,
            history_chars: pipeline.history_chars,
            refine_rows: pipeline.refine_rows,
            fallback_rows: pipeline.fallback_rows,
            repair_patterns,
            hints: pipeline.hints.clone(),
            term_mappings: pipeline.term_mappings.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            timeout: Duration::from_secs(300),
            identify_temperature: 0.1,
            generate_temperature: 0.1,
            refine_temperature: 0.3,
            identify_schema_chars: pipeline.identify_schema_chars,
            generate_prompt_chars: pipeline.generate_prompt_chars,
            history_turns: pipeline.history_turns,
            history_chars: pipeline.history_chars,
            refine_rows: pipeline.refine_rows,
            fallback_rows: pipeline.fallback_rows,
            repair_patterns: DatabaseAdapterType::Postgres.default_repair_patterns(),
            hints: pipeline.hints,
            term_mappings: pipeline.term_mappings,
        }
    }
}

/// Answers questions about one database. Cheap to share behind an `Arc`;
/// questions run independently and only read the schema cache.
pub struct Pipeline {
    cache: SchemaCache,
    database: String,
    identifier: TableIdentifier,
    generator: SqlGenerator,
    executor: QueryExecutor,
    refiner: ResultRefiner,
}

impl Pipeline {
    pub fn new(
        cache: SchemaCache,
        database: impl Into<String>,
        gateway: Arc<dyn CompletionGateway>,
        store: Arc<dyn QueryStore>,
        settings: PipelineSettings,
    ) -> Self {
        let identifier = TableIdentifier::new(
            Arc::clone(&gateway),
            IdentifierSettings {
                temperature: settings.identify_temperature,
                timeout: settings.timeout,
                schema_chars: settings.identify_schema_chars,
                history_turns: settings.history_turns,
                history_chars: settings.history_chars,
                hints: settings.hints,
                term_mappings: settings.term_mappings,
            },
        );
        let generator = SqlGenerator::new(
            Arc::clone(&gateway),
            GeneratorSettings {
                temperature: settings.generate_temperature,
                timeout: settings.timeout,
                prompt_chars: settings.generate_prompt_chars,
                history_turns: settings.history_turns,
                history_chars: settings.history_chars,
            },
        );
        let executor = QueryExecutor::new(
            store,
            Arc::clone(&gateway),
            settings.repair_patterns,
            settings.generate_temperature,
            settings.timeout,
        );
        let refiner = ResultRefiner::new(
            gateway,
            settings.refine_temperature,
            settings.timeout,
            settings.refine_rows,
            settings.fallback_rows,
        );
        Self {
            cache,
            database: database.into(),
            identifier,
            generator,
            executor,
            refiner,
        }
    }

    pub fn from_config(
        config: &AskConfig,
        gateway: Arc<dyn CompletionGateway>,
        store: Arc<dyn QueryStore>,
    ) -> Self {
        let project = &config.project;
        let settings =
            PipelineSettings::from_config(&project.llm, &project.pipeline, config.repair_patterns());
        Self::new(
            SchemaCache::new(config.schema_cache_dir()),
            project.schema.database.clone(),
            gateway,
            store,
            settings,
        )
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    /// Run one question end to end. Failures come back as an unsuccessful
    /// response with an explanation in `answer`.
    pub async fn process_question(&self, question: &str, history: &[ChatMessage]) -> PipelineResponse {
        info!(question, "processing question");
        match self.answer(question, history).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "question failed");
                PipelineResponse::failure(&e)
            }
        }
    }

    async fn answer(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<PipelineResponse, PipelineError> {
        let catalog = self.cache.catalog(&self.database)?;
        let summary = catalog.summary();

        let tables = logging::timeit!("identified tables", {
            self.identifier.identify(question, history, &summary).await
        });
        if tables.is_empty() {
            return Err(PipelineError::IdentificationEmpty {
                available: catalog.table_names(),
            });
        }

        let details = catalog.detail(&tables);
        let candidate = self
            .generator
            .generate(question, &details, history, &summary)
            .await?;

        let execution = self.executor.run(question, candidate, &details).await?;
        if execution.repaired {
            info!(sql = %execution.sql, "answered with repaired statement");
        }

        let answer = logging::timeit!("refined answer", {
            self.refiner
                .refine(question, execution.sql.as_str(), &execution.outcome)
                .await
        });

        Ok(PipelineResponse {
            success: true,
            answer,
            sql_query: Some(execution.sql.into_inner()),
            query_result: Some(execution.outcome),
        })
    }
}
