use crate::config::components::connections::ConnectionProfile;
use crate::config::components::llm::LlmConfig;
use crate::config::components::pipeline::PipelineConfig;
use serde::Deserialize;
use std::path::PathBuf;

// ---------------- askdb-project.yml ----------------
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub llm: LlmConfig,
    pub schema: SchemaConfig,
    pub connection_profile: ConnectionProfile,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchemaConfig {
    /// Directory holding `<database>.json` snapshots.
    pub cache_dir: PathBuf,
    /// Database identifier; also the snapshot file stem.
    pub database: String,
    /// Postgres schema to extract from.
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
}

fn default_schema_name() -> String {
    "public".to_string()
}
