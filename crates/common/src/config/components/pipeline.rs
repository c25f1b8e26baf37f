use serde::Deserialize;
use std::collections::BTreeMap;

/// Knobs for the question pipeline. Every field has a default so the whole
/// `pipeline:` block may be omitted from the project file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Character budget for the schema summary embedded in the
    /// identification prompt.
    pub identify_schema_chars: usize,
    /// Hard ceiling on the whole SQL generation prompt.
    pub generate_prompt_chars: usize,
    /// Prior history turns carried into generation.
    pub history_turns: usize,
    /// Per-message budget for carried history.
    pub history_chars: usize,
    /// Rows sent to the refiner.
    pub refine_rows: usize,
    /// Rows listed by the deterministic fallback answer.
    pub fallback_rows: usize,
    /// Overrides the adapter's default repair trigger patterns.
    pub repair_patterns: Option<Vec<String>>,
    /// Extra free-text hints for table identification.
    pub hints: Vec<String>,
    /// Business term -> tables that usually answer it.
    pub term_mappings: BTreeMap<String, Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            identify_schema_chars: 30_000,
            generate_prompt_chars: 60_000,
            history_turns: 2,
            history_chars: 500,
            refine_rows: 100,
            fallback_rows: 10,
            repair_patterns: None,
            hints: Vec::new(),
            term_mappings: BTreeMap::new(),
        }
    }
}
