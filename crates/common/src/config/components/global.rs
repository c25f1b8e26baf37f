use crate::config::components::connections::{AdapterConnectionDetails, ConnectionsConfig};
use crate::config::components::project::ProjectConfig;
use std::path::PathBuf;

// ---------------- resolved config ----------------
#[derive(Debug)]
pub struct AskConfig {
    pub project: ProjectConfig,
    pub connections: ConnectionsConfig,
    /// Directory containing the project file; relative paths hang off it.
    pub root: PathBuf,
    pub api_key: Option<String>,
}

impl AskConfig {
    pub fn new(
        project: ProjectConfig,
        connections: ConnectionsConfig,
        root: PathBuf,
        api_key: Option<String>,
    ) -> Self {
        Self {
            project,
            connections,
            root,
            api_key,
        }
    }

    pub fn get_adapter_connection_details(&self) -> Option<AdapterConnectionDetails> {
        let profile = &self.project.connection_profile;
        self.connections
            .get(&profile.profile)
            .and_then(|conns| conns.get(&profile.target))
            .cloned()
    }

    pub fn schema_cache_dir(&self) -> PathBuf {
        crate::utils::resolve_path(&self.root, &self.project.schema.cache_dir)
    }

    /// Repair trigger patterns: the explicit override, else the adapter's
    /// defaults.
    pub fn repair_patterns(&self) -> Vec<String> {
        if let Some(patterns) = &self.project.pipeline.repair_patterns {
            return patterns.clone();
        }
        self.get_adapter_connection_details()
            .map(|c| c.adapter_type.default_repair_patterns())
            .unwrap_or_default()
    }
}
