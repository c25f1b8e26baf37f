use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

///  ---------------- Connections Config ----------------
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseAdapterType {
    Postgres,
}

impl DatabaseAdapterType {
    /// Error-text fragments that mark an unknown column or identifier for
    /// this store. Matching is case-insensitive substring matching.
    pub fn default_repair_patterns(&self) -> Vec<String> {
        match self {
            Self::Postgres => vec![
                "does not exist".to_string(),
                "undefined column".to_string(),
                "unknown column".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AdapterConnectionDetails {
    pub host: String,
    pub user: String,
    pub database: String,
    pub password: String,
    pub port: String,
    pub adapter_type: DatabaseAdapterType,
    pub statement_timeout_secs: Option<u64>,
}

impl AdapterConnectionDetails {
    pub fn new(
        host: &str,
        user: &str,
        database: &str,
        password: &str,
        port: &str,
        adapter_type: DatabaseAdapterType,
    ) -> Self {
        Self {
            host: host.to_string(),
            user: user.to_string(),
            database: database.to_string(),
            password: password.to_string(),
            port: port.to_string(),
            adapter_type,
            statement_timeout_secs: None,
        }
    }

    pub fn with_statement_timeout(mut self, secs: Option<u64>) -> Self {
        self.statement_timeout_secs = secs;
        self
    }
}

/// Profile name (e.g. `dev`) to named connections (e.g. `warehouse`).
pub type ConnectionsConfig = HashMap<String, HashMap<String, AdapterConnectionDetails>>;

/// Where the connections file lives and which entry the pipeline queries.
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionProfile {
    pub path: PathBuf,
    pub profile: String,
    pub target: String,
}
