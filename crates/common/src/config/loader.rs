use crate::config::components::connections::{
    AdapterConnectionDetails, ConnectionsConfig, DatabaseAdapterType,
};
use crate::config::components::global::AskConfig;
use crate::config::components::project::ProjectConfig;
use crate::config::error::ConfigError;
use crate::utils::resolve_path;
use serde::de::Error;
use serde::Deserialize;
use serde_yaml::{self, Error as YamlError, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PROJECT_FILE: &str = "askdb-project.yml";

/// Load `askdb-project.yml` (from `project_dir`, else the working directory)
/// and the connections file it points at. The API key is read from the
/// process environment.
pub fn read_config(project_dir: Option<PathBuf>) -> Result<AskConfig, ConfigError> {
    read_config_with_env(project_dir, |var| std::env::var(var).ok())
}

/// Same as [`read_config`] with an injectable environment lookup.
pub fn read_config_with_env<F>(
    project_dir: Option<PathBuf>,
    env_lookup: F,
) -> Result<AskConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let project_file_path = match project_dir {
        Some(dir) => dir.join(PROJECT_FILE),
        None => PathBuf::from(PROJECT_FILE),
    };
    if !project_file_path.exists() {
        return Err(ConfigError::incorrect_path(&project_file_path));
    }
    debug!("loading project config from {}", project_file_path.display());

    let project_file = fs::File::open(&project_file_path)?;
    let project: ProjectConfig = serde_yaml::from_reader(project_file)?;

    let root = project_file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let connections_path = resolve_path(&root, &project.connection_profile.path);
    if !connections_path.exists() {
        return Err(ConfigError::missing_connection(format!(
            "Connection profile not found at '{}'. Ensure the file exists and is readable.",
            connections_path.display()
        )));
    }
    let conn_file = fs::File::open(&connections_path)?;
    let raw_connections: HashMap<String, Value> = serde_yaml::from_reader(conn_file)?;
    let mut connections: ConnectionsConfig = HashMap::new();
    for (profile, value) in raw_connections.into_iter() {
        let profile_connections = parse_connection_profile(value)
            .map_err(|err| ConfigError::parse_error(format!("profile {}: {}", profile, err)))?;
        connections.insert(profile, profile_connections);
    }

    let selected = &project.connection_profile;
    let has_target = connections
        .get(&selected.profile)
        .map(|conns| conns.contains_key(&selected.target))
        .unwrap_or(false);
    if !has_target {
        return Err(ConfigError::missing_connection(format!(
            "Connection '{}' not defined in profile '{}'",
            selected.target, selected.profile
        )));
    }

    let api_key = match &project.llm.api_key_env {
        Some(var) => Some(
            env_lookup(var)
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| ConfigError::missing_credential(var))?,
        ),
        None => None,
    };

    Ok(AskConfig::new(project, connections, root, api_key))
}

fn parse_connection_profile(
    value: Value,
) -> Result<HashMap<String, AdapterConnectionDetails>, YamlError> {
    // A profile is either one connection (stored as `default`) or a map of
    // named connections.
    if let Ok(single) = serde_yaml::from_value::<RawConnectionDetails>(value.clone()) {
        let mut map = HashMap::new();
        map.insert("default".to_string(), single.into_adapter_details()?);
        return Ok(map);
    }

    let nested: HashMap<String, RawConnectionDetails> = serde_yaml::from_value(value)?;
    let mut profile = HashMap::new();
    for (name, raw) in nested.into_iter() {
        profile.insert(name, raw.into_adapter_details()?);
    }
    Ok(profile)
}

#[derive(Debug, Deserialize)]
struct RawConnectionDetails {
    #[serde(default)]
    adapter: Option<DatabaseAdapterType>,
    #[serde(default)]
    adapter_type: Option<DatabaseAdapterType>,
    host: String,
    user: String,
    database: String,
    password: String,
    #[serde(deserialize_with = "deserialize_port_to_string")]
    port: String,
    #[serde(default)]
    statement_timeout_secs: Option<u64>,
}

impl RawConnectionDetails {
    fn into_adapter_details(self) -> Result<AdapterConnectionDetails, YamlError> {
        let adapter_type = self
            .adapter_type
            .or(self.adapter)
            .ok_or_else(|| YamlError::custom("missing `adapter` or `adapter_type`"))?;

        Ok(AdapterConnectionDetails::new(
            self.host.as_str(),
            self.user.as_str(),
            self.database.as_str(),
            self.password.as_str(),
            self.port.as_str(),
            adapter_type,
        )
        .with_statement_timeout(self.statement_timeout_secs))
    }
}

fn deserialize_port_to_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct PortVisitor;

    impl<'de> serde::de::Visitor<'de> for PortVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer port value")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value < 0 {
                return Err(E::custom("port cannot be negative"));
            }
            Ok(value.to_string())
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_owned())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }
    }

    deserializer.deserialize_any(PortVisitor)
}
