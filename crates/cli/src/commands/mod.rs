pub mod ask;
pub mod init;
pub mod schema;

use common::config::components::global::AskConfig;
use common::config::loader::read_config;
use common::error::AskError;
use shared_clients::{create_store, DynStore};
use std::path::PathBuf;
use tokio::runtime::Runtime;

pub(crate) fn load_config(config_path: Option<PathBuf>) -> Result<AskConfig, AskError> {
    read_config(config_path).map_err(|e| AskError::Config(e.into()))
}

pub(crate) fn runtime() -> Result<Runtime, AskError> {
    Runtime::new().map_err(|e| AskError::Run(e.into()))
}

pub(crate) async fn connect(cfg: &AskConfig) -> Result<DynStore, AskError> {
    let details = cfg.get_adapter_connection_details().ok_or_else(|| {
        AskError::Config(
            format!(
                "connection '{}' missing from profile '{}'",
                cfg.project.connection_profile.target, cfg.project.connection_profile.profile
            )
            .into(),
        )
    })?;
    create_store(details)
        .await
        .map_err(|e| AskError::Run(e.into()))
}
