use super::{connect, load_config, runtime};
use catalog::extract::refresh_snapshot;
use catalog::SchemaCache;
use clap::Subcommand;
use common::error::AskError;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Subcommand)]
pub enum SchemaSubcommand {
    /// Read the live schema and rewrite the cached snapshot
    Extract,
    /// Print the table summary the identifier sees
    Summary,
}

pub fn handle_schema(cmd: &SchemaSubcommand, config_path: Option<PathBuf>) -> Result<(), AskError> {
    let cfg = load_config(config_path)?;
    let cache = SchemaCache::new(cfg.schema_cache_dir());
    let database = cfg.project.schema.database.as_str();

    match cmd {
        SchemaSubcommand::Extract => {
            let snapshot = runtime()?.block_on(async {
                let store = connect(&cfg).await?;
                refresh_snapshot(
                    store.as_ref(),
                    &cache,
                    database,
                    &cfg.project.schema.schema_name,
                )
                .await
                .map_err(|e| AskError::Schema(e.into()))
            })?;
            info!(
                database,
                tables = snapshot.tables.len(),
                dir = %cache.dir().display(),
                "schema snapshot written"
            );
        }
        SchemaSubcommand::Summary => {
            let catalog = cache
                .catalog(database)
                .map_err(|e| AskError::Schema(e.into()))?;
            if !catalog.is_loaded() {
                return Err(AskError::Schema(
                    format!(
                        "no snapshot for '{database}' in {}; run `askdb schema extract` first",
                        cache.dir().display()
                    )
                    .into(),
                ));
            }
            let out = serde_json::to_string_pretty(&catalog.summary())
                .map_err(|e| AskError::Run(e.into()))?;
            println!("{out}");
        }
    }
    Ok(())
}
