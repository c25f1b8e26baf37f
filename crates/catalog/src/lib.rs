pub mod error;
pub mod extract;
pub mod models;
pub mod summary;

pub use extract::extract_snapshot;
pub use models::*;
pub use summary::Catalog;

use crate::error::CatalogError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Snapshots keyed by database name, backed by one `<database>.json` file
/// per database under `dir`. Loaded lazily and shared read-only.
#[derive(Clone)]
pub struct SchemaCache {
    dir: PathBuf,
    inner: Arc<RwLock<HashMap<String, Arc<SchemaSnapshot>>>>,
}

impl SchemaCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, database: &str) -> Result<PathBuf, CatalogError> {
        if database.is_empty()
            || database.contains(['/', '\\'])
            || database == "."
            || database == ".."
        {
            return Err(CatalogError::invalid_name(format!(
                "'{database}' cannot be used as a snapshot file name"
            )));
        }
        Ok(self.dir.join(format!("{database}.json")))
    }

    /// Cached snapshot for `database`, reading it from disk on first use.
    /// A missing file is not an error.
    pub fn get(&self, database: &str) -> Result<Option<Arc<SchemaSnapshot>>, CatalogError> {
        if let Some(found) = self.inner.read().get(database) {
            return Ok(Some(Arc::clone(found)));
        }

        let path = self.snapshot_path(database)?;
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no schema snapshot on disk");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: SchemaSnapshot = serde_json::from_str(&json)?;
        tracing::info!(
            database,
            tables = snapshot.tables.len(),
            "loaded schema snapshot"
        );

        let snapshot = Arc::new(snapshot);
        self.inner
            .write()
            .insert(database.to_string(), Arc::clone(&snapshot));
        Ok(Some(snapshot))
    }

    /// Replace the in-memory snapshot without touching disk.
    pub fn insert(&self, snapshot: SchemaSnapshot) -> Arc<SchemaSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.inner
            .write()
            .insert(snapshot.database.clone(), Arc::clone(&snapshot));
        snapshot
    }

    /// Drop the in-memory copy so the next `get` rereads the file.
    pub fn refresh(&self, database: &str) {
        self.inner.write().remove(database);
    }

    /// Write the snapshot to `<dir>/<database>.json` via a temp file and
    /// rename, then cache it.
    pub fn persist(&self, snapshot: SchemaSnapshot) -> Result<Arc<SchemaSnapshot>, CatalogError> {
        let path = self.snapshot_path(&snapshot.database)?;
        std::fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        tracing::info!(path = %path.display(), "persisted schema snapshot");

        Ok(self.insert(snapshot))
    }

    /// Catalog view for `database`; empty when no snapshot exists.
    pub fn catalog(&self, database: &str) -> Result<Catalog, CatalogError> {
        Ok(self
            .get(database)?
            .map(Catalog::new)
            .unwrap_or_else(Catalog::empty))
    }
}
