//! File-store management

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use config::FileConfig;
use repo_core::{Entity, NamingPolicy, StoreError, ValidatedTableName};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::repository::FileRepository;

/// Directory-level manager for the embedded provider; hands out one
/// repository per collection file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    naming: NamingPolicy,
    enforce_soft_delete: bool,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, naming: NamingPolicy, enforce_soft_delete: bool) -> Self {
        Self {
            dir: dir.into(),
            naming,
            enforce_soft_delete,
        }
    }

    pub fn from_config(config: &FileConfig, naming: NamingPolicy) -> Self {
        Self::new(&config.directory, naming, config.enforce_soft_delete)
    }

    pub fn directory(&self) -> &PathBuf {
        &self.dir
    }

    /// Open (or create) the collection file for an entity type and load it.
    ///
    /// The serialization guard lives on the returned repository: opening the
    /// same collection twice yields two independent guards, so keep one
    /// repository instance per collection handle.
    pub async fn repository<T: Entity>(&self) -> Result<FileRepository<T>, StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::store("open", T::type_name(), e))?;
        let name = ValidatedTableName::new(&self.naming.collection_name(T::type_name()))?;
        let path = self.dir.join(format!("{name}.json"));

        let state: BTreeMap<Uuid, Value> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::serialization(T::type_name(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::store("open", T::type_name(), e)),
        };
        tracing::debug!(
            entity = T::type_name(),
            path = %path.display(),
            records = state.len(),
            "collection loaded"
        );

        Ok(FileRepository::new(
            path,
            Arc::new(Mutex::new(state)),
            T::soft_delete_capable() && self.enforce_soft_delete,
        ))
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::store("health_check", "file", e))?;
        Ok(())
    }
}
