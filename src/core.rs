//! Core Polystore functionality
//!
//! This module contains the main PolyStore struct: it owns the configured
//! provider context for its lifetime and keeps the repository registry,
//! exactly one implementation per (entity type, deployment) pair.

use std::collections::HashMap;

use config::{ProviderKind, StoreConfig};
use file_store::FileStore;
use mongo_store::MongoContext;
use pg_store::PgContext;

use crate::errors::PolyStoreError;

/// Coordinator owning the storage backend and the registered repositories.
pub struct PolyStore {
    postgres: Option<PgContext>,
    mongo: Option<MongoContext>,
    files: Option<FileStore>,
    repos: HashMap<String, Box<dyn std::any::Any + Send + Sync>>,
}

impl PolyStore {
    /// Validate the configuration and connect the selected provider. The
    /// connection/session is owned by this store and released when it drops.
    pub async fn connect(config: &StoreConfig) -> Result<Self, PolyStoreError> {
        config.validate()?;
        let naming = config.naming.to_policy();

        let mut store = Self {
            postgres: None,
            mongo: None,
            files: None,
            repos: HashMap::new(),
        };
        match config.provider {
            ProviderKind::Postgres => {
                let pg = config
                    .postgres
                    .as_ref()
                    .ok_or(PolyStoreError::ProviderNotConfigured("postgres"))?;
                store.postgres = Some(PgContext::connect(pg, naming).await?);
            }
            ProviderKind::MongoDb => {
                let mongo = config
                    .mongo
                    .as_ref()
                    .ok_or(PolyStoreError::ProviderNotConfigured("mongodb"))?;
                store.mongo = Some(MongoContext::connect(mongo, naming).await?);
            }
            ProviderKind::File => {
                let file = config
                    .file
                    .as_ref()
                    .ok_or(PolyStoreError::ProviderNotConfigured("file"))?;
                store.files = Some(FileStore::from_config(file, naming));
            }
        }
        Ok(store)
    }

    pub fn postgres(&self) -> Result<&PgContext, PolyStoreError> {
        self.postgres
            .as_ref()
            .ok_or(PolyStoreError::ProviderNotConfigured("postgres"))
    }

    pub fn mongo(&self) -> Result<&MongoContext, PolyStoreError> {
        self.mongo
            .as_ref()
            .ok_or(PolyStoreError::ProviderNotConfigured("mongodb"))
    }

    pub fn files(&self) -> Result<&FileStore, PolyStoreError> {
        self.files
            .as_ref()
            .ok_or(PolyStoreError::ProviderNotConfigured("file"))
    }

    /// Register a repository under a name, usually the entity type name.
    pub fn register_repository<R>(&mut self, name: String, repo: R) -> Result<(), PolyStoreError>
    where
        R: Send + Sync + 'static,
    {
        if self.repos.contains_key(&name) {
            return Err(PolyStoreError::RepositoryAlreadyRegistered(name));
        }
        self.repos.insert(name, Box::new(repo));
        Ok(())
    }

    /// Get a registered repository by name.
    pub fn repository<R>(&self, name: &str) -> Result<&R, PolyStoreError>
    where
        R: Send + Sync + 'static,
    {
        self.repos
            .get(name)
            .and_then(|repo| repo.downcast_ref::<R>())
            .ok_or_else(|| PolyStoreError::RepositoryNotFound(name.to_string()))
    }

    /// List all registered repository names
    pub fn repository_names(&self) -> Vec<&String> {
        self.repos.keys().collect()
    }

    /// Remove a repository by name
    pub fn unregister_repository(&mut self, name: &str) -> Result<(), PolyStoreError> {
        self.repos
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PolyStoreError::RepositoryNotFound(name.to_string()))
    }

    /// Check the configured provider's connection health
    pub async fn health_check(&self) -> Result<(), PolyStoreError> {
        if let Some(pg) = &self.postgres {
            pg.health_check().await?;
        }
        if let Some(mongo) = &self.mongo {
            mongo.health_check().await?;
        }
        if let Some(files) = &self.files {
            files.health_check().await?;
        }
        Ok(())
    }
}
