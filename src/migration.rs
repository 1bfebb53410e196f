//! Schema bootstrap utilities
//!
//! Per-entity storage preparation for the providers that need it: table
//! creation for PostgreSQL, standing-filter indexes for MongoDB. The
//! embedded file store needs no preparation beyond its directory, which is
//! created lazily on first open.

use repo_core::Entity;

use crate::core::PolyStore;
use crate::errors::PolyStoreError;

impl PolyStore {
    /// Create the entity's table and indexes on the PostgreSQL provider.
    pub async fn prepare_postgres<T>(&self) -> Result<(), PolyStoreError>
    where
        T: Entity,
    {
        self.postgres()?.ensure_table::<T>().await?;
        Ok(())
    }

    /// Create the entity's indexes on the MongoDB provider.
    pub async fn prepare_mongo<T>(&self) -> Result<(), PolyStoreError>
    where
        T: Entity,
    {
        self.mongo()?.ensure_indexes::<T>().await?;
        Ok(())
    }
}
