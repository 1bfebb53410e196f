//! Convenience re-exports for common Polystore usage
//!
//! # Example
//!
//! ```rust
//! use polystore::prelude::*;
//! ```

// Core Polystore components
pub use crate::core::PolyStore;
pub use crate::errors::PolyStoreError;
pub use crate::migration;

// Re-export centralized config
pub use config::{
    FileConfig, MongoConfig, NamingConfig, PostgresConfig, ProviderKind, StoreConfig,
};

// Re-export the shared contracts
pub use repo_core::prelude::*;

// Provider entry points
pub use file_store::{FileRepository, FileStore};
pub use mongo_store::{MongoContext, MongoRepository};
pub use pg_store::{PgContext, PgRepository, PgTransaction};

// Common external dependencies
pub use anyhow;
pub use async_trait;
pub use sqlx;
pub use tokio;
