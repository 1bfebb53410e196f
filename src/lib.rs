//! # Polystore
//!
//! A provider-polymorphic repository layer: one entity contract implemented
//! over PostgreSQL, MongoDB and an embedded JSON-file document store, with
//! consistent soft deletion, audit stamping, naming, paging, sorting and
//! typed filter translation across all of them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use polystore::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Article {
//!     pub id: Uuid,
//!     pub title: String,
//!     pub views: i64,
//! }
//!
//! impl Entity for Article {
//!     fn id(&self) -> Uuid {
//!         self.id
//!     }
//!     fn set_id(&mut self, id: Uuid) {
//!         self.id = id;
//!     }
//!     fn type_name() -> &'static str {
//!         "Article"
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::load()?;
//!     let mut store = PolyStore::connect(&config).await?;
//!     store.prepare_postgres::<Article>().await?;
//!
//!     let articles = store.postgres()?.repository::<Article>()?;
//!     store.register_repository("articles".to_string(), articles)?;
//!
//!     let articles = store.repository::<PgRepository<Article>>("articles")?;
//!     let cancel = CancellationToken::new();
//!     let created = articles
//!         .create(
//!             Article {
//!                 id: Uuid::nil(),
//!                 title: "Hello".to_string(),
//!                 views: 0,
//!             },
//!             &cancel,
//!         )
//!         .await?;
//!     println!("created article {}", created.id);
//!
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod errors;
pub mod migration;
pub mod prelude;

// Re-export the main public types for convenience
pub use core::PolyStore;
pub use errors::PolyStoreError;

// Re-export centralized config
pub use config::{
    FileConfig, MongoConfig, NamingConfig, PostgresConfig, ProviderKind, StoreConfig,
};

// Re-export the shared contracts and the provider crates
pub use file_store;
pub use mongo_store;
pub use pg_store;
pub use repo_core;

// Re-export external dependencies used in public API
pub use async_trait;
pub use sqlx;
