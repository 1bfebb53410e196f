//! Transaction support for the PostgreSQL provider
//!
//! A thin wrapper over the sqlx transaction: a batch of staged repository
//! operations commits or fails as a unit. Dropping the wrapper without
//! committing rolls back.
//!
//! # Example
//! ```ignore
//! let mut tx = context.begin().await?;
//! articles.create_tx(article, &mut tx, &cancel).await?;
//! comments.create_tx(comment, &mut tx, &cancel).await?;
//! tx.commit().await?;
//! ```

use repo_core::StoreError;
use sqlx::{PgPool, Postgres, Transaction};

pub struct PgTransaction<'a> {
    tx: Transaction<'a, Postgres>,
}

impl<'a> PgTransaction<'a> {
    pub(crate) async fn begin(pool: &'a PgPool) -> Result<Self, StoreError> {
        let tx = pool
            .begin()
            .await
            .map_err(|e| StoreError::store("begin_transaction", "postgres", e))?;
        Ok(Self { tx })
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::store("commit_transaction", "postgres", e))
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StoreError::store("rollback_transaction", "postgres", e))
    }

    /// Access the underlying transaction for executing queries.
    pub fn as_mut(&mut self) -> &mut Transaction<'a, Postgres> {
        &mut self.tx
    }
}
