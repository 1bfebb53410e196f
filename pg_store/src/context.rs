//! PostgreSQL connection/context management
//!
//! One `PgContext` per deployment: it owns the pool, carries the naming
//! policy and retry settings, hands out repositories and bootstraps the
//! per-entity schema.

use std::str::FromStr;
use std::time::Duration;

use config::PostgresConfig;
use repo_core::{Entity, NamingPolicy, StoreError, ValidatedTableName};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::repository::PgRepository;
use crate::transaction::PgTransaction;

/// Connection manager for the PostgreSQL provider.
#[derive(Clone)]
pub struct PgContext {
    pool: PgPool,
    naming: NamingPolicy,
    schema: Option<String>,
    enforce_soft_delete: bool,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl PgContext {
    /// Connect a pool per the provider configuration. The command timeout is
    /// installed as the session `statement_timeout` so every command the
    /// repositories issue is bounded.
    pub async fn connect(
        config: &PostgresConfig,
        naming: NamingPolicy,
    ) -> Result<Self, StoreError> {
        let options = PgConnectOptions::from_str(&config.connection_string())
            .map_err(|e| StoreError::store("connect", "postgres", e))?
            .options([(
                "statement_timeout",
                (config.command_timeout_seconds * 1000).to_string(),
            )]);

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::store("connect", "postgres", e))?;

        Ok(Self {
            pool,
            naming,
            schema: config.schema.clone(),
            enforce_soft_delete: config.enforce_soft_delete,
            retry_attempts: config.retry_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Derive and validate the qualified table name for an entity type.
    pub fn table_name<T: Entity>(&self) -> Result<String, StoreError> {
        let base = ValidatedTableName::new(&self.naming.collection_name(T::type_name()))?;
        match &self.schema {
            Some(schema) => {
                let schema = ValidatedTableName::new(schema)?;
                Ok(format!("{schema}.{base}"))
            }
            None => Ok(base.into_string()),
        }
    }

    /// Build a repository for an entity type. Capability flags are read once
    /// here and cached on the repository.
    pub fn repository<T: Entity>(&self) -> Result<PgRepository<T>, StoreError> {
        Ok(PgRepository::new(
            self.pool.clone(),
            self.table_name::<T>()?,
            T::soft_delete_capable() && self.enforce_soft_delete,
            self.retry_attempts,
            self.retry_backoff,
        ))
    }

    /// Create the entity's table (and schema) if missing: JSONB document
    /// column, mirrored audit and soft-delete columns, and a partial index
    /// over live rows for soft-delete-capable types.
    pub async fn ensure_table<T: Entity>(&self) -> Result<(), StoreError> {
        if let Some(schema) = &self.schema {
            let schema = ValidatedTableName::new(schema)?;
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::store("ensure_table", T::type_name(), e))?;
        }

        let table = self.table_name::<T>()?;
        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                doc JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                created_by TEXT,
                modified_at TIMESTAMPTZ,
                modified_by TEXT,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                deleted_at TIMESTAMPTZ,
                deleted_by TEXT
            )"
        );
        sqlx::query(&create_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::store("ensure_table", T::type_name(), e))?;

        if T::soft_delete_capable() {
            let index_name = format!("{}_live_idx", table.replace('.', "_"));
            let index_sql = format!(
                "CREATE INDEX IF NOT EXISTS {index_name} ON {table} (id) WHERE NOT deleted"
            );
            sqlx::query(&index_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::store("ensure_table", T::type_name(), e))?;
        }

        tracing::debug!(table = %table, entity = T::type_name(), "table bootstrap complete");
        Ok(())
    }

    /// Begin a transaction spanning multiple repository operations.
    pub async fn begin(&self) -> Result<PgTransaction<'_>, StoreError> {
        PgTransaction::begin(&self.pool).await
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::store("health_check", "postgres", e))?;
        Ok(())
    }
}
