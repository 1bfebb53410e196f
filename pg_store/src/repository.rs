//! Generic PostgreSQL repository
//!
//! One repository instance per entity type. Capability flags are read once
//! at construction; statements are precomputed against the derived table
//! name. Single commands retry on transient failures with bounded attempts
//! and backoff; multi-statement batches run inside one transaction and are
//! never retried mid-commit.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use repo_core::errors::ensure_live;
use repo_core::{
    Capabilities, CancellationToken, DeletionStamp, Entity, EntityRepository,
    ExtendedEntityRepository, Filter, Page, QueryParams, StoreError, ValidatedFieldName,
};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::sql::{render_filter, render_order_by, SqlParam};
use crate::transaction::PgTransaction;

const STREAM_CHUNK: i64 = 256;

pub struct PgRepository<T: Entity> {
    pool: PgPool,
    table: String,
    soft_delete: bool,
    retry_attempts: u32,
    retry_backoff: Duration,
    sql_insert: String,
    sql_update: String,
    sql_get: String,
    sql_get_any: String,
    sql_get_all: String,
    sql_get_by_ids: String,
    sql_delete: String,
    sql_exists: String,
    sql_soft_delete: String,
    sql_restore: String,
    _phantom: PhantomData<T>,
}

/// Mirrored column values extracted from the entity's capability accessors.
struct Mirrors {
    created_at: Option<DateTime<Utc>>,
    created_by: Option<String>,
    modified_at: Option<DateTime<Utc>>,
    modified_by: Option<String>,
    deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<String>,
}

fn mirrors<T: Entity>(entity: &T) -> Mirrors {
    let created = entity.created_stamp();
    let modified = entity.modified_stamp();
    let deletion = entity.deletion_stamp();
    Mirrors {
        created_at: created.as_ref().map(|s| s.at),
        created_by: created.and_then(|s| s.by),
        modified_at: modified.as_ref().map(|s| s.at),
        modified_by: modified.and_then(|s| s.by),
        deleted: entity.is_deleted(),
        deleted_at: deletion.as_ref().map(|s| s.at),
        deleted_by: deletion.and_then(|s| s.by),
    }
}

fn is_transient(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code.starts_with("08") || code == "57P01" || code == "57014")
            .unwrap_or(false),
        _ => false,
    }
}

fn classify(error: sqlx::Error, operation: &'static str, entity: &'static str) -> StoreError {
    if is_transient(&error) {
        return StoreError::transient(operation, entity, error);
    }
    if let sqlx::Error::Database(db) = &error {
        match db.code().as_deref() {
            // serialization failure, deadlock, unique violation
            Some("40001") | Some("40P01") | Some("23505") => {
                return StoreError::conflict(operation, entity, db.to_string());
            }
            _ => {}
        }
    }
    StoreError::store(operation, entity, error)
}

impl<T: Entity> PgRepository<T> {
    pub fn new(
        pool: PgPool,
        table: String,
        soft_delete: bool,
        retry_attempts: u32,
        retry_backoff: Duration,
    ) -> Self {
        let guard = if soft_delete { " AND NOT deleted" } else { "" };
        let where_live = if soft_delete { " WHERE NOT deleted" } else { "" };

        Self {
            sql_insert: format!(
                "INSERT INTO {table} (id, doc, created_at, created_by, deleted, deleted_at, deleted_by) \
                 VALUES ($1, $2, COALESCE($3, now()), $4, $5, $6, $7)"
            ),
            sql_update: format!(
                "UPDATE {table} SET doc = $2, modified_at = COALESCE($3, now()), modified_by = $4, \
                 deleted = $5, deleted_at = $6, deleted_by = $7 WHERE id = $1{guard} RETURNING id"
            ),
            sql_get: format!("SELECT doc FROM {table} WHERE id = $1{guard}"),
            sql_get_any: format!("SELECT doc FROM {table} WHERE id = $1"),
            sql_get_all: format!("SELECT doc FROM {table}{where_live} ORDER BY id"),
            sql_get_by_ids: format!(
                "SELECT doc FROM {table} WHERE id = ANY($1){guard} ORDER BY id"
            ),
            sql_delete: format!("DELETE FROM {table} WHERE id = $1 RETURNING doc"),
            sql_exists: format!("SELECT 1 FROM {table} WHERE id = $1{guard}"),
            sql_soft_delete: format!(
                "UPDATE {table} SET doc = $2, deleted = TRUE, deleted_at = $3, deleted_by = $4 \
                 WHERE id = $1"
            ),
            sql_restore: format!(
                "UPDATE {table} SET doc = $2, deleted = FALSE, deleted_at = NULL, deleted_by = NULL \
                 WHERE id = $1"
            ),
            pool,
            table,
            soft_delete,
            retry_attempts,
            retry_backoff,
            _phantom: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn to_doc(&self, entity: &T) -> Result<Value, StoreError> {
        serde_json::to_value(entity).map_err(|e| StoreError::serialization(T::type_name(), e))
    }

    fn hydrate(&self, doc: Value) -> Result<T, StoreError> {
        serde_json::from_value(doc).map_err(|e| StoreError::serialization(T::type_name(), e))
    }

    /// Run a single idempotent command, retrying transient failures with
    /// linear backoff. Never used for statements inside a transaction.
    async fn with_retry<R, F, Fut>(&self, operation: &'static str, run: F) -> Result<R, StoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<R, sqlx::Error>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match run().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        entity = T::type_name(),
                        attempt,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(classify(e, operation, T::type_name())),
            }
        }
    }

    async fn fetch_doc(
        &self,
        sql: &str,
        id: Uuid,
        operation: &'static str,
    ) -> Result<Option<T>, StoreError> {
        let doc = self
            .with_retry(operation, || {
                sqlx::query_scalar::<_, Value>(sql)
                    .bind(id)
                    .fetch_optional(&self.pool)
            })
            .await?;
        doc.map(|d| self.hydrate(d)).transpose()
    }

    /// Assemble the WHERE fragment from the standing filter and an optional
    /// caller filter; placeholders start at 1.
    fn where_clause(
        &self,
        filter: Option<&Filter>,
    ) -> Result<(String, Vec<SqlParam>), StoreError> {
        let mut parts = Vec::new();
        let mut params = Vec::new();
        if self.soft_delete {
            parts.push("NOT deleted".to_string());
        }
        if let Some(filter) = filter {
            let rendered = render_filter(filter, 1)?;
            parts.push(rendered.clause);
            params = rendered.params;
        }
        if parts.is_empty() {
            Ok((String::new(), params))
        } else {
            Ok((format!(" WHERE {}", parts.join(" AND ")), params))
        }
    }

    fn bind_params<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        params: &[SqlParam],
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        let mut query = query;
        for param in params {
            query = match param {
                SqlParam::Json(value) => query.bind(value.clone()),
                SqlParam::Text(text) => query.bind(text.clone()),
            };
        }
        query
    }

    /// Stage a create inside a caller-managed transaction.
    pub async fn create_tx(
        &self,
        mut entity: T,
        tx: &mut PgTransaction<'_>,
        cancel: &CancellationToken,
    ) -> Result<T, StoreError> {
        ensure_live(cancel, "create", T::type_name())?;
        if entity.id().is_nil() {
            entity.set_id(Uuid::new_v4());
        }
        let doc = self.to_doc(&entity)?;
        let m = mirrors(&entity);
        sqlx::query(&self.sql_insert)
            .bind(entity.id())
            .bind(doc)
            .bind(m.created_at)
            .bind(m.created_by)
            .bind(m.deleted)
            .bind(m.deleted_at)
            .bind(m.deleted_by)
            .execute(tx.as_mut().as_mut())
            .await
            .map_err(|e| classify(e, "create", T::type_name()))?;
        Ok(entity)
    }

    /// Stage an update inside a caller-managed transaction.
    pub async fn update_tx(
        &self,
        entity: T,
        tx: &mut PgTransaction<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        ensure_live(cancel, "update", T::type_name())?;
        if entity.id().is_nil() {
            return Err(StoreError::invalid_argument(
                "update",
                T::type_name(),
                "entity identifier must not be empty",
            ));
        }
        let doc = self.to_doc(&entity)?;
        let m = mirrors(&entity);
        let matched = sqlx::query(&self.sql_update)
            .bind(entity.id())
            .bind(doc)
            .bind(m.modified_at)
            .bind(m.modified_by)
            .bind(m.deleted)
            .bind(m.deleted_at)
            .bind(m.deleted_by)
            .fetch_optional(tx.as_mut().as_mut())
            .await
            .map_err(|e| classify(e, "update", T::type_name()))?;
        Ok(matched.map(|_| entity))
    }

    /// Stage a hard delete inside a caller-managed transaction.
    pub async fn delete_tx(
        &self,
        id: Uuid,
        tx: &mut PgTransaction<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        ensure_live(cancel, "delete", T::type_name())?;
        if id.is_nil() {
            return Err(StoreError::invalid_argument(
                "delete",
                T::type_name(),
                "identifier must not be empty",
            ));
        }
        let doc = sqlx::query_scalar::<_, Value>(&self.sql_delete)
            .bind(id)
            .fetch_optional(tx.as_mut().as_mut())
            .await
            .map_err(|e| classify(e, "delete", T::type_name()))?;
        doc.map(|d| self.hydrate(d)).transpose()
    }
}

#[async_trait]
impl<T: Entity> EntityRepository<T> for PgRepository<T> {
    async fn create(&self, mut entity: T, cancel: &CancellationToken) -> Result<T, StoreError> {
        ensure_live(cancel, "create", T::type_name())?;
        if entity.id().is_nil() {
            entity.set_id(Uuid::new_v4());
        }
        let doc = self.to_doc(&entity)?;
        let m = mirrors(&entity);
        self.with_retry("create", || {
            sqlx::query(&self.sql_insert)
                .bind(entity.id())
                .bind(doc.clone())
                .bind(m.created_at)
                .bind(m.created_by.clone())
                .bind(m.deleted)
                .bind(m.deleted_at)
                .bind(m.deleted_by.clone())
                .execute(&self.pool)
        })
        .await?;
        Ok(entity)
    }

    /// Atomic: the whole batch commits or fails as a unit.
    async fn create_many(
        &self,
        mut entities: Vec<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError> {
        ensure_live(cancel, "create_many", T::type_name())?;
        if entities.is_empty() {
            return Ok(entities);
        }
        for entity in &mut entities {
            if entity.id().is_nil() {
                entity.set_id(Uuid::new_v4());
            }
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, "create_many", T::type_name()))?;
        for entity in &entities {
            ensure_live(cancel, "create_many", T::type_name())?;
            let doc = self.to_doc(entity)?;
            let m = mirrors(entity);
            sqlx::query(&self.sql_insert)
                .bind(entity.id())
                .bind(doc)
                .bind(m.created_at)
                .bind(m.created_by)
                .bind(m.deleted)
                .bind(m.deleted_at)
                .bind(m.deleted_by)
                .execute(tx.as_mut())
                .await
                .map_err(|e| classify(e, "create_many", T::type_name()))?;
        }
        tx.commit()
            .await
            .map_err(|e| classify(e, "create_many", T::type_name()))?;
        Ok(entities)
    }

    async fn update(
        &self,
        entity: T,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        ensure_live(cancel, "update", T::type_name())?;
        if entity.id().is_nil() {
            return Err(StoreError::invalid_argument(
                "update",
                T::type_name(),
                "entity identifier must not be empty",
            ));
        }
        let doc = self.to_doc(&entity)?;
        let m = mirrors(&entity);
        let matched = self
            .with_retry("update", || {
                sqlx::query(&self.sql_update)
                    .bind(entity.id())
                    .bind(doc.clone())
                    .bind(m.modified_at)
                    .bind(m.modified_by.clone())
                    .bind(m.deleted)
                    .bind(m.deleted_at)
                    .bind(m.deleted_by.clone())
                    .fetch_optional(&self.pool)
            })
            .await?;
        Ok(matched.map(|_| entity))
    }

    /// Atomic: updates are staged in one transaction; the returned vector
    /// contains the entities whose rows existed.
    async fn update_many(
        &self,
        entities: Vec<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError> {
        ensure_live(cancel, "update_many", T::type_name())?;
        if entities.iter().any(|e| e.id().is_nil()) {
            return Err(StoreError::invalid_argument(
                "update_many",
                T::type_name(),
                "entity identifiers must not be empty",
            ));
        }
        if entities.is_empty() {
            return Ok(entities);
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, "update_many", T::type_name()))?;
        let mut updated = Vec::with_capacity(entities.len());
        for entity in entities {
            ensure_live(cancel, "update_many", T::type_name())?;
            let doc = self.to_doc(&entity)?;
            let m = mirrors(&entity);
            let matched = sqlx::query(&self.sql_update)
                .bind(entity.id())
                .bind(doc)
                .bind(m.modified_at)
                .bind(m.modified_by)
                .bind(m.deleted)
                .bind(m.deleted_at)
                .bind(m.deleted_by)
                .fetch_optional(tx.as_mut())
                .await
                .map_err(|e| classify(e, "update_many", T::type_name()))?;
            if matched.is_some() {
                updated.push(entity);
            }
        }
        tx.commit()
            .await
            .map_err(|e| classify(e, "update_many", T::type_name()))?;
        Ok(updated)
    }

    async fn delete(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<T>, StoreError> {
        ensure_live(cancel, "delete", T::type_name())?;
        if id.is_nil() {
            return Err(StoreError::invalid_argument(
                "delete",
                T::type_name(),
                "identifier must not be empty",
            ));
        }
        let doc = self
            .with_retry("delete", || {
                sqlx::query_scalar::<_, Value>(&self.sql_delete)
                    .bind(id)
                    .fetch_optional(&self.pool)
            })
            .await?;
        doc.map(|d| self.hydrate(d)).transpose()
    }

    /// Atomic: deletions are staged in one transaction.
    async fn delete_many(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError> {
        ensure_live(cancel, "delete_many", T::type_name())?;
        if ids.iter().any(Uuid::is_nil) {
            return Err(StoreError::invalid_argument(
                "delete_many",
                T::type_name(),
                "identifiers must not be empty",
            ));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, "delete_many", T::type_name()))?;
        let mut removed = Vec::new();
        for id in ids {
            ensure_live(cancel, "delete_many", T::type_name())?;
            let doc = sqlx::query_scalar::<_, Value>(&self.sql_delete)
                .bind(id)
                .fetch_optional(tx.as_mut())
                .await
                .map_err(|e| classify(e, "delete_many", T::type_name()))?;
            if let Some(doc) = doc {
                removed.push(self.hydrate(doc)?);
            }
        }
        tx.commit()
            .await
            .map_err(|e| classify(e, "delete_many", T::type_name()))?;
        Ok(removed)
    }

    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<T>, StoreError> {
        ensure_live(cancel, "get_all", T::type_name())?;
        let docs = self
            .with_retry("get_all", || {
                sqlx::query_scalar::<_, Value>(&self.sql_get_all).fetch_all(&self.pool)
            })
            .await?;
        docs.into_iter().map(|d| self.hydrate(d)).collect()
    }

    async fn get_by_id(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        ensure_live(cancel, "get_by_id", T::type_name())?;
        self.fetch_doc(&self.sql_get, id, "get_by_id").await
    }

    async fn get_by_ids(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError> {
        ensure_live(cancel, "get_by_ids", T::type_name())?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        let docs = self
            .with_retry("get_by_ids", || {
                sqlx::query_scalar::<_, Value>(&self.sql_get_by_ids)
                    .bind(ids.clone())
                    .fetch_all(&self.pool)
            })
            .await?;
        docs.into_iter().map(|d| self.hydrate(d)).collect()
    }

    async fn query(
        &self,
        params: QueryParams,
        cancel: &CancellationToken,
    ) -> Result<Page<T>, StoreError> {
        ensure_live(cancel, "query", T::type_name())?;
        let (where_sql, bound) = self.where_clause(params.filter.as_ref())?;

        let count_sql = format!("SELECT COUNT(*) FROM {}{}", self.table, where_sql);
        let total: i64 = self
            .with_retry("query", || {
                Self::bind_params(sqlx::query(&count_sql), &bound).fetch_one(&self.pool)
            })
            .await?
            .try_get(0)
            .map_err(|e| StoreError::store("query", T::type_name(), e))?;

        let order_by = render_order_by(&params.sort)?;
        let select_sql = format!(
            "SELECT doc FROM {}{} {} LIMIT {} OFFSET {}",
            self.table,
            where_sql,
            order_by,
            params.page_size as i64,
            params.offset() as i64,
        );
        let rows = self
            .with_retry("query", || {
                Self::bind_params(sqlx::query(&select_sql), &bound).fetch_all(&self.pool)
            })
            .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let doc: Value = row
                .try_get(0)
                .map_err(|e| StoreError::store("query", T::type_name(), e))?;
            items.push(self.hydrate(doc)?);
        }
        Ok(Page::new(items, params.page, params.page_size, total as u64))
    }
}

#[async_trait]
impl<T: Entity> ExtendedEntityRepository<T> for PgRepository<T> {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactions: true,
            // updates rewrite the full document, there is no tracked diff
            change_tracking: false,
        }
    }

    async fn exists(&self, id: Uuid, cancel: &CancellationToken) -> Result<bool, StoreError> {
        ensure_live(cancel, "exists", T::type_name())?;
        let row = self
            .with_retry("exists", || {
                sqlx::query(&self.sql_exists)
                    .bind(id)
                    .fetch_optional(&self.pool)
            })
            .await?;
        Ok(row.is_some())
    }

    async fn count(
        &self,
        filter: Option<Filter>,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError> {
        ensure_live(cancel, "count", T::type_name())?;
        let (where_sql, bound) = self.where_clause(filter.as_ref())?;
        let count_sql = format!("SELECT COUNT(*) FROM {}{}", self.table, where_sql);
        let total: i64 = self
            .with_retry("count", || {
                Self::bind_params(sqlx::query(&count_sql), &bound).fetch_one(&self.pool)
            })
            .await?
            .try_get(0)
            .map_err(|e| StoreError::store("count", T::type_name(), e))?;
        Ok(total as u64)
    }

    async fn create_audited(
        &self,
        mut entity: T,
        actor: &str,
        cancel: &CancellationToken,
    ) -> Result<T, StoreError> {
        entity.stamp_created(Some(actor), Utc::now());
        self.create(entity, cancel).await
    }

    async fn update_audited(
        &self,
        mut entity: T,
        actor: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        entity.stamp_modified(Some(actor), Utc::now());
        self.update(entity, cancel).await
    }

    async fn update_fields(
        &self,
        filter: Option<Filter>,
        changes: &[(String, Value)],
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError> {
        ensure_live(cancel, "update_fields", T::type_name())?;
        if changes.is_empty() {
            return Ok(0);
        }
        let mut patch = serde_json::Map::with_capacity(changes.len());
        for (field, value) in changes {
            ValidatedFieldName::new(field)?;
            if field == T::id_field() || Some(field.as_str()) == T::deleted_flag_field() {
                return Err(StoreError::invalid_argument(
                    "update_fields",
                    T::type_name(),
                    format!("field '{field}' cannot be bulk-updated"),
                ));
            }
            patch.insert(field.clone(), value.clone());
        }
        let patch = Value::Object(patch);

        // $1 is the patch; filter placeholders start at 2
        let mut parts = Vec::new();
        if self.soft_delete {
            parts.push("NOT deleted".to_string());
        }
        let mut bound = Vec::new();
        if let Some(filter) = &filter {
            let rendered = render_filter(filter, 2)?;
            parts.push(rendered.clause);
            bound = rendered.params;
        }
        let where_sql = if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        };
        let sql = format!(
            "UPDATE {} SET doc = doc || $1, modified_at = now(){}",
            self.table, where_sql
        );
        let result = self
            .with_retry("update_fields", || {
                Self::bind_params(sqlx::query(&sql).bind(patch.clone()), &bound)
                    .execute(&self.pool)
            })
            .await?;
        Ok(result.rows_affected())
    }

    async fn select_fields(
        &self,
        filter: Option<Filter>,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, StoreError> {
        ensure_live(cancel, "select_fields", T::type_name())?;
        if fields.is_empty() {
            return Err(StoreError::invalid_argument(
                "select_fields",
                T::type_name(),
                "at least one field is required",
            ));
        }
        let projection = fields
            .iter()
            .map(|field| {
                let field = ValidatedFieldName::new(field)?;
                Ok(format!("'{field}', doc->'{field}'"))
            })
            .collect::<Result<Vec<_>, StoreError>>()?
            .join(", ");
        let (where_sql, bound) = self.where_clause(filter.as_ref())?;
        let sql = format!(
            "SELECT jsonb_build_object({projection}) FROM {}{} ORDER BY id",
            self.table, where_sql
        );
        let rows = self
            .with_retry("select_fields", || {
                Self::bind_params(sqlx::query(&sql), &bound).fetch_all(&self.pool)
            })
            .await?;
        rows.into_iter()
            .map(|row| {
                row.try_get(0)
                    .map_err(|e| StoreError::store("select_fields", T::type_name(), e))
            })
            .collect()
    }

    fn stream(&self, cancel: CancellationToken) -> BoxStream<'static, Result<T, StoreError>> {
        let guard = if self.soft_delete { " AND NOT deleted" } else { "" };
        let sql = format!(
            "SELECT id, doc FROM {} WHERE id > $1{guard} ORDER BY id LIMIT $2",
            self.table
        );
        let pool = self.pool.clone();
        let stream = futures::stream::try_unfold(
            (pool, Uuid::nil(), false),
            move |(pool, last, done)| {
                let sql = sql.clone();
                let cancel = cancel.clone();
                async move {
                    if done {
                        return Ok(None);
                    }
                    if cancel.is_cancelled() {
                        return Err(StoreError::cancelled("stream", T::type_name()));
                    }
                    let rows = sqlx::query(&sql)
                        .bind(last)
                        .bind(STREAM_CHUNK)
                        .fetch_all(&pool)
                        .await
                        .map_err(|e| classify(e, "stream", T::type_name()))?;
                    if rows.is_empty() {
                        return Ok(None);
                    }
                    let exhausted = rows.len() < STREAM_CHUNK as usize;
                    let mut next_last = last;
                    let mut batch = Vec::with_capacity(rows.len());
                    for row in rows {
                        let id: Uuid = row
                            .try_get(0)
                            .map_err(|e| StoreError::store("stream", T::type_name(), e))?;
                        let doc: Value = row
                            .try_get(1)
                            .map_err(|e| StoreError::store("stream", T::type_name(), e))?;
                        next_last = id;
                        batch.push(
                            serde_json::from_value(doc)
                                .map_err(|e| StoreError::serialization(T::type_name(), e))?,
                        );
                    }
                    Ok(Some((batch, (pool, next_last, exhausted))))
                }
            },
        )
        .map_ok(|batch: Vec<T>| futures::stream::iter(batch.into_iter().map(Ok)))
        .try_flatten();
        Box::pin(stream)
    }

    async fn get_by_id_any(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        ensure_live(cancel, "get_by_id_any", T::type_name())?;
        self.fetch_doc(&self.sql_get_any, id, "get_by_id_any").await
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        actor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        ensure_live(cancel, "soft_delete", T::type_name())?;
        if !T::soft_delete_capable() {
            return Ok(None);
        }
        let Some(mut entity) = self.fetch_doc(&self.sql_get_any, id, "soft_delete").await? else {
            return Ok(None);
        };
        if entity.is_deleted() {
            return Ok(Some(entity));
        }
        let stamp = DeletionStamp::new(Utc::now(), actor);
        entity.set_deletion_stamp(Some(stamp.clone()));
        let doc = self.to_doc(&entity)?;
        ensure_live(cancel, "soft_delete", T::type_name())?;
        self.with_retry("soft_delete", || {
            sqlx::query(&self.sql_soft_delete)
                .bind(id)
                .bind(doc.clone())
                .bind(stamp.at)
                .bind(stamp.by.clone())
                .execute(&self.pool)
        })
        .await?;
        Ok(Some(entity))
    }

    async fn restore(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        ensure_live(cancel, "restore", T::type_name())?;
        if !T::soft_delete_capable() {
            return Ok(None);
        }
        let Some(mut entity) = self.fetch_doc(&self.sql_get_any, id, "restore").await? else {
            return Ok(None);
        };
        entity.set_deletion_stamp(None);
        let doc = self.to_doc(&entity)?;
        ensure_live(cancel, "restore", T::type_name())?;
        self.with_retry("restore", || {
            sqlx::query(&self.sql_restore)
                .bind(id)
                .bind(doc.clone())
                .execute(&self.pool)
        })
        .await?;
        Ok(Some(entity))
    }
}
