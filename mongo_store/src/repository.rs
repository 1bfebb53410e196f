//! Generic MongoDB repository
//!
//! Writes rely on the store's single-document atomicity; multi-entity
//! operations run inside a session transaction when the deployment supports
//! one (`use_transactions`), otherwise they apply item by item and report
//! exactly the entities that were persisted. Transient-failure retries are
//! the driver's own (retryable reads/writes); no extra retry layer is added
//! here.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Client, ClientSession, Collection};
use repo_core::errors::ensure_live;
use repo_core::{
    Capabilities, CancellationToken, DeletionStamp, Entity, EntityRepository,
    ExtendedEntityRepository, Filter, Page, QueryParams, StoreError, ValidatedFieldName,
};
use serde_json::Value;
use uuid::Uuid;

use crate::filter::{match_all, render_filter, render_sort};

const STREAM_CHUNK: i64 = 256;

pub struct MongoRepository<T: Entity> {
    collection: Collection<Document>,
    client: Client,
    soft_delete: bool,
    use_transactions: bool,
    _phantom: PhantomData<T>,
}

fn is_transient(error: &mongodb::error::Error) -> bool {
    matches!(
        *error.kind,
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. }
    ) || error.contains_label("TransientTransactionError")
}

fn classify(
    error: mongodb::error::Error,
    operation: &'static str,
    entity: &'static str,
) -> StoreError {
    if is_transient(&error) {
        return StoreError::transient(operation, entity, error);
    }
    if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = &*error.kind {
        // duplicate key
        if write_error.code == 11000 {
            return StoreError::conflict(operation, entity, write_error.message.clone());
        }
    }
    StoreError::store(operation, entity, error)
}

impl<T: Entity> MongoRepository<T> {
    pub fn new(
        collection: Collection<Document>,
        client: Client,
        soft_delete: bool,
        use_transactions: bool,
    ) -> Self {
        Self {
            collection,
            client,
            soft_delete,
            use_transactions,
            _phantom: PhantomData,
        }
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    fn id_filter(id: Uuid) -> Document {
        doc! { "_id": id.to_string() }
    }

    /// Standing filter for default reads: narrows to "not deleted" when the
    /// entity type is capable and enforcement is configured.
    fn with_live(&self, filter: Document) -> Document {
        let Some(flag) = T::deleted_flag_field().filter(|_| self.soft_delete) else {
            return filter;
        };
        let guard = doc! { flag: false };
        if filter.is_empty() {
            guard
        } else {
            doc! { "$and": [ guard, filter ] }
        }
    }

    fn to_document(&self, entity: &T) -> Result<Document, StoreError> {
        let mut document = mongodb::bson::to_document(entity)
            .map_err(|e| StoreError::serialization(T::type_name(), e))?;
        document.insert("_id", entity.id().to_string());
        Ok(document)
    }

    fn hydrate(&self, mut document: Document) -> Result<T, StoreError> {
        document.remove("_id");
        mongodb::bson::from_document(document)
            .map_err(|e| StoreError::serialization(T::type_name(), e))
    }

    async fn fetch(
        &self,
        filter: Document,
        operation: &'static str,
    ) -> Result<Option<T>, StoreError> {
        let document = self
            .collection
            .find_one(filter)
            .await
            .map_err(|e| classify(e, operation, T::type_name()))?;
        document.map(|d| self.hydrate(d)).transpose()
    }

    async fn collect(
        &self,
        filter: Document,
        operation: &'static str,
    ) -> Result<Vec<T>, StoreError> {
        let documents: Vec<Document> = self
            .collection
            .find(filter)
            .sort(doc! { "_id": 1 })
            .await
            .map_err(|e| classify(e, operation, T::type_name()))?
            .try_collect()
            .await
            .map_err(|e| classify(e, operation, T::type_name()))?;
        documents.into_iter().map(|d| self.hydrate(d)).collect()
    }

    async fn start_transaction(
        &self,
        operation: &'static str,
    ) -> Result<ClientSession, StoreError> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| classify(e, operation, T::type_name()))?;
        session
            .start_transaction()
            .await
            .map_err(|e| classify(e, operation, T::type_name()))?;
        Ok(session)
    }
}

#[async_trait]
impl<T: Entity> EntityRepository<T> for MongoRepository<T> {
    async fn create(&self, mut entity: T, cancel: &CancellationToken) -> Result<T, StoreError> {
        ensure_live(cancel, "create", T::type_name())?;
        if entity.id().is_nil() {
            entity.set_id(Uuid::new_v4());
        }
        let document = self.to_document(&entity)?;
        self.collection
            .insert_one(document)
            .await
            .map_err(|e| classify(e, "create", T::type_name()))?;
        Ok(entity)
    }

    /// Best-effort: the batch goes through one unordered `insertMany`; on a
    /// partial failure the successfully inserted subset is returned.
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
        let documents = entities
            .iter()
            .map(|e| self.to_document(e))
            .collect::<Result<Vec<_>, _>>()?;
        match self.collection.insert_many(documents).ordered(false).await {
            Ok(_) => Ok(entities),
            Err(error) => {
                if let ErrorKind::InsertMany(insert_error) = &*error.kind {
                    if let Some(write_errors) = &insert_error.write_errors {
                        let failed: std::collections::HashSet<usize> =
                            write_errors.iter().map(|we| we.index).collect();
                        tracing::warn!(
                            entity = T::type_name(),
                            failed = failed.len(),
                            "partial bulk insert"
                        );
                        return Ok(entities
                            .into_iter()
                            .enumerate()
                            .filter(|(i, _)| !failed.contains(i))
                            .map(|(_, e)| e)
                            .collect());
                    }
                }
                Err(classify(error, "create_many", T::type_name()))
            }
        }
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
        let document = self.to_document(&entity)?;
        let result = self
            .collection
            .replace_one(self.with_live(Self::id_filter(entity.id())), document)
            .await
            .map_err(|e| classify(e, "update", T::type_name()))?;
        Ok((result.matched_count > 0).then_some(entity))
    }

    /// Session-transactional when the deployment supports it; otherwise
    /// item-by-item, returning exactly the entities that were persisted.
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

        if self.use_transactions {
            let mut session = self.start_transaction("update_many").await?;
            let mut updated = Vec::with_capacity(entities.len());
            for entity in entities {
                // nothing committed yet: abort cleanly on cancellation
                if cancel.is_cancelled() {
                    let _ = session.abort_transaction().await;
                    return Err(StoreError::cancelled("update_many", T::type_name()));
                }
                let document = self.to_document(&entity)?;
                let result = self
                    .collection
                    .replace_one(self.with_live(Self::id_filter(entity.id())), document)
                    .session(&mut session)
                    .await
                    .map_err(|e| classify(e, "update_many", T::type_name()))?;
                if result.matched_count > 0 {
                    updated.push(entity);
                }
            }
            session
                .commit_transaction()
                .await
                .map_err(|e| classify(e, "update_many", T::type_name()))?;
            return Ok(updated);
        }

        let mut updated = Vec::with_capacity(entities.len());
        for entity in entities {
            // already-applied updates are durable; stop and report them
            if cancel.is_cancelled() {
                tracing::debug!(
                    entity = T::type_name(),
                    applied = updated.len(),
                    "bulk update interrupted by cancellation"
                );
                return Ok(updated);
            }
            let document = self.to_document(&entity)?;
            let result = self
                .collection
                .replace_one(self.with_live(Self::id_filter(entity.id())), document)
                .await
                .map_err(|e| classify(e, "update_many", T::type_name()))?;
            if result.matched_count > 0 {
                updated.push(entity);
            }
        }
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
        let removed = self
            .collection
            .find_one_and_delete(Self::id_filter(id))
            .await
            .map_err(|e| classify(e, "delete", T::type_name()))?;
        removed.map(|d| self.hydrate(d)).transpose()
    }

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

        if self.use_transactions {
            let mut session = self.start_transaction("delete_many").await?;
            let mut removed = Vec::new();
            for id in ids {
                if cancel.is_cancelled() {
                    let _ = session.abort_transaction().await;
                    return Err(StoreError::cancelled("delete_many", T::type_name()));
                }
                let document = self
                    .collection
                    .find_one_and_delete(Self::id_filter(*id))
                    .session(&mut session)
                    .await
                    .map_err(|e| classify(e, "delete_many", T::type_name()))?;
                if let Some(document) = document {
                    removed.push(self.hydrate(document)?);
                }
            }
            session
                .commit_transaction()
                .await
                .map_err(|e| classify(e, "delete_many", T::type_name()))?;
            return Ok(removed);
        }

        let mut removed = Vec::new();
        for id in ids {
            if cancel.is_cancelled() {
                tracing::debug!(
                    entity = T::type_name(),
                    applied = removed.len(),
                    "bulk delete interrupted by cancellation"
                );
                return Ok(removed);
            }
            let document = self
                .collection
                .find_one_and_delete(Self::id_filter(*id))
                .await
                .map_err(|e| classify(e, "delete_many", T::type_name()))?;
            if let Some(document) = document {
                removed.push(self.hydrate(document)?);
            }
        }
        Ok(removed)
    }

    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<T>, StoreError> {
        ensure_live(cancel, "get_all", T::type_name())?;
        self.collect(self.with_live(match_all()), "get_all").await
    }

    async fn get_by_id(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        ensure_live(cancel, "get_by_id", T::type_name())?;
        self.fetch(self.with_live(Self::id_filter(id)), "get_by_id")
            .await
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
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        self.collect(
            self.with_live(doc! { "_id": { "$in": ids } }),
            "get_by_ids",
        )
        .await
    }

    async fn query(
        &self,
        params: QueryParams,
        cancel: &CancellationToken,
    ) -> Result<Page<T>, StoreError> {
        ensure_live(cancel, "query", T::type_name())?;
        let filter = match &params.filter {
            Some(filter) => render_filter(filter)?,
            None => match_all(),
        };
        let filter = self.with_live(filter);

        let total = self
            .collection
            .count_documents(filter.clone())
            .await
            .map_err(|e| classify(e, "query", T::type_name()))?;

        let documents: Vec<Document> = self
            .collection
            .find(filter)
            .sort(render_sort(&params.sort)?)
            .skip(params.offset())
            .limit(params.page_size as i64)
            .await
            .map_err(|e| classify(e, "query", T::type_name()))?
            .try_collect()
            .await
            .map_err(|e| classify(e, "query", T::type_name()))?;

        let items = documents
            .into_iter()
            .map(|d| self.hydrate(d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, params.page, params.page_size, total))
    }
}

#[async_trait]
impl<T: Entity> ExtendedEntityRepository<T> for MongoRepository<T> {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactions: self.use_transactions,
            change_tracking: false,
        }
    }

    async fn exists(&self, id: Uuid, cancel: &CancellationToken) -> Result<bool, StoreError> {
        ensure_live(cancel, "exists", T::type_name())?;
        let count = self
            .collection
            .count_documents(self.with_live(Self::id_filter(id)))
            .await
            .map_err(|e| classify(e, "exists", T::type_name()))?;
        Ok(count > 0)
    }

    async fn count(
        &self,
        filter: Option<Filter>,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError> {
        ensure_live(cancel, "count", T::type_name())?;
        let filter = match &filter {
            Some(filter) => render_filter(filter)?,
            None => match_all(),
        };
        self.collection
            .count_documents(self.with_live(filter))
            .await
            .map_err(|e| classify(e, "count", T::type_name()))
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
        let mut patch = Document::new();
        for (field, value) in changes {
            ValidatedFieldName::new(field)?;
            if field == T::id_field() || Some(field.as_str()) == T::deleted_flag_field() {
                return Err(StoreError::invalid_argument(
                    "update_fields",
                    T::type_name(),
                    format!("field '{field}' cannot be bulk-updated"),
                ));
            }
            let value = mongodb::bson::to_bson(value)
                .map_err(|e| StoreError::serialization(T::type_name(), e))?;
            patch.insert(field, value);
        }
        let filter = match &filter {
            Some(filter) => render_filter(filter)?,
            None => match_all(),
        };
        let result = self
            .collection
            .update_many(self.with_live(filter), doc! { "$set": patch })
            .await
            .map_err(|e| classify(e, "update_fields", T::type_name()))?;
        Ok(result.modified_count)
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
        let mut projection = Document::new();
        projection.insert("_id", 0_i32);
        for field in fields {
            let field = ValidatedFieldName::new(field)?;
            projection.insert(field.as_str(), 1_i32);
        }
        let filter = match &filter {
            Some(filter) => render_filter(filter)?,
            None => match_all(),
        };
        let documents: Vec<Document> = self
            .collection
            .find(self.with_live(filter))
            .projection(projection)
            .sort(doc! { "_id": 1 })
            .await
            .map_err(|e| classify(e, "select_fields", T::type_name()))?
            .try_collect()
            .await
            .map_err(|e| classify(e, "select_fields", T::type_name()))?;
        documents
            .into_iter()
            .map(|d| {
                serde_json::to_value(&d).map_err(|e| StoreError::serialization(T::type_name(), e))
            })
            .collect()
    }

    fn stream(&self, cancel: CancellationToken) -> BoxStream<'static, Result<T, StoreError>> {
        let collection = self.collection.clone();
        let live = self.with_live(match_all());
        let stream = futures::stream::try_unfold(
            (collection, String::new(), false),
            move |(collection, last, done)| {
                let live = live.clone();
                let cancel = cancel.clone();
                async move {
                    if done {
                        return Ok(None);
                    }
                    if cancel.is_cancelled() {
                        return Err(StoreError::cancelled("stream", T::type_name()));
                    }
                    let keyset = doc! { "_id": { "$gt": last.as_str() } };
                    let filter = if live.is_empty() {
                        keyset
                    } else {
                        doc! { "$and": [ live, keyset ] }
                    };
                    let documents: Vec<Document> = collection
                        .find(filter)
                        .sort(doc! { "_id": 1 })
                        .limit(STREAM_CHUNK)
                        .await
                        .map_err(|e| classify(e, "stream", T::type_name()))?
                        .try_collect()
                        .await
                        .map_err(|e| classify(e, "stream", T::type_name()))?;
                    if documents.is_empty() {
                        return Ok(None);
                    }
                    let exhausted = documents.len() < STREAM_CHUNK as usize;
                    let mut next_last = last;
                    let mut batch = Vec::with_capacity(documents.len());
                    for mut document in documents {
                        if let Ok(id) = document.get_str("_id") {
                            next_last = id.to_string();
                        }
                        document.remove("_id");
                        batch.push(
                            mongodb::bson::from_document::<T>(document)
                                .map_err(|e| StoreError::serialization(T::type_name(), e))?,
                        );
                    }
                    Ok(Some((batch, (collection, next_last, exhausted))))
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
        self.fetch(Self::id_filter(id), "get_by_id_any").await
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
        let Some(mut entity) = self.fetch(Self::id_filter(id), "soft_delete").await? else {
            return Ok(None);
        };
        if entity.is_deleted() {
            return Ok(Some(entity));
        }
        entity.set_deletion_stamp(Some(DeletionStamp::new(Utc::now(), actor)));
        let document = self.to_document(&entity)?;
        ensure_live(cancel, "soft_delete", T::type_name())?;
        self.collection
            .replace_one(Self::id_filter(id), document)
            .await
            .map_err(|e| classify(e, "soft_delete", T::type_name()))?;
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
        let Some(mut entity) = self.fetch(Self::id_filter(id), "restore").await? else {
            return Ok(None);
        };
        entity.set_deletion_stamp(None);
        let document = self.to_document(&entity)?;
        ensure_live(cancel, "restore", T::type_name())?;
        self.collection
            .replace_one(Self::id_filter(id), document)
            .await
            .map_err(|e| classify(e, "restore", T::type_name()))?;
        Ok(Some(entity))
    }
}
