//! Generic embedded-store repository
//!
//! Every operation takes the collection mutex for its whole duration, then
//! evaluates filters with the reference in-memory semantics the remote
//! providers translate to. A mutation that fails to reach the disk is rolled
//! back in memory before the error propagates, so the in-memory view never
//! runs ahead of the file.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use repo_core::errors::ensure_live;
use repo_core::query::ordering::sort_documents;
use repo_core::{
    Capabilities, CancellationToken, DeletionStamp, Entity, EntityRepository,
    ExtendedEntityRepository, Filter, Page, QueryParams, SortClause, StoreError,
    ValidatedFieldName,
};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

type Collection = BTreeMap<Uuid, Value>;

#[derive(Clone)]
pub struct FileRepository<T: Entity> {
    path: PathBuf,
    state: Arc<Mutex<Collection>>,
    soft_delete: bool,
    _phantom: PhantomData<T>,
}

impl<T: Entity> FileRepository<T> {
    pub(crate) fn new(path: PathBuf, state: Arc<Mutex<Collection>>, soft_delete: bool) -> Self {
        Self {
            path,
            state,
            soft_delete,
            _phantom: PhantomData,
        }
    }

    fn to_doc(&self, entity: &T) -> Result<Value, StoreError> {
        serde_json::to_value(entity).map_err(|e| StoreError::serialization(T::type_name(), e))
    }

    fn hydrate(&self, doc: &Value) -> Result<T, StoreError> {
        serde_json::from_value(doc.clone())
            .map_err(|e| StoreError::serialization(T::type_name(), e))
    }

    fn is_live(&self, doc: &Value) -> bool {
        if !self.soft_delete {
            return true;
        }
        let Some(flag) = T::deleted_flag_field() else {
            return true;
        };
        !doc.get(flag).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Rewrite the collection file: serialize, write a sibling temp file,
    /// rename over the original.
    async fn flush(&self, state: &Collection) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| StoreError::serialization(T::type_name(), e))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::store("flush", T::type_name(), e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::store("flush", T::type_name(), e))?;
        Ok(())
    }

    fn live_matching(&self, state: &Collection, filter: Option<&Filter>) -> Vec<Value> {
        state
            .values()
            .filter(|doc| self.is_live(doc))
            .filter(|doc| filter.is_none_or(|f| f.matches(doc)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl<T: Entity> EntityRepository<T> for FileRepository<T> {
    async fn create(&self, mut entity: T, cancel: &CancellationToken) -> Result<T, StoreError> {
        let mut state = self.state.lock().await;
        ensure_live(cancel, "create", T::type_name())?;
        if entity.id().is_nil() {
            entity.set_id(Uuid::new_v4());
        }
        let id = entity.id();
        if state.contains_key(&id) {
            return Err(StoreError::conflict(
                "create",
                T::type_name(),
                format!("identifier {id} already exists"),
            ));
        }
        state.insert(id, self.to_doc(&entity)?);
        if let Err(e) = self.flush(&state).await {
            state.remove(&id);
            return Err(e);
        }
        Ok(entity)
    }

    /// Atomic: identifiers are checked up front and the file is rewritten
    /// once; a failed flush rolls the whole batch back.
    async fn create_many(
        &self,
        mut entities: Vec<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError> {
        let mut state = self.state.lock().await;
        ensure_live(cancel, "create_many", T::type_name())?;
        if entities.is_empty() {
            return Ok(entities);
        }
        for entity in &mut entities {
            if entity.id().is_nil() {
                entity.set_id(Uuid::new_v4());
            }
        }
        let mut seen = std::collections::HashSet::with_capacity(entities.len());
        for entity in &entities {
            let id = entity.id();
            if state.contains_key(&id) || !seen.insert(id) {
                return Err(StoreError::conflict(
                    "create_many",
                    T::type_name(),
                    format!("identifier {id} already exists"),
                ));
            }
        }
        for entity in &entities {
            state.insert(entity.id(), self.to_doc(entity)?);
        }
        if let Err(e) = self.flush(&state).await {
            for entity in &entities {
                state.remove(&entity.id());
            }
            return Err(e);
        }
        Ok(entities)
    }

    async fn update(
        &self,
        entity: T,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        if entity.id().is_nil() {
            return Err(StoreError::invalid_argument(
                "update",
                T::type_name(),
                "entity identifier must not be empty",
            ));
        }
        let mut state = self.state.lock().await;
        ensure_live(cancel, "update", T::type_name())?;
        let id = entity.id();
        let Some(previous) = state.get(&id).filter(|doc| self.is_live(doc)).cloned() else {
            return Ok(None);
        };
        state.insert(id, self.to_doc(&entity)?);
        if let Err(e) = self.flush(&state).await {
            state.insert(id, previous);
            return Err(e);
        }
        Ok(Some(entity))
    }

    async fn update_many(
        &self,
        entities: Vec<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError> {
        if entities.iter().any(|e| e.id().is_nil()) {
            return Err(StoreError::invalid_argument(
                "update_many",
                T::type_name(),
                "entity identifiers must not be empty",
            ));
        }
        let mut state = self.state.lock().await;
        ensure_live(cancel, "update_many", T::type_name())?;
        let snapshot = state.clone();
        let mut updated = Vec::with_capacity(entities.len());
        for entity in entities {
            let id = entity.id();
            if state.get(&id).filter(|doc| self.is_live(doc)).is_some() {
                state.insert(id, self.to_doc(&entity)?);
                updated.push(entity);
            }
        }
        if let Err(e) = self.flush(&state).await {
            *state = snapshot;
            return Err(e);
        }
        Ok(updated)
    }

    async fn delete(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<T>, StoreError> {
        if id.is_nil() {
            return Err(StoreError::invalid_argument(
                "delete",
                T::type_name(),
                "identifier must not be empty",
            ));
        }
        let mut state = self.state.lock().await;
        ensure_live(cancel, "delete", T::type_name())?;
        let Some(previous) = state.remove(&id) else {
            return Ok(None);
        };
        if let Err(e) = self.flush(&state).await {
            state.insert(id, previous);
            return Err(e);
        }
        Ok(Some(self.hydrate(&previous)?))
    }

    async fn delete_many(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError> {
        if ids.iter().any(Uuid::is_nil) {
            return Err(StoreError::invalid_argument(
                "delete_many",
                T::type_name(),
                "identifiers must not be empty",
            ));
        }
        let mut state = self.state.lock().await;
        ensure_live(cancel, "delete_many", T::type_name())?;
        let snapshot = state.clone();
        let mut removed = Vec::new();
        for id in ids {
            if let Some(previous) = state.remove(id) {
                removed.push(self.hydrate(&previous)?);
            }
        }
        if removed.is_empty() {
            return Ok(removed);
        }
        if let Err(e) = self.flush(&state).await {
            *state = snapshot;
            return Err(e);
        }
        Ok(removed)
    }

    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<T>, StoreError> {
        let state = self.state.lock().await;
        ensure_live(cancel, "get_all", T::type_name())?;
        state
            .values()
            .filter(|doc| self.is_live(doc))
            .map(|doc| self.hydrate(doc))
            .collect()
    }

    async fn get_by_id(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        let state = self.state.lock().await;
        ensure_live(cancel, "get_by_id", T::type_name())?;
        state
            .get(&id)
            .filter(|doc| self.is_live(doc))
            .map(|doc| self.hydrate(doc))
            .transpose()
    }

    async fn get_by_ids(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError> {
        let state = self.state.lock().await;
        ensure_live(cancel, "get_by_ids", T::type_name())?;
        ids.iter()
            .filter_map(|id| state.get(id))
            .filter(|doc| self.is_live(doc))
            .map(|doc| self.hydrate(doc))
            .collect()
    }

    async fn query(
        &self,
        params: QueryParams,
        cancel: &CancellationToken,
    ) -> Result<Page<T>, StoreError> {
        let state = self.state.lock().await;
        ensure_live(cancel, "query", T::type_name())?;
        let mut matching = self.live_matching(&state, params.filter.as_ref());
        drop(state);

        let total = matching.len() as u64;
        let mut clauses = params.sort.clone();
        clauses.push(SortClause::asc(T::id_field()));
        sort_documents(&mut matching, &clauses);

        let items = matching
            .iter()
            .skip(params.offset() as usize)
            .take(params.page_size as usize)
            .map(|doc| self.hydrate(doc))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, params.page, params.page_size, total))
    }
}

#[async_trait]
impl<T: Entity> ExtendedEntityRepository<T> for FileRepository<T> {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            // single-operation atomicity only
            transactions: false,
            change_tracking: false,
        }
    }

    async fn exists(&self, id: Uuid, cancel: &CancellationToken) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        ensure_live(cancel, "exists", T::type_name())?;
        Ok(state.get(&id).filter(|doc| self.is_live(doc)).is_some())
    }

    async fn count(
        &self,
        filter: Option<Filter>,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        ensure_live(cancel, "count", T::type_name())?;
        Ok(state
            .values()
            .filter(|doc| self.is_live(doc))
            .filter(|doc| filter.as_ref().is_none_or(|f| f.matches(doc)))
            .count() as u64)
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
        if changes.is_empty() {
            return Ok(0);
        }
        for (field, _) in changes {
            ValidatedFieldName::new(field)?;
            if field == T::id_field() || Some(field.as_str()) == T::deleted_flag_field() {
                return Err(StoreError::invalid_argument(
                    "update_fields",
                    T::type_name(),
                    format!("field '{field}' cannot be bulk-updated"),
                ));
            }
        }
        let mut state = self.state.lock().await;
        ensure_live(cancel, "update_fields", T::type_name())?;
        let snapshot = state.clone();
        let mut changed = 0_u64;
        for doc in state.values_mut() {
            if !self.is_live(doc) || !filter.as_ref().is_none_or(|f| f.matches(doc)) {
                continue;
            }
            if let Value::Object(map) = doc {
                for (field, value) in changes {
                    map.insert(field.clone(), value.clone());
                }
                changed += 1;
            }
        }
        if changed == 0 {
            return Ok(0);
        }
        if let Err(e) = self.flush(&state).await {
            *state = snapshot;
            return Err(e);
        }
        Ok(changed)
    }

    async fn select_fields(
        &self,
        filter: Option<Filter>,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, StoreError> {
        if fields.is_empty() {
            return Err(StoreError::invalid_argument(
                "select_fields",
                T::type_name(),
                "at least one field is required",
            ));
        }
        for field in fields {
            ValidatedFieldName::new(field)?;
        }
        let state = self.state.lock().await;
        ensure_live(cancel, "select_fields", T::type_name())?;
        Ok(state
            .values()
            .filter(|doc| self.is_live(doc))
            .filter(|doc| filter.as_ref().is_none_or(|f| f.matches(doc)))
            .map(|doc| {
                let mut projected = serde_json::Map::with_capacity(fields.len());
                for field in fields {
                    projected.insert(
                        field.clone(),
                        doc.get(field).cloned().unwrap_or(Value::Null),
                    );
                }
                Value::Object(projected)
            })
            .collect())
    }

    fn stream(&self, cancel: CancellationToken) -> BoxStream<'static, Result<T, StoreError>> {
        let state = Arc::clone(&self.state);
        let repo = self.clone();
        let stream = futures::stream::once(async move {
            let guard = state.lock().await;
            let docs: Vec<Value> = guard
                .values()
                .filter(|doc| repo.is_live(doc))
                .cloned()
                .collect();
            drop(guard);
            futures::stream::iter(docs.into_iter().map(move |doc| {
                if cancel.is_cancelled() {
                    return Err(StoreError::cancelled("stream", T::type_name()));
                }
                repo.hydrate(&doc)
            }))
        })
        .flatten();
        Box::pin(stream)
    }

    async fn get_by_id_any(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        let state = self.state.lock().await;
        ensure_live(cancel, "get_by_id_any", T::type_name())?;
        state.get(&id).map(|doc| self.hydrate(doc)).transpose()
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        actor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        if !T::soft_delete_capable() {
            return Ok(None);
        }
        let mut state = self.state.lock().await;
        ensure_live(cancel, "soft_delete", T::type_name())?;
        let Some(previous) = state.get(&id).cloned() else {
            return Ok(None);
        };
        let mut entity = self.hydrate(&previous)?;
        if entity.is_deleted() {
            return Ok(Some(entity));
        }
        entity.set_deletion_stamp(Some(DeletionStamp::new(Utc::now(), actor)));
        state.insert(id, self.to_doc(&entity)?);
        if let Err(e) = self.flush(&state).await {
            state.insert(id, previous);
            return Err(e);
        }
        Ok(Some(entity))
    }

    async fn restore(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        if !T::soft_delete_capable() {
            return Ok(None);
        }
        let mut state = self.state.lock().await;
        ensure_live(cancel, "restore", T::type_name())?;
        let Some(previous) = state.get(&id).cloned() else {
            return Ok(None);
        };
        let mut entity = self.hydrate(&previous)?;
        entity.set_deletion_stamp(None);
        state.insert(id, self.to_doc(&entity)?);
        if let Err(e) = self.flush(&state).await {
            state.insert(id, previous);
            return Err(e);
        }
        Ok(Some(entity))
    }
}
