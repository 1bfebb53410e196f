//! Extended repository contract

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use uuid::Uuid;

use crate::entity::Entity;
use crate::errors::StoreError;
use crate::query::Filter;
use crate::traits::repository::EntityRepository;
use crate::CancellationToken;

/// What a provider can actually do, declared up front so callers branch on
/// capability instead of discovering limits through runtime failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Multi-entity operations commit or fail as a unit
    pub transactions: bool,
    /// Updates persist a minimal diff rather than the full record
    pub change_tracking: bool,
}

/// Richer surface for providers that support it: existence/count checks,
/// audit-stamped writes, bulk field updates, projection, streaming
/// enumeration and the soft-delete lifecycle.
#[async_trait]
pub trait ExtendedEntityRepository<T: Entity>: EntityRepository<T> {
    fn capabilities(&self) -> Capabilities;

    async fn exists(&self, id: Uuid, cancel: &CancellationToken) -> Result<bool, StoreError>;

    /// Count entities matching the filter (all live entities when `None`).
    async fn count(
        &self,
        filter: Option<Filter>,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError>;

    /// [`create`](EntityRepository::create) with creation audit fields
    /// stamped first. A no-op passthrough for types without the capability.
    async fn create_audited(
        &self,
        entity: T,
        actor: &str,
        cancel: &CancellationToken,
    ) -> Result<T, StoreError>;

    /// [`update`](EntityRepository::update) with modification audit fields
    /// stamped first.
    async fn update_audited(
        &self,
        entity: T,
        actor: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError>;

    /// Set the given top-level fields on every entity matching the filter
    /// without loading them; returns the number of entities changed.
    async fn update_fields(
        &self,
        filter: Option<Filter>,
        changes: &[(String, Value)],
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError>;

    /// Project the requested fields of every matching entity to JSON objects.
    async fn select_fields(
        &self,
        filter: Option<Filter>,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, StoreError>;

    /// Enumerate all live entities without materializing the full set.
    /// Providers fetch in identifier-ordered chunks; the stream ends early
    /// with [`StoreError::Cancelled`] once the token fires.
    fn stream(&self, cancel: CancellationToken) -> BoxStream<'static, Result<T, StoreError>>;

    /// Read bypassing the standing soft-delete filter.
    async fn get_by_id_any(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError>;

    /// Mark the entity deleted and stamp deletion metadata. On an entity
    /// type without the soft-delete capability this is a no-op returning
    /// `Ok(None)`, not an error.
    async fn soft_delete(
        &self,
        id: Uuid,
        actor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError>;

    /// Reverse a soft deletion, clearing the deletion metadata.
    async fn restore(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError>;
}
