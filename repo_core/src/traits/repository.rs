//! Base repository contract

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::Entity;
use crate::errors::StoreError;
use crate::query::{Page, QueryParams};
use crate::CancellationToken;

/// Uniform asynchronous CRUD + query surface over one entity type.
///
/// Every operation accepts a cancellation token and fails with
/// [`StoreError::Cancelled`] before any write is acknowledged once the token
/// fires. Logical absence (update/delete/read target missing) is `Ok(None)`
/// or an empty collection, never an error.
///
/// For entity types with the soft-delete capability, default reads exclude
/// soft-deleted records whenever the provider is configured to enforce the
/// standing filter; the extended contract offers the explicit
/// include-deleted read path.
#[async_trait]
pub trait EntityRepository<T: Entity>: Send + Sync {
    /// Persist a new entity, assigning a fresh identifier when the entity
    /// carries the nil UUID. Returns the stored entity.
    async fn create(&self, entity: T, cancel: &CancellationToken) -> Result<T, StoreError>;

    /// Bulk insert. Returns the subset actually stored; whether the batch is
    /// atomic or best-effort is documented per provider.
    async fn create_many(
        &self,
        entities: Vec<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError>;

    /// Replace the stored entity with the same identifier. A nil identifier
    /// is an [`StoreError::InvalidArgument`] raised before any I/O; a missing
    /// record is `Ok(None)`.
    async fn update(&self, entity: T, cancel: &CancellationToken)
        -> Result<Option<T>, StoreError>;

    /// Per-item [`update`](Self::update) semantics, aggregated. Identifiers
    /// are validated for the whole batch before any I/O.
    async fn update_many(
        &self,
        entities: Vec<T>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError>;

    /// Hard delete. Returns the entity as it existed prior to deletion,
    /// `Ok(None)` if nothing matched.
    async fn delete(&self, id: Uuid, cancel: &CancellationToken)
        -> Result<Option<T>, StoreError>;

    /// Hard delete a set of identifiers; returns the entities that existed.
    async fn delete_many(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError>;

    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<T>, StoreError>;

    async fn get_by_id(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError>;

    async fn get_by_ids(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, StoreError>;

    /// Paged read honoring filter, sort and pagination. The total count is
    /// computed over the filtered set before the page slice is taken.
    async fn query(
        &self,
        params: QueryParams,
        cancel: &CancellationToken,
    ) -> Result<Page<T>, StoreError>;
}
