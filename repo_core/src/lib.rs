//! Repo Core - shared contracts for the polystore repository layer
//!
//! This crate defines the storage-agnostic half of the repository layer:
//! the entity capability traits, the filter/sort/paging query model, the
//! repository contracts every provider implements, the naming policy used
//! to derive collection and table names, and the error taxonomy.

pub mod entity;
pub mod errors;
pub mod naming;
pub mod prelude;
pub mod query;
pub mod traits;
pub mod validation;

pub use entity::{AuditStamp, DeletionStamp, Entity};
pub use errors::StoreError;
pub use naming::{NameCase, NamingPolicy};
pub use query::{BoolOp, CompareOp, Filter, Page, QueryParams, SortClause, SortOrder};
pub use traits::{Capabilities, EntityRepository, ExtendedEntityRepository};
pub use validation::{ValidatedFieldName, ValidatedTableName, ValidationError};

// Cancellation is part of every repository operation signature; re-export the
// token so providers and callers agree on one type.
pub use tokio_util::sync::CancellationToken;
