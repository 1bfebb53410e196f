//! Convenience re-exports for common repo-core usage

pub use crate::entity::{AuditStamp, DeletionStamp, Entity};
pub use crate::errors::{ensure_live, StoreError};
pub use crate::naming::{NameCase, NamingPolicy};
pub use crate::query::{
    BoolOp, CompareOp, Filter, Page, QueryParams, SortClause, SortOrder,
};
pub use crate::traits::{Capabilities, EntityRepository, ExtendedEntityRepository};
pub use crate::validation::{ValidatedFieldName, ValidatedTableName, ValidationError};
pub use crate::CancellationToken;

// Common external dependencies that are frequently used alongside the traits
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use uuid::Uuid;
