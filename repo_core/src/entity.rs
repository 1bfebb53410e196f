//! Entity contracts
//!
//! Every persisted record implements [`Entity`]. Optional capabilities
//! (auditing, soft deletion) are declared through flag methods with
//! conservative defaults instead of runtime type inspection; providers read
//! the flags once at repository construction and cache the result.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

/// Creation or last-modification metadata for audit-capable entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub at: DateTime<Utc>,
    pub by: Option<String>,
}

impl AuditStamp {
    pub fn new(at: DateTime<Utc>, by: Option<&str>) -> Self {
        Self {
            at,
            by: by.map(str::to_string),
        }
    }
}

/// Deletion metadata carried by soft-deleted entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionStamp {
    pub at: DateTime<Utc>,
    pub by: Option<String>,
}

impl DeletionStamp {
    pub fn new(at: DateTime<Utc>, by: Option<&str>) -> Self {
        Self {
            at,
            by: by.map(str::to_string),
        }
    }
}

/// Trait every persisted record implements.
///
/// The identifier is a UUID, immutable once assigned and unique within a
/// collection or table. Entities serialize to a flat document whose field
/// names are what [`crate::Filter`] conditions and sort clauses refer to.
///
/// Capability methods default to "not capable". A type opting into soft
/// deletion overrides `soft_delete_capable`, `deleted_flag_field` and the
/// stamp accessors; a type opting into auditing overrides `audit_capable`
/// and the stamping methods. Types without a capability keep the no-op
/// defaults and are always physically deleted / never stamped.
pub trait Entity:
    Clone + Send + Sync + Debug + Serialize + DeserializeOwned + 'static
{
    fn id(&self) -> Uuid;

    fn set_id(&mut self, id: Uuid);

    /// Singular type name fed to the naming policy, e.g. `"Article"`.
    fn type_name() -> &'static str;

    /// Name of the serialized identifier field. Providers rely on this to
    /// map the identifier onto the store's native primary key.
    fn id_field() -> &'static str {
        "id"
    }

    /// Whether this entity participates in soft deletion.
    fn soft_delete_capable() -> bool {
        false
    }

    /// Serialized field carrying the deleted flag, used for standing filters.
    fn deleted_flag_field() -> Option<&'static str> {
        None
    }

    fn is_deleted(&self) -> bool {
        false
    }

    fn deletion_stamp(&self) -> Option<DeletionStamp> {
        None
    }

    /// Set (`Some`) or clear (`None`) the deletion state. No-op on types
    /// without the capability.
    fn set_deletion_stamp(&mut self, _stamp: Option<DeletionStamp>) {}

    /// Whether this entity carries audit metadata.
    fn audit_capable() -> bool {
        false
    }

    fn created_stamp(&self) -> Option<AuditStamp> {
        None
    }

    fn modified_stamp(&self) -> Option<AuditStamp> {
        None
    }

    fn stamp_created(&mut self, _actor: Option<&str>, _at: DateTime<Utc>) {}

    fn stamp_modified(&mut self, _actor: Option<&str>, _at: DateTime<Utc>) {}
}
