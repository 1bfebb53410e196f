//! Repository contracts
//!
//! One CRUD + query surface regardless of storage technology. Providers
//! implement [`EntityRepository`] for every entity type and
//! [`ExtendedEntityRepository`] where the richer surface is supported.

pub mod extended;
pub mod repository;

pub use extended::{Capabilities, ExtendedEntityRepository};
pub use repository::EntityRepository;
