//! PostgreSQL provider for the polystore repository layer
//!
//! Entities live one table per type: the serialized entity as a `doc` JSONB
//! column plus mirrored identifier, audit and soft-delete columns. Filter
//! predicates translate to parameterized SQL over the document column;
//! values are always bound, never interpolated.

pub mod context;
pub mod repository;
pub mod sql;
pub mod transaction;

pub use context::PgContext;
pub use repository::PgRepository;
pub use transaction::PgTransaction;
