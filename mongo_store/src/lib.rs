//! MongoDB provider for the polystore repository layer
//!
//! Each entity type maps to one collection named by the shared policy. The
//! identifier is stored as the `_id` field in the UUID's hyphenated string
//! form rather than an ObjectId or binary UUID, keeping identifiers portable
//! across providers. Filter predicates translate to BSON filter documents.

pub mod context;
pub mod filter;
pub mod repository;

pub use context::MongoContext;
pub use repository::MongoRepository;

// Re-export the driver for callers that need raw collection access
pub use mongodb;
