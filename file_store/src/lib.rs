//! Embedded document-store provider for the polystore repository layer
//!
//! One JSON file per collection under a configured directory; the documents
//! are held in memory and every access is serialized through a single mutex
//! per repository instance, one in-flight operation at a time against that
//! collection handle. Mutations rewrite the file through a temp-file rename
//! so no partially written state ever becomes visible.

pub mod repository;
pub mod store;

pub use repository::FileRepository;
pub use store::FileStore;
