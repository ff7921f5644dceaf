//! ragdb-vector
//!
//! Reference dense index: exact cosine search over embeddings kept in memory
//! and persisted as `vectors.json`.

pub mod index;
pub mod service;
pub mod store;

pub use index::FlatVectorIndex;
pub use service::FlatVectorService;
pub use store::{VectorEntry, VECTORS_FILE};
