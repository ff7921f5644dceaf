//! ragdb-hybrid
//!
//! Keeps the document store, lexical index and vector index of a corpus in
//! step, persists them as one atomic generation, and answers queries by
//! fusing dense and lexical rankings.

pub mod corpus;
pub mod engine;
pub mod fusion;
pub mod indexer;
pub mod layout;

pub use corpus::Corpus;
pub use engine::{EngineStatus, HybridSearchEngine};
pub use fusion::{fuse, DenseRetriever, FusionRetriever};
pub use indexer::{IncrementalIndexer, IndexMode, IndexOutcome};
pub use layout::PersistLayout;
