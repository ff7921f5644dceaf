#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod data_processor;
pub mod docstore;
pub mod embed_config;
pub mod error;
pub mod traits;
pub mod types;

pub use docstore::DocumentStore;
pub use embed_config::{EmbeddingConfig, EmbeddingProvider};
pub use error::{Error, Result};
pub use types::{DocId, Document, Meta, RankedResult, SearchHit, SourceKind};
