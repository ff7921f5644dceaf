use std::path::Path;

use async_trait::async_trait;

use crate::embed_config::EmbeddingConfig;
use crate::types::{DocId, Document, RankedResult, SearchHit};

/// Turns text into fixed-size vectors. Implementations talk to an embedding
/// service or compute deterministic stand-ins.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `ollama:mxbai-embed-large`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Factory side of the dense index collaborator.
#[async_trait]
pub trait VectorIndexService: Send + Sync {
    async fn build(&self, documents: &[Document], embed: &EmbeddingConfig) -> anyhow::Result<Box<dyn VectorIndex>>;
    async fn load(&self, dir: &Path, embed: &EmbeddingConfig) -> anyhow::Result<Box<dyn VectorIndex>>;
}

/// Handle to a built dense index.
///
/// `insert` replaces entries whose id already exists.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn insert(&mut self, documents: &[Document]) -> anyhow::Result<()>;
    async fn query(&self, text: &str, k: usize) -> anyhow::Result<Vec<SearchHit>>;
    fn persist(&self, dir: &Path) -> anyhow::Result<()>;
    fn document_ids(&self) -> Vec<DocId>;
}

/// Anything that answers a text query with resolved, ranked documents.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;
    async fn retrieve(&self, query: &str, k: usize) -> crate::Result<Vec<RankedResult>>;
}

/// Second-stage scorer applied to an already fused candidate list.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;
    /// At most `top_n` of `candidates`, best first, scored by the reranker.
    async fn rerank(&self, query: &str, candidates: Vec<RankedResult>, top_n: usize) -> anyhow::Result<Vec<RankedResult>>;
}

/// Where the corpus-wide embedding configuration lives.
pub trait EmbeddingConfigStore {
    fn save(&self, config: &EmbeddingConfig) -> crate::Result<()>;
    fn load(&self) -> crate::Result<Option<EmbeddingConfig>>;
}
