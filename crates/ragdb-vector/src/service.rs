use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use ragdb_core::embed_config::EmbeddingConfig;
use ragdb_core::traits::{Embedder, VectorIndex, VectorIndexService};
use ragdb_core::types::Document;

use crate::index::FlatVectorIndex;

/// Builds and loads [`FlatVectorIndex`] handles. The embedder comes from the
/// embedding configuration unless one is pinned with [`FlatVectorService::with_embedder`].
#[derive(Default, Clone)]
pub struct FlatVectorService {
    base_url: Option<String>,
    pinned: Option<Arc<dyn Embedder>>,
    show_progress: bool,
}

impl FlatVectorService {
    pub fn new() -> Self { Self::default() }

    /// Endpoint override for the remote embedding provider.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Use `embedder` for every configuration.
    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self { Self { pinned: Some(embedder), ..Self::default() } }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn embedder(&self, embed: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
        if let Some(e) = &self.pinned { return Ok(Arc::clone(e)); }
        Ok(Arc::from(ragdb_embed::embedder_for(embed, self.base_url.as_deref())?))
    }
}

#[async_trait]
impl VectorIndexService for FlatVectorService {
    async fn build(&self, documents: &[Document], embed: &EmbeddingConfig) -> Result<Box<dyn VectorIndex>> {
        let embedder = self.embedder(embed)?;
        info!(embedder = embedder.embedder_id(), documents = documents.len(), "building vector index");
        let mut index = FlatVectorIndex::new(embedder).with_progress(self.show_progress);
        index.upsert(documents).await?;
        Ok(Box::new(index))
    }

    async fn load(&self, dir: &Path, embed: &EmbeddingConfig) -> Result<Box<dyn VectorIndex>> {
        let embedder = self.embedder(embed)?;
        Ok(Box::new(FlatVectorIndex::open(dir, embedder)?.with_progress(self.show_progress)))
    }
}
