use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ragdb_core::config::{resolve_with_base, RetrievalSettings, Settings};
use ragdb_core::embed_config::EmbeddingConfig;
use ragdb_core::error::Result;
use ragdb_core::traits::{Reranker, VectorIndexService};
use ragdb_core::types::{Document, RankedResult};
use ragdb_embed::VoyageReranker;
use ragdb_text::{builtin_cn_stopwords, load_cn_stopwords, RetrieverSettings};
use ragdb_vector::FlatVectorService;

use crate::corpus::Corpus;
use crate::indexer::{IncrementalIndexer, IndexOutcome};

#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub root: PathBuf,
    pub generation: Option<u64>,
    pub documents: usize,
    pub embedding: Option<EmbeddingConfig>,
}

/// Indexing and retrieval over one persistence root.
///
/// Queries run against a shared snapshot of the live generation; the snapshot
/// is swapped after every commit and whenever `CURRENT` moved underneath us.
pub struct HybridSearchEngine {
    indexer: IncrementalIndexer,
    retrieval: RetrievalSettings,
    reranker: Option<Arc<dyn Reranker>>,
    snapshot: RwLock<Option<Arc<Corpus>>>,
}

impl HybridSearchEngine {
    pub fn new(indexer: IncrementalIndexer, retrieval: RetrievalSettings) -> Self {
        Self { indexer, retrieval, reranker: None, snapshot: RwLock::new(None) }
    }

    /// Used when `retrieval.rerank_top_n` is set.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Engine for `settings`; relative paths resolve against `base`.
    pub fn from_settings(settings: &Settings, base: &Path) -> Result<Self> {
        let root = resolve_with_base(base, &settings.data.persist_dir);
        let stopwords = match &settings.text.cn_stopwords_path {
            Some(p) => load_cn_stopwords(&resolve_with_base(base, p))?,
            None => builtin_cn_stopwords(),
        };
        let vectors: Arc<dyn VectorIndexService> =
            Arc::new(FlatVectorService::new().with_base_url(settings.embedding.base_url.clone()).with_progress(true));
        let indexer = IncrementalIndexer::new(root, vectors)
            .with_text_settings(RetrieverSettings::from(&settings.text))
            .with_stopwords(stopwords)
            .with_mismatch_policy(settings.retrieval.mismatch_policy);
        let engine = Self::new(indexer, settings.retrieval.clone());
        if settings.retrieval.rerank_top_n.is_none() || ragdb_embed::use_fake_embeddings() {
            return Ok(engine);
        }
        let api_key = settings.retrieval.rerank_api_key.as_deref().unwrap_or(&settings.embedding.api_key);
        let reranker = VoyageReranker::new(api_key, &settings.retrieval.rerank_model, None)?;
        info!(model = reranker.model(), "reranking enabled");
        Ok(engine.with_reranker(Arc::new(reranker)))
    }

    pub fn indexer(&self) -> &IncrementalIndexer { &self.indexer }

    pub fn retrieval_settings(&self) -> &RetrievalSettings { &self.retrieval }

    pub async fn index(&self, documents: Vec<Document>, requested: &EmbeddingConfig, cancel: &CancellationToken) -> Result<IndexOutcome> {
        let outcome = self.indexer.index(documents, requested, cancel).await?;
        // The commit already landed; a failed reload only drops the snapshot so
        // the next query loads it again.
        if let Err(err) = self.refresh().await {
            warn!(generation = outcome.generation, error = %err, "committed generation could not be loaded, snapshot dropped");
            *self.snapshot.write() = None;
        }
        Ok(outcome)
    }

    /// Top `k` fused results; empty when no corpus has been built yet.
    pub async fn retrieve(&self, query: &str, k: usize, cancel: &CancellationToken) -> Result<Vec<RankedResult>> {
        let Some(corpus) = self.snapshot().await? else {
            debug!("no corpus yet, nothing to retrieve");
            return Ok(Vec::new());
        };
        let mut fusion = corpus.fusion(&self.retrieval);
        if let (Some(reranker), Some(top_n)) = (&self.reranker, self.retrieval.rerank_top_n) {
            fusion = fusion.with_reranker(Arc::clone(reranker), top_n);
        }
        fusion.retrieve_cancellable(query, k, cancel).await
    }

    pub fn clear(&self) -> Result<()> {
        self.indexer.clear()?;
        *self.snapshot.write() = None;
        Ok(())
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let corpus = self.snapshot().await?;
        Ok(EngineStatus {
            root: self.indexer.layout().root().to_path_buf(),
            generation: corpus.as_ref().map(|c| c.generation.number),
            documents: corpus.as_ref().map(|c| c.len()).unwrap_or(0),
            embedding: corpus.as_ref().map(|c| c.embedding.clone()),
        })
    }

    /// The live snapshot, reloaded when `CURRENT` points somewhere new.
    pub async fn snapshot(&self) -> Result<Option<Arc<Corpus>>> {
        let live = self.indexer.layout().current()?.map(|g| g.number);
        let cached = self.snapshot.read().clone();
        match (cached, live) {
            (_, None) => {
                *self.snapshot.write() = None;
                Ok(None)
            }
            (Some(c), Some(n)) if c.generation.number == n => Ok(Some(c)),
            _ => self.refresh().await,
        }
    }

    async fn refresh(&self) -> Result<Option<Arc<Corpus>>> {
        let corpus = self.indexer.load_corpus().await?.map(Arc::new);
        if let Some(c) = &corpus { info!(generation = c.generation.number, documents = c.len(), "corpus snapshot loaded"); }
        *self.snapshot.write() = corpus.clone();
        Ok(corpus)
    }
}
