//! Build-or-insert orchestration over the three corpus structures.
//!
//! The indexer is the only writer of a persistence root. Every run ends in a
//! single generation commit, or in no change at all.

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use ragdb_core::config::MismatchPolicy;
use ragdb_core::docstore::DocumentStore;
use ragdb_core::embed_config::{EmbeddingConfig, JsonEmbeddingConfigStore};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::{EmbeddingConfigStore, VectorIndexService};
use ragdb_core::types::Document;
use ragdb_text::{builtin_cn_stopwords, LexicalIndex, RetrieverSettings};

use crate::corpus::{Corpus, CorpusState};
use crate::layout::{Generation, PersistLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Build,
    Insert,
}

/// What an indexing run did.
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub mode: IndexMode,
    /// Configuration the vectors were actually produced with.
    pub embedding: EmbeddingConfig,
    /// Documents in the batch.
    pub documents: usize,
    /// Existing ids overwritten by the batch.
    pub replaced: usize,
    /// Documents in the corpus after the run.
    pub total: usize,
    pub config_downgraded: bool,
    pub warnings: Vec<String>,
    pub generation: u64,
}

pub struct IncrementalIndexer {
    layout: PersistLayout,
    vectors: Arc<dyn VectorIndexService>,
    text: RetrieverSettings,
    cn_stopwords: Arc<HashSet<String>>,
    mismatch_policy: MismatchPolicy,
}

impl IncrementalIndexer {
    pub fn new(root: impl Into<PathBuf>, vectors: Arc<dyn VectorIndexService>) -> Self {
        Self {
            layout: PersistLayout::new(root),
            vectors,
            text: RetrieverSettings::default(),
            cn_stopwords: builtin_cn_stopwords(),
            mismatch_policy: MismatchPolicy::default(),
        }
    }

    pub fn with_text_settings(mut self, text: RetrieverSettings) -> Self {
        self.text = text;
        self
    }

    pub fn with_stopwords(mut self, cn_stopwords: Arc<HashSet<String>>) -> Self {
        self.cn_stopwords = cn_stopwords;
        self
    }

    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }

    pub fn layout(&self) -> &PersistLayout { &self.layout }

    pub fn mode(&self) -> Result<IndexMode> {
        Ok(if self.layout.has_corpus()? { IndexMode::Insert } else { IndexMode::Build })
    }

    /// Index `documents` with the requested embedding configuration. Nothing is
    /// visible on disk until every artifact of the new state has been written.
    #[instrument(skip_all, fields(documents = documents.len(), embed_model = %requested.embed_model))]
    pub async fn index(&self, documents: Vec<Document>, requested: &EmbeddingConfig, cancel: &CancellationToken) -> Result<IndexOutcome> {
        requested.provider()?;
        match self.layout.current()? {
            None => self.build(documents, requested, cancel).await,
            Some(generation) => self.insert(generation, documents, requested, cancel).await,
        }
    }

    async fn build(&self, documents: Vec<Document>, requested: &EmbeddingConfig, cancel: &CancellationToken) -> Result<IndexOutcome> {
        info!(documents = documents.len(), "no committed corpus, building a new one");
        let docstore = DocumentStore::from_documents(documents.iter().cloned());
        let replaced = documents.len() - docstore.len();
        let lexical = self.tokenize_new(documents.clone(), cancel).await?;
        let vector = cancellable(cancel, self.vectors.build(&documents, requested)).await?;

        let state = CorpusState { embedding: requested.clone(), docstore, lexical, vector };
        let generation = self.commit(&state, cancel)?;
        Ok(IndexOutcome {
            mode: IndexMode::Build,
            embedding: state.embedding,
            documents: documents.len(),
            replaced,
            total: state.docstore.len(),
            config_downgraded: false,
            warnings: Vec::new(),
            generation: generation.number,
        })
    }

    async fn insert(
        &self,
        current: Generation,
        documents: Vec<Document>,
        requested: &EmbeddingConfig,
        cancel: &CancellationToken,
    ) -> Result<IndexOutcome> {
        let mut state = CorpusState::load(&current, self.vectors.as_ref(), Arc::clone(&self.cn_stopwords)).await?;

        let mut warnings = Vec::new();
        let config_downgraded = &state.embedding != requested;
        if config_downgraded {
            let message = format!(
                "requested embedding model `{}` differs from the corpus model `{}`; keeping `{}`",
                requested.embed_model, state.embedding.embed_model, state.embedding.embed_model
            );
            if self.mismatch_policy == MismatchPolicy::Reject {
                return Err(Error::InvalidConfig(message));
            }
            warn!(requested = ?requested, stored = ?state.embedding, "embedding configuration mismatch, using the stored one");
            warnings.push(message);
        }

        if documents.is_empty() {
            info!(generation = current.number, "empty batch, nothing to commit");
            return Ok(IndexOutcome {
                mode: IndexMode::Insert,
                total: state.docstore.len(),
                embedding: state.embedding,
                documents: 0,
                replaced: 0,
                config_downgraded,
                warnings,
                generation: current.number,
            });
        }

        let replaced = state.docstore.add(documents.iter().cloned());
        state.lexical = self.tokenize_into(state.lexical, documents.clone(), cancel).await?;
        cancellable(cancel, state.vector.insert(&documents)).await?;

        // Old generations and abandoned staging directories go before the
        // merged state is written.
        self.layout.prune_stale()?;
        let generation = self.commit(&state, cancel)?;
        info!(generation = generation.number, added = documents.len(), replaced, total = state.docstore.len(), "corpus updated");
        Ok(IndexOutcome {
            mode: IndexMode::Insert,
            documents: documents.len(),
            replaced,
            total: state.docstore.len(),
            embedding: state.embedding,
            config_downgraded,
            warnings,
            generation: generation.number,
        })
    }

    async fn tokenize_new(&self, documents: Vec<Document>, cancel: &CancellationToken) -> Result<LexicalIndex> {
        let settings = self.text.clone();
        let stopwords = Arc::clone(&self.cn_stopwords);
        let token = cancel.clone();
        run_blocking(move || LexicalIndex::build_cancellable(documents, settings, stopwords, &token)).await
    }

    async fn tokenize_into(&self, mut lexical: LexicalIndex, documents: Vec<Document>, cancel: &CancellationToken) -> Result<LexicalIndex> {
        let token = cancel.clone();
        run_blocking(move || {
            lexical.insert_cancellable(documents, &token)?;
            Ok(lexical)
        })
        .await
    }

    /// Write every artifact into a staging directory, then swap it in.
    fn commit(&self, state: &CorpusState, cancel: &CancellationToken) -> Result<Generation> {
        state.check_consistency()?;
        let staging = self.layout.stage()?;
        let paths = staging.paths();
        state.lexical.persist(&paths.bm25())?;
        state.docstore.persist(&paths.docstore())?;
        state.vector.persist(&paths.vector())?;
        JsonEmbeddingConfigStore::in_dir(paths.dir()).save(&state.embedding)?;
        paths.check_complete()?;
        if cancel.is_cancelled() { return Err(Error::Cancelled); }
        self.layout.commit(staging)
    }

    /// Load the live generation, if any.
    pub async fn load_corpus(&self) -> Result<Option<Corpus>> {
        let Some(generation) = self.layout.current()? else { return Ok(None) };
        let state = CorpusState::load(&generation, self.vectors.as_ref(), Arc::clone(&self.cn_stopwords)).await?;
        Ok(Some(Corpus::new(generation, state)))
    }

    pub fn clear(&self) -> Result<()> { self.layout.clear() }
}

async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = anyhow::Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res.map_err(Error::from_anyhow),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| Error::Operation(format!("tokenizer task failed: {e}")))?
}
