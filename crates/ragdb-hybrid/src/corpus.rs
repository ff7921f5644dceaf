//! A committed generation loaded into memory.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use ragdb_core::config::RetrievalSettings;
use ragdb_core::docstore::DocumentStore;
use ragdb_core::embed_config::{EmbeddingConfig, JsonEmbeddingConfigStore};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::{EmbeddingConfigStore, VectorIndex, VectorIndexService};
use ragdb_core::types::DocId;
use ragdb_text::LexicalIndex;

use crate::fusion::{DenseRetriever, FusionRetriever};
use crate::layout::Generation;

/// Owned, mutable view used by the indexer while it merges a batch.
pub struct CorpusState {
    pub embedding: EmbeddingConfig,
    pub docstore: DocumentStore,
    pub lexical: LexicalIndex,
    pub vector: Box<dyn VectorIndex>,
}

impl CorpusState {
    pub async fn load(generation: &Generation, vectors: &dyn VectorIndexService, cn_stopwords: Arc<HashSet<String>>) -> Result<Self> {
        let paths = &generation.paths;
        paths.check_complete()?;
        let embedding = JsonEmbeddingConfigStore::in_dir(paths.dir())
            .load()?
            .ok_or_else(|| Error::CorruptIndex(format!("no embedding configuration in {}", paths.dir().display())))?;
        let docstore = DocumentStore::load(&paths.docstore())?;
        let lexical = LexicalIndex::load_with_stopwords(&paths.bm25(), cn_stopwords)?;
        // A configuration the embedder rejects is not damage to the generation.
        let vector = vectors.load(&paths.vector(), &embedding).await.map_err(|e| match Error::from_anyhow(e) {
            err if err.is_rejected_request() => err,
            err => Error::CorruptIndex(format!("vector index in {}: {:#}", paths.vector().display(), err)),
        })?;
        let state = Self { embedding, docstore, lexical, vector };
        state.check_consistency()?;
        Ok(state)
    }

    /// Every structure must hold exactly the document store's id set.
    pub fn check_consistency(&self) -> Result<()> {
        let expected = self.docstore.ids();
        let lexical = self.lexical.document_ids();
        if lexical != expected {
            return Err(Error::CorruptIndex(describe_divergence("lexical index", &expected, &lexical)));
        }
        let vector: BTreeSet<DocId> = self.vector.document_ids().into_iter().collect();
        if vector != expected {
            return Err(Error::CorruptIndex(describe_divergence("vector index", &expected, &vector)));
        }
        Ok(())
    }
}

fn describe_divergence(what: &str, expected: &BTreeSet<DocId>, actual: &BTreeSet<DocId>) -> String {
    let missing = expected.difference(actual).count();
    let extra = actual.difference(expected).count();
    format!("{what} disagrees with the document store ({missing} missing, {extra} unknown)")
}

/// Read-only snapshot served to queries.
pub struct Corpus {
    pub generation: Generation,
    pub embedding: EmbeddingConfig,
    pub docstore: Arc<DocumentStore>,
    pub lexical: Arc<LexicalIndex>,
    pub vector: Arc<dyn VectorIndex>,
}

impl Corpus {
    pub fn new(generation: Generation, state: CorpusState) -> Self {
        Self {
            generation,
            embedding: state.embedding,
            docstore: Arc::new(state.docstore),
            lexical: Arc::new(state.lexical),
            vector: Arc::from(state.vector),
        }
    }

    pub fn len(&self) -> usize { self.docstore.len() }

    pub fn is_empty(&self) -> bool { self.docstore.is_empty() }

    /// Dense and lexical retrievers over this snapshot, weighted per `settings`.
    pub fn fusion(&self, settings: &RetrievalSettings) -> FusionRetriever {
        let dense = DenseRetriever::new(Arc::clone(&self.vector), Arc::clone(&self.docstore));
        FusionRetriever::new(settings.candidate_k)
            .with_retriever(Arc::new(dense), settings.dense_weight)
            .with_retriever(self.lexical.clone(), settings.lexical_weight)
    }
}
