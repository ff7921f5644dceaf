//! BM25 lexical index over the mixed tokenizer.
//!
//! Postings are append-only: every inserted document gets the next ordinal and
//! its postings are pushed onto the per-term lists, so ordinals inside each
//! list stay ascending. Re-inserting an id tombstones the older ordinal.
//! Corpus statistics (live count, average length, document frequency) are
//! derived lazily on the first query after a change.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ragdb_core::config::TextSettings;
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Retriever;
use ragdb_core::types::{DocId, Document, RankedResult};

use crate::stopwords::builtin_cn_stopwords;
use crate::tokenizer::MixedTokenizer;

/// How many documents are tokenized between two cancellation checks.
const CANCEL_CHECK_EVERY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self { Self { k1: 1.5, b: 0.75 } }
}

/// Retriever parameters persisted next to the postings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieverSettings {
    pub similarity_top_k: usize,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub skip_stemming: bool,
}

impl Default for RetrieverSettings {
    fn default() -> Self { Self { similarity_top_k: 10, verbose: false, skip_stemming: false } }
}

impl From<&TextSettings> for RetrieverSettings {
    fn from(s: &TextSettings) -> Self {
        Self { similarity_top_k: s.similarity_top_k, verbose: s.verbose, skip_stemming: s.skip_stemming }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Posting {
    pub ord: u32,
    pub tf: u32,
}

#[derive(Debug)]
struct CorpusStats {
    live: usize,
    avgdl: f32,
    df: HashMap<String, u32>,
}

pub struct LexicalIndex {
    pub(crate) tokenizer: MixedTokenizer,
    pub(crate) settings: RetrieverSettings,
    pub(crate) params: Bm25Params,
    pub(crate) postings: HashMap<String, Vec<Posting>>,
    pub(crate) doc_lens: Vec<u32>,
    pub(crate) corpus: Vec<Document>,
    pub(crate) live: Vec<bool>,
    pub(crate) by_id: HashMap<DocId, u32>,
    stats: RwLock<Option<Arc<CorpusStats>>>,
}

impl LexicalIndex {
    /// An empty index using the built-in Chinese stopwords.
    pub fn new(settings: RetrieverSettings) -> Result<Self> { Self::with_stopwords(settings, builtin_cn_stopwords()) }

    pub fn with_stopwords(settings: RetrieverSettings, cn_stopwords: Arc<HashSet<String>>) -> Result<Self> {
        let tokenizer = MixedTokenizer::with_options(settings.skip_stemming, cn_stopwords)?;
        Ok(Self::from_parts(tokenizer, settings, Bm25Params::default()))
    }

    pub(crate) fn from_parts(tokenizer: MixedTokenizer, settings: RetrieverSettings, params: Bm25Params) -> Self {
        Self {
            tokenizer,
            settings,
            params,
            postings: HashMap::new(),
            doc_lens: Vec::new(),
            corpus: Vec::new(),
            live: Vec::new(),
            by_id: HashMap::new(),
            stats: RwLock::new(None),
        }
    }

    pub fn build(documents: Vec<Document>, settings: RetrieverSettings) -> Result<Self> {
        let mut index = Self::new(settings)?;
        index.insert(documents);
        Ok(index)
    }

    /// Like [`LexicalIndex::build`], but with a caller-provided tokenizer setup and
    /// a cancellation path for large corpora.
    pub fn build_cancellable(
        documents: Vec<Document>,
        settings: RetrieverSettings,
        cn_stopwords: Arc<HashSet<String>>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut index = Self::with_stopwords(settings, cn_stopwords)?;
        index.insert_cancellable(documents, cancel)?;
        Ok(index)
    }

    /// Append documents; returns how many existing ids were replaced.
    pub fn insert(&mut self, documents: impl IntoIterator<Item = Document>) -> usize {
        let mut replaced = 0;
        let mut added = 0;
        for doc in documents {
            let tokens = self.tokenizer.tokenize(&doc.text);
            if self.push(doc, &tokens) { replaced += 1; }
            added += 1;
        }
        self.invalidate_stats();
        self.log_insert(added, replaced);
        replaced
    }

    /// Tokenizes in the calling thread and checks `cancel` periodically. On
    /// cancellation nothing from this batch is applied.
    pub fn insert_cancellable(&mut self, documents: Vec<Document>, cancel: &CancellationToken) -> Result<usize> {
        let mut tokenized = Vec::with_capacity(documents.len());
        for (i, doc) in documents.into_iter().enumerate() {
            if i % CANCEL_CHECK_EVERY == 0 && cancel.is_cancelled() { return Err(Error::Cancelled); }
            let tokens = self.tokenizer.tokenize(&doc.text);
            tokenized.push((doc, tokens));
        }
        if cancel.is_cancelled() { return Err(Error::Cancelled); }

        let added = tokenized.len();
        let mut replaced = 0;
        for (doc, tokens) in tokenized {
            if self.push(doc, &tokens) { replaced += 1; }
        }
        self.invalidate_stats();
        self.log_insert(added, replaced);
        Ok(replaced)
    }

    fn push(&mut self, doc: Document, tokens: &[String]) -> bool {
        let ord = self.corpus.len() as u32;
        let replaced = match self.by_id.insert(doc.id.clone(), ord) {
            Some(old) => { self.live[old as usize] = false; true }
            None => false,
        };
        let mut tf: HashMap<&str, u32> = HashMap::new();
        for t in tokens { *tf.entry(t.as_str()).or_insert(0) += 1; }
        for (term, count) in tf {
            self.postings.entry(term.to_string()).or_default().push(Posting { ord, tf: count });
        }
        self.doc_lens.push(tokens.len() as u32);
        self.corpus.push(doc);
        self.live.push(true);
        replaced
    }

    fn log_insert(&self, added: usize, replaced: usize) {
        if self.settings.verbose {
            info!(added, replaced, live = self.len(), terms = self.postings.len(), "lexical index updated");
        } else {
            debug!(added, replaced, live = self.len(), "lexical index updated");
        }
    }

    fn invalidate_stats(&mut self) { *self.stats.get_mut() = None; }

    fn stats(&self) -> Arc<CorpusStats> {
        if let Some(stats) = self.stats.read().as_ref() { return Arc::clone(stats); }
        let computed = Arc::new(self.compute_stats());
        *self.stats.write() = Some(Arc::clone(&computed));
        computed
    }

    fn compute_stats(&self) -> CorpusStats {
        let mut live = 0usize;
        let mut total_len = 0u64;
        for (ord, alive) in self.live.iter().enumerate() {
            if *alive { live += 1; total_len += self.doc_lens[ord] as u64; }
        }
        let avgdl = if live == 0 { 0.0 } else { (total_len as f64 / live as f64) as f32 };
        let df = self
            .postings
            .iter()
            .filter_map(|(term, list)| {
                let n = list.iter().filter(|p| self.live[p.ord as usize]).count() as u32;
                (n > 0).then(|| (term.clone(), n))
            })
            .collect();
        CorpusStats { live, avgdl, df }
    }

    /// Top `min(k, live documents)` by BM25 score, ties by document id.
    pub fn query(&self, text: &str, k: usize) -> Vec<RankedResult> {
        let mut terms = self.tokenizer.tokenize(text);
        if terms.is_empty() || k == 0 { return Vec::new(); }
        let mut seen = HashSet::new();
        terms.retain(|t| seen.insert(t.clone()));

        let stats = self.stats();
        if stats.live == 0 { return Vec::new(); }
        let scores = self.score(&terms, &stats);

        let mut ranked: Vec<(u32, f32)> =
            (0..self.corpus.len() as u32).filter(|o| self.live[*o as usize]).map(|o| (o, scores[o as usize])).collect();
        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1).then_with(|| self.corpus[a.0 as usize].id.cmp(&self.corpus[b.0 as usize].id))
        });
        ranked.truncate(k.min(stats.live));
        ranked
            .into_iter()
            .map(|(ord, score)| RankedResult { document: self.corpus[ord as usize].clone(), score })
            .collect()
    }

    /// Query with the persisted `similarity_top_k`.
    pub fn query_default(&self, text: &str) -> Vec<RankedResult> { self.query(text, self.settings.similarity_top_k) }

    fn score(&self, terms: &[String], stats: &CorpusStats) -> Vec<f32> {
        let Bm25Params { k1, b } = self.params;
        let n = stats.live as f32;
        let avgdl = if stats.avgdl > 0.0 { stats.avgdl } else { 1.0 };
        let mut scores = vec![0.0f32; self.corpus.len()];
        for term in terms {
            let (Some(list), Some(&df)) = (self.postings.get(term), stats.df.get(term)) else { continue };
            let df = df as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for p in list.iter().filter(|p| self.live[p.ord as usize]) {
                let tf = p.tf as f32;
                let dl = self.doc_lens[p.ord as usize] as f32;
                scores[p.ord as usize] += idf * tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * dl / avgdl));
            }
        }
        scores
    }

    pub fn get(&self, id: &str) -> Option<&Document> { self.by_id.get(id).map(|o| &self.corpus[*o as usize]) }

    pub fn len(&self) -> usize { self.live.iter().filter(|l| **l).count() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn document_ids(&self) -> BTreeSet<DocId> { self.by_id.keys().cloned().collect() }

    /// Live documents in ordinal order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.corpus.iter().zip(&self.live).filter(|(_, l)| **l).map(|(d, _)| d)
    }

    pub fn settings(&self) -> &RetrieverSettings { &self.settings }

    pub fn params(&self) -> Bm25Params { self.params }

    pub fn tokenizer(&self) -> &MixedTokenizer { &self.tokenizer }
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("live", &self.len())
            .field("ordinals", &self.corpus.len())
            .field("terms", &self.postings.len())
            .field("settings", &self.settings)
            .finish()
    }
}

#[async_trait]
impl Retriever for LexicalIndex {
    fn name(&self) -> &str { "bm25" }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RankedResult>> { Ok(self.query(query, k)) }
}
