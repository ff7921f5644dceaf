use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, info};

use ragdb_core::traits::{Embedder, VectorIndex};
use ragdb_core::types::{DocId, Document, SearchHit, SourceKind};

use crate::store::{self, StoredVectors, VectorEntry};

const EMBED_BATCH: usize = 64;

/// Exact cosine search over every stored vector.
///
/// Entries keep their insertion position; re-inserting an id overwrites it in
/// place. Vectors are reused whenever a document's content hash is already
/// present, so unchanged chunks are never embedded twice.
pub struct FlatVectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<VectorEntry>,
    by_id: HashMap<DocId, usize>,
    show_progress: bool,
}

impl FlatVectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder, entries: Vec::new(), by_id: HashMap::new(), show_progress: false }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Restore from `dir`; the stored vectors must come from the same embedder.
    pub fn open(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let stored = store::read(dir)?;
        if stored.embedder_id != embedder.embedder_id() {
            bail!("vector index was built with `{}`, refusing to load it with `{}`", stored.embedder_id, embedder.embedder_id());
        }
        let mut index = Self::new(embedder);
        for entry in stored.entries {
            if index.by_id.insert(entry.id.clone(), index.entries.len()).is_some() {
                bail!("duplicate id `{}` in vector store", entry.id);
            }
            index.entries.push(entry);
        }
        debug!(dir = %dir.display(), entries = index.entries.len(), "vector index loaded");
        Ok(index)
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn embedder_id(&self) -> &str { self.embedder.embedder_id() }

    pub async fn upsert(&mut self, documents: &[Document]) -> Result<()> {
        let wanted: HashSet<&str> = documents.iter().map(|d| d.hash.as_str()).collect();
        let mut vectors: HashMap<String, Vec<f32>> = HashMap::new();
        for e in &self.entries {
            if wanted.contains(e.hash.as_str()) && !vectors.contains_key(&e.hash) { vectors.insert(e.hash.clone(), e.vector.clone()); }
        }

        let mut missing: Vec<&Document> = Vec::new();
        let mut queued = HashSet::new();
        for d in documents {
            if !vectors.contains_key(&d.hash) && queued.insert(d.hash.as_str()) { missing.push(d); }
        }
        let reused = documents.len() - missing.len();

        let fresh = self.embed_documents(&missing).await?;
        let embedded = fresh.len();
        for (d, v) in missing.iter().zip(fresh) { vectors.insert(d.hash.clone(), v); }

        for d in documents {
            let Some(vector) = vectors.get(&d.hash).cloned() else { bail!("no vector computed for `{}`", d.id) };
            let entry = VectorEntry { id: d.id.clone(), hash: d.hash.clone(), vector };
            match self.by_id.get(&d.id) {
                Some(&pos) => self.entries[pos] = entry,
                None => {
                    self.by_id.insert(d.id.clone(), self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
        info!(documents = documents.len(), embedded, reused, total = self.entries.len(), "vector index updated");
        Ok(())
    }

    async fn embed_documents(&self, documents: &[&Document]) -> Result<Vec<Vec<f32>>> {
        if documents.is_empty() { return Ok(Vec::new()); }
        let pb = if self.show_progress { ProgressBar::new(documents.len() as u64) } else { ProgressBar::with_draw_target(Some(documents.len() as u64), ProgressDrawTarget::hidden()) };
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}") {
            pb.set_style(style.progress_chars("#>-"));
        }
        let mut out = Vec::with_capacity(documents.len());
        for batch in documents.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != texts.len() { bail!("embedder returned {} vectors for {} texts", vectors.len(), texts.len()); }
            out.extend(vectors);
            pb.inc(batch.len() as u64);
        }
        pb.finish_with_message("embedded");
        Ok(out)
    }

    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        if self.entries.is_empty() || k == 0 || text.trim().is_empty() { return Ok(Vec::new()); }
        let query = self.embedder.embed_batch(&[text.to_string()]).await?.into_iter().next().unwrap_or_default();
        let q_norm = norm(&query);
        let mut scored: Vec<(usize, f32)> = self.entries.iter().enumerate().map(|(i, e)| (i, cosine(&query, q_norm, &e.vector))).collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| self.entries[a.0].id.cmp(&self.entries[b.0].id)));
        scored.truncate(k);
        Ok(scored.into_iter().map(|(i, score)| SearchHit { id: self.entries[i].id.clone(), score, source: SourceKind::Vector }).collect())
    }

    fn stored(&self) -> StoredVectors {
        let dim = self.entries.first().map(|e| e.vector.len()).unwrap_or_else(|| self.embedder.dim());
        StoredVectors::new(self.embedder.embedder_id(), dim, self.entries.clone())
    }
}

fn norm(v: &[f32]) -> f32 { v.iter().map(|x| x * x).sum::<f32>().sqrt() }

fn cosine(q: &[f32], q_norm: f32, v: &[f32]) -> f32 {
    let denom = q_norm * norm(v);
    if denom <= f32::EPSILON || q.len() != v.len() { return 0.0; }
    q.iter().zip(v).map(|(a, b)| a * b).sum::<f32>() / denom
}

#[async_trait]
impl VectorIndex for FlatVectorIndex {
    async fn insert(&mut self, documents: &[Document]) -> Result<()> { self.upsert(documents).await }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> { self.search(text, k).await }

    fn persist(&self, dir: &Path) -> Result<()> { store::write(dir, &self.stored()) }

    fn document_ids(&self) -> Vec<DocId> { self.entries.iter().map(|e| e.id.clone()).collect() }
}
