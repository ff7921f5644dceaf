//! Weighted rank fusion across retrievers.
//!
//! Raw scores of different retrievers are not comparable, so each list only
//! contributes through rank: the document at 0-based rank `r` of a list of
//! length `n` earns `w * (1 - r / n)`, with the weights normalized to sum to 1.
//! Contributions of the same id are summed. Ties go to the document with the
//! better best rank, then to the earlier registered retriever. An optional
//! reranker then rescores the fused list and keeps its own top `n`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use ragdb_core::config::RetrievalSettings;
use ragdb_core::docstore::DocumentStore;
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::{Reranker, Retriever, VectorIndex};
use ragdb_core::types::{DocId, RankedResult};

/// Resolves dense hits against the shared document store.
pub struct DenseRetriever {
    index: Arc<dyn VectorIndex>,
    docs: Arc<DocumentStore>,
}

impl DenseRetriever {
    pub fn new(index: Arc<dyn VectorIndex>, docs: Arc<DocumentStore>) -> Self { Self { index, docs } }
}

#[async_trait]
impl Retriever for DenseRetriever {
    fn name(&self) -> &str { "dense" }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RankedResult>> {
        let hits = self.index.query(query, k).await?;
        hits.into_iter()
            .map(|hit| match self.docs.get(&hit.id) {
                Some(doc) => Ok(RankedResult { document: doc.clone(), score: hit.score }),
                None => Err(Error::CorruptIndex(format!("vector index returned unknown document `{}`", hit.id))),
            })
            .collect()
    }
}

struct Weighted {
    retriever: Arc<dyn Retriever>,
    weight: f32,
}

pub struct FusionRetriever {
    retrievers: Vec<Weighted>,
    candidate_k: usize,
    rerank: Option<(Arc<dyn Reranker>, usize)>,
}

impl FusionRetriever {
    /// `candidate_k` is how many results every sub-retriever is asked for;
    /// it is raised to `k` when a caller wants more.
    pub fn new(candidate_k: usize) -> Self { Self { retrievers: Vec::new(), candidate_k, rerank: None } }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>, weight: f32) -> Self {
        self.retrievers.push(Weighted { retriever, weight: weight.max(0.0) });
        self
    }

    /// Rerank the fused top `k` and keep at most `top_n` of them.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>, top_n: usize) -> Self {
        self.rerank = Some((reranker, top_n));
        self
    }

    pub fn from_settings(dense: Arc<dyn Retriever>, lexical: Arc<dyn Retriever>, settings: &RetrievalSettings) -> Self {
        Self::new(settings.candidate_k).with_retriever(dense, settings.dense_weight).with_retriever(lexical, settings.lexical_weight)
    }

    pub fn candidate_k(&self) -> usize { self.candidate_k }

    #[instrument(skip(self), fields(retrievers = self.retrievers.len()))]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RankedResult>> {
        if k == 0 || query.trim().is_empty() || self.retrievers.is_empty() { return Ok(Vec::new()); }
        let per_list = self.candidate_k.max(k);
        let lists = try_join_all(self.retrievers.iter().map(|w| w.retriever.retrieve(query, per_list))).await?;
        for (w, list) in self.retrievers.iter().zip(&lists) {
            debug!(retriever = w.retriever.name(), hits = list.len(), "sub-retriever answered");
        }
        let weighted: Vec<(f32, Vec<RankedResult>)> = self.retrievers.iter().map(|w| w.weight).zip(lists).collect();
        let fused = fuse(weighted, k);
        match &self.rerank {
            Some((reranker, top_n)) if !fused.is_empty() => {
                debug!(reranker = reranker.name(), candidates = fused.len(), top_n, "reranking fused list");
                reranker.rerank(query, fused, (*top_n).min(k)).await.map_err(Error::from_anyhow)
            }
            _ => Ok(fused),
        }
    }

    pub async fn retrieve_cancellable(&self, query: &str, k: usize, cancel: &CancellationToken) -> Result<Vec<RankedResult>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = self.retrieve(query, k) => res,
        }
    }
}

#[async_trait]
impl Retriever for FusionRetriever {
    fn name(&self) -> &str { "fusion" }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RankedResult>> { FusionRetriever::retrieve(self, query, k).await }
}

struct Fused {
    result: RankedResult,
    best_rank: usize,
    first_list: usize,
}

/// Merge `(weight, ranked list)` pairs into the top `k` by fused score.
pub fn fuse(lists: Vec<(f32, Vec<RankedResult>)>, k: usize) -> Vec<RankedResult> {
    let total: f32 = lists.iter().map(|(w, _)| w.max(0.0)).sum();
    if total <= 0.0 || k == 0 { return Vec::new(); }

    let mut fused: Vec<Fused> = Vec::new();
    let mut by_id: HashMap<DocId, usize> = HashMap::new();
    for (list_idx, (weight, list)) in lists.into_iter().enumerate() {
        let weight = weight.max(0.0) / total;
        let n = list.len() as f32;
        let mut seen = std::collections::HashSet::new();
        let mut rank = 0usize;
        for item in list {
            if !seen.insert(item.document.id.clone()) { continue; }
            let contribution = weight * (1.0 - rank as f32 / n);
            match by_id.get(&item.document.id) {
                Some(&slot) => {
                    let f = &mut fused[slot];
                    f.result.score += contribution;
                    f.best_rank = f.best_rank.min(rank);
                }
                None => {
                    by_id.insert(item.document.id.clone(), fused.len());
                    fused.push(Fused { result: RankedResult { document: item.document, score: contribution }, best_rank: rank, first_list: list_idx });
                }
            }
            rank += 1;
        }
    }
    fused.sort_by(|a, b| {
        b.result.score.total_cmp(&a.result.score).then(a.best_rank.cmp(&b.best_rank)).then(a.first_list.cmp(&b.first_list))
    });
    fused.truncate(k);
    fused.into_iter().map(|f| f.result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::types::Document;

    fn list(ids: &[&str]) -> Vec<RankedResult> {
        ids.iter().enumerate().map(|(i, id)| RankedResult { document: Document::new(*id, *id), score: 10.0 - i as f32 }).collect()
    }

    fn ids(results: &[RankedResult]) -> Vec<&str> { results.iter().map(|r| r.id()).collect() }

    struct Fixed(&'static str, Vec<RankedResult>);

    #[async_trait]
    impl Retriever for Fixed {
        fn name(&self) -> &str { self.0 }
        async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<RankedResult>> { Ok(self.1.iter().take(k).cloned().collect()) }
    }

    #[test]
    fn disjoint_lists_interleave_by_weighted_rank() {
        let fused = fuse(vec![(2.0, list(&["D1", "D2", "D3"])), (1.0, list(&["L1", "L2", "L3"]))], 3);
        assert_eq!(ids(&fused), vec!["D1", "D2", "L1"]);
        assert!((fused[0].score - 2.0 / 3.0).abs() < 1e-6);

        let all = fuse(vec![(2.0, list(&["D1", "D2", "D3"])), (1.0, list(&["L1", "L2", "L3"]))], 10);
        assert_eq!(all.len(), 6);
        for pair in all.windows(2) { assert!(pair[0].score >= pair[1].score); }
    }

    #[test]
    fn shared_documents_accumulate() {
        let fused = fuse(vec![(1.0, list(&["A", "B"])), (1.0, list(&["B", "C"]))], 3);
        assert_eq!(ids(&fused), vec!["B", "A", "C"]);
        assert!((fused[0].score - 0.75).abs() < 1e-6);
    }

    #[test]
    fn ties_prefer_better_rank_then_registration_order() {
        // equal weights, mirrored lists: every score ties
        let fused = fuse(vec![(1.0, list(&["A", "B"])), (1.0, list(&["B", "A"]))], 2);
        assert_eq!(ids(&fused), vec!["A", "B"]);

        let fused = fuse(vec![(1.0, list(&["X"])), (1.0, list(&["Y"]))], 2);
        assert_eq!(ids(&fused), vec!["X", "Y"]);
    }

    #[test]
    fn weights_are_normalized() {
        let a = fuse(vec![(2.0, list(&["D1", "D2"])), (1.0, list(&["L1"]))], 3);
        let b = fuse(vec![(20.0, list(&["D1", "D2"])), (10.0, list(&["L1"]))], 3);
        assert_eq!(ids(&a), ids(&b));
        assert!((a[0].score - b[0].score).abs() < 1e-6);
    }

    #[test]
    fn degenerate_inputs_are_empty() {
        assert!(fuse(vec![(0.0, list(&["A"]))], 3).is_empty());
        assert!(fuse(vec![(1.0, list(&["A"]))], 0).is_empty());
        assert!(fuse(vec![(1.0, vec![]), (1.0, vec![])], 3).is_empty());
    }

    #[tokio::test]
    async fn retriever_asks_for_candidate_k_and_cuts_to_k() {
        let dense = Arc::new(Fixed("dense", list(&["D1", "D2", "D3", "D4"])));
        let lexical = Arc::new(Fixed("lexical", list(&["D3", "L1"])));
        let fusion = FusionRetriever::new(3).with_retriever(dense, 2.0).with_retriever(lexical, 1.0);
        let out = fusion.retrieve("anything", 2).await.unwrap();
        assert_eq!(ids(&out), vec!["D1", "D3"]);
        assert!(fusion.retrieve("   ", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_retrieval_reports_cancellation() {
        let fusion = FusionRetriever::new(10).with_retriever(Arc::new(Fixed("dense", list(&["A"]))), 1.0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(fusion.retrieve_cancellable("q", 1, &cancel).await, Err(Error::Cancelled)));
    }

    /// Scores candidates by reversed fused position.
    struct Reverse;

    #[async_trait]
    impl Reranker for Reverse {
        fn name(&self) -> &str { "reverse" }
        async fn rerank(&self, _query: &str, mut candidates: Vec<RankedResult>, top_n: usize) -> anyhow::Result<Vec<RankedResult>> {
            candidates.reverse();
            candidates.truncate(top_n);
            for (i, c) in candidates.iter_mut().enumerate() { c.score = 1.0 / (i + 1) as f32; }
            Ok(candidates)
        }
    }

    #[tokio::test]
    async fn reranker_reorders_the_fused_top_k_and_keeps_top_n() {
        let dense = Arc::new(Fixed("dense", list(&["D1", "D2", "D3"])));
        let lexical = Arc::new(Fixed("lexical", list(&["L1", "L2", "L3"])));
        let fusion = FusionRetriever::new(10).with_retriever(dense, 2.0).with_retriever(lexical, 1.0).with_reranker(Arc::new(Reverse), 2);
        let out = fusion.retrieve("q", 3).await.unwrap();
        assert_eq!(ids(&out), vec!["L1", "D2"]);
        assert_eq!(out[0].score, 1.0);
        assert_eq!(ids(&fusion.retrieve("q", 1).await.unwrap()), vec!["D1"]);
    }
}
