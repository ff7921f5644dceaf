//! Voyage rerank client, applied after fusion.

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragdb_core::embed_config::EmbeddingProvider;
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Reranker;
use ragdb_core::types::RankedResult;

use crate::remote::{default_base_url, truncate_for_embedding};

pub const DEFAULT_RERANK_MODEL: &str = "rerank-2";

pub struct VoyageReranker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl VoyageReranker {
    pub fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::InvalidConfig("reranking requires a Voyage api_key".to_string()));
        }
        let model = if model.trim().is_empty() { DEFAULT_RERANK_MODEL } else { model.trim() };
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or(default_base_url(EmbeddingProvider::Voyage)).trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn endpoint(&self) -> String { format!("{}/v1/rerank", self.base_url) }

    pub fn model(&self) -> &str { &self.model }
}

#[async_trait]
impl Reranker for VoyageReranker {
    fn name(&self) -> &str { "voyage" }

    async fn rerank(&self, query: &str, candidates: Vec<RankedResult>, top_n: usize) -> anyhow::Result<Vec<RankedResult>> {
        if candidates.is_empty() || top_n == 0 { return Ok(Vec::new()); }
        let url = self.endpoint();
        let request = RerankRequest {
            query,
            documents: candidates.iter().map(|c| truncate_for_embedding(&c.document.text)).collect(),
            model: &self.model,
            top_k: top_n.min(candidates.len()),
            truncation: true,
        };
        let resp = self.client.post(&url).bearer_auth(&self.api_key).json(&request).send().await
            .with_context(|| format!("failed to call {}", url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("rerank API {} returned {}: {}", url, status, body);
        }
        let body = resp.text().await.context("failed to read rerank response")?;
        let scored = parse_rerank_response(&body, candidates.len())?;
        debug!(model = %self.model, candidates = candidates.len(), kept = scored.len().min(top_n), "reranked");
        Ok(apply_rerank(candidates, &scored, top_n))
    }
}

/// `(candidate index, relevance)` pairs, best first.
pub fn parse_rerank_response(body: &str, candidates: usize) -> anyhow::Result<Vec<(usize, f32)>> {
    let parsed: RerankResponse = serde_json::from_str(body).context("unexpected rerank response")?;
    let mut scored = Vec::with_capacity(parsed.data.len());
    for item in parsed.data {
        if item.index >= candidates { bail!("rerank response names candidate {} of {}", item.index, candidates); }
        scored.push((item.index, item.relevance_score));
    }
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(scored)
}

/// Reorder `candidates` by `scored`, keeping at most `top_n`. Scores are
/// replaced with the reranker's relevance.
pub fn apply_rerank(candidates: Vec<RankedResult>, scored: &[(usize, f32)], top_n: usize) -> Vec<RankedResult> {
    let mut slots: Vec<Option<RankedResult>> = candidates.into_iter().map(Some).collect();
    scored
        .iter()
        .filter_map(|&(index, score)| slots.get_mut(index).and_then(Option::take).map(|r| RankedResult { score, ..r }))
        .take(top_n)
        .collect()
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: Vec<&'a str>,
    model: &'a str,
    top_k: usize,
    truncation: bool,
}

#[derive(Deserialize)]
struct RerankResponse {
    data: Vec<RerankItem>,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    relevance_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::types::Document;

    fn candidates(ids: &[&str]) -> Vec<RankedResult> {
        ids.iter().map(|id| RankedResult { document: Document::new(*id, format!("text of {id}")), score: 0.5 }).collect()
    }

    #[test]
    fn response_is_ordered_by_relevance() {
        let body = r#"{"object":"list","data":[
            {"relevance_score":0.12,"index":0},
            {"relevance_score":0.91,"index":2},
            {"relevance_score":0.40,"index":1}
        ],"model":"rerank-2","usage":{"total_tokens":42}}"#;
        assert_eq!(parse_rerank_response(body, 3).unwrap(), vec![(2, 0.91), (1, 0.40), (0, 0.12)]);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let body = r#"{"data":[{"relevance_score":0.5,"index":3}]}"#;
        assert!(parse_rerank_response(body, 3).is_err());
        assert!(parse_rerank_response("{\"detail\":\"bad key\"}", 3).is_err());
    }

    #[test]
    fn apply_keeps_top_n_with_new_scores() {
        let reranked = apply_rerank(candidates(&["a", "b", "c"]), &[(2, 0.9), (0, 0.7), (1, 0.1)], 2);
        let ids: Vec<&str> = reranked.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(reranked[0].score, 0.9);
        assert_eq!(apply_rerank(candidates(&["a"]), &[(0, 0.3)], 5).len(), 1);
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let err = VoyageReranker::new(" ", DEFAULT_RERANK_MODEL, None).err().unwrap();
        assert!(err.is_rejected_request());
        let r = VoyageReranker::new("vk", "", Some("http://proxy:9000/")).unwrap();
        assert_eq!(r.endpoint(), "http://proxy:9000/v1/rerank");
        assert_eq!(r.model(), DEFAULT_RERANK_MODEL);
    }

    #[tokio::test]
    async fn nothing_to_rerank_skips_the_call() {
        let r = VoyageReranker::new("vk", DEFAULT_RERANK_MODEL, Some("http://127.0.0.1:9")).unwrap();
        assert!(r.rerank("q", Vec::new(), 2).await.unwrap().is_empty());
        assert!(r.rerank("q", candidates(&["a"]), 0).await.unwrap().is_empty());
    }
}
