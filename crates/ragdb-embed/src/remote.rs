//! HTTP embedding clients for the hosted and self-hosted providers.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragdb_core::embed_config::{EmbeddingConfig, EmbeddingProvider};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Embedder;

/// Inputs longer than this are cut on a char boundary before being sent.
const MAX_EMBED_CHARS: usize = 6_000;

pub struct RemoteEmbedder {
    client: reqwest::Client,
    provider: EmbeddingProvider,
    model: String,
    base_url: String,
    api_key: String,
    id: String,
    dim: AtomicUsize,
}

impl RemoteEmbedder {
    pub fn new(config: &EmbeddingConfig, base_url: Option<&str>) -> Result<Self> {
        let provider = config.provider()?;
        if provider.requires_api_key() && config.api_key.trim().is_empty() {
            return Err(Error::InvalidConfig(format!("{} requires an api_key", config.embed_model)));
        }
        let model = model_name(config, provider);
        let base_url = base_url.unwrap_or(default_base_url(provider)).trim_end_matches('/').to_string();
        let id = format!("{}:{}", provider_label(provider), model);
        let dim = known_dim(&model).unwrap_or(0);
        Ok(Self {
            client: reqwest::Client::new(),
            provider,
            model,
            base_url,
            api_key: config.api_key.clone(),
            id,
            dim: AtomicUsize::new(dim),
        })
    }

    pub fn endpoint(&self) -> String {
        match self.provider {
            EmbeddingProvider::OpenAi | EmbeddingProvider::Mistral | EmbeddingProvider::Voyage => {
                format!("{}/v1/embeddings", self.base_url)
            }
            EmbeddingProvider::Ollama => format!("{}/api/embed", self.base_url),
            EmbeddingProvider::HuggingFace => format!("{}/embed", self.base_url),
        }
    }

    pub fn model(&self) -> &str { &self.model }

    fn batch_size(&self) -> usize {
        match self.provider {
            EmbeddingProvider::Ollama | EmbeddingProvider::HuggingFace => 32,
            EmbeddingProvider::Voyage => 128,
            EmbeddingProvider::OpenAi | EmbeddingProvider::Mistral => 64,
        }
    }

    async fn embed_chunk(&self, chunk: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = self.endpoint();
        let request = match self.provider {
            EmbeddingProvider::Ollama => {
                self.client.post(&url).json(&OllamaEmbedRequest { model: &self.model, input: chunk, truncate: true })
            }
            EmbeddingProvider::HuggingFace => self.client.post(&url).json(&TeiEmbedRequest { inputs: chunk, truncate: true }),
            _ => self.client.post(&url).bearer_auth(&self.api_key).json(&OpenAiEmbedRequest { model: &self.model, input: chunk }),
        };
        let resp = request.send().await.with_context(|| format!("failed to call {}", url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("embedding API {} returned {}: {}", url, status, body);
        }
        let body = resp.text().await.context("failed to read embedding response")?;
        parse_response(self.provider, &body)
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    /// Zero until the first response when the model's size is not known up front.
    fn dim(&self) -> usize { self.dim.load(Ordering::Relaxed) }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let truncated: Vec<String> = texts.iter().map(|t| truncate_for_embedding(t).to_string()).collect();
        let mut all = Vec::with_capacity(texts.len());
        for chunk in truncated.chunks(self.batch_size()) {
            let vectors = self.embed_chunk(chunk).await?;
            if vectors.len() != chunk.len() {
                bail!("embedding API returned {} vectors for {} inputs", vectors.len(), chunk.len());
            }
            all.extend(vectors);
        }
        let dim = all.first().map(Vec::len).unwrap_or(0);
        if all.iter().any(|v| v.len() != dim) { bail!("embedding API returned vectors of mixed dimensionality"); }
        let expected = self.dim.load(Ordering::Relaxed);
        if expected == 0 {
            self.dim.store(dim, Ordering::Relaxed);
        } else if expected != dim {
            bail!("{} returned {}-d vectors, expected {}", self.id, dim, expected);
        }
        debug!(embedder = %self.id, count = all.len(), "embedded batch");
        Ok(all)
    }
}

/// `ollama:nomic-embed-text` selects a model explicitly; a bare provider
/// name falls back to the provider's default model. OpenAI-style names like
/// `gpt-...` always use the default embedding model.
pub fn model_name(config: &EmbeddingConfig, provider: EmbeddingProvider) -> String {
    match config.embed_model.split_once(':') {
        Some((_, model)) if !model.trim().is_empty() => model.trim().to_string(),
        _ => provider.default_model().to_string(),
    }
}

pub fn default_base_url(provider: EmbeddingProvider) -> &'static str {
    match provider {
        EmbeddingProvider::OpenAi => "https://api.openai.com",
        EmbeddingProvider::Mistral => "https://api.mistral.ai",
        EmbeddingProvider::Voyage => "https://api.voyageai.com",
        EmbeddingProvider::Ollama => "http://localhost:11434",
        EmbeddingProvider::HuggingFace => "http://localhost:8080",
    }
}

fn provider_label(provider: EmbeddingProvider) -> &'static str {
    match provider {
        EmbeddingProvider::OpenAi => "openai",
        EmbeddingProvider::Mistral => "mistral",
        EmbeddingProvider::Voyage => "voyage",
        EmbeddingProvider::Ollama => "ollama",
        EmbeddingProvider::HuggingFace => "huggingface",
    }
}

fn known_dim(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "mistral-embed" | "voyage-3" | "mxbai-embed-large" | "bge-large-zh-v1.5" | "bge-m3" => Some(1024),
        "nomic-embed-text" => Some(768),
        _ => None,
    }
}

pub(crate) fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS { return text; }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) { end -= 1; }
    &text[..end]
}

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct TeiEmbedRequest<'a> {
    inputs: &'a [String],
    truncate: bool,
}

fn parse_response(provider: EmbeddingProvider, body: &str) -> anyhow::Result<Vec<Vec<f32>>> {
    match provider {
        EmbeddingProvider::Ollama => {
            let parsed: OllamaEmbedResponse = serde_json::from_str(body).context("failed to parse Ollama embed response")?;
            Ok(parsed.embeddings)
        }
        EmbeddingProvider::HuggingFace => serde_json::from_str(body).context("failed to parse TEI embed response"),
        _ => {
            let mut parsed: OpenAiEmbedResponse = serde_json::from_str(body).context("failed to parse embeddings response")?;
            parsed.data.sort_by_key(|d| d.index);
            Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_and_ids_follow_the_provider() {
        let e = RemoteEmbedder::new(&EmbeddingConfig::new("ollama", ""), None).unwrap();
        assert_eq!(e.endpoint(), "http://localhost:11434/api/embed");
        assert_eq!(e.embedder_id(), "ollama:mxbai-embed-large");
        assert_eq!(e.dim(), 1024);

        let e = RemoteEmbedder::new(&EmbeddingConfig::new("ollama:nomic-embed-text", ""), Some("http://gpu-box:11434/")).unwrap();
        assert_eq!(e.endpoint(), "http://gpu-box:11434/api/embed");
        assert_eq!(e.model(), "nomic-embed-text");

        let e = RemoteEmbedder::new(&EmbeddingConfig::new("gpt-4o", "sk-test"), None).unwrap();
        assert_eq!(e.endpoint(), "https://api.openai.com/v1/embeddings");
        assert_eq!(e.model(), "text-embedding-3-small");

        let e = RemoteEmbedder::new(&EmbeddingConfig::new("huggingface:custom-model", ""), None).unwrap();
        assert_eq!(e.endpoint(), "http://localhost:8080/embed");
        assert_eq!(e.dim(), 0);
    }

    #[test]
    fn hosted_providers_need_a_key() {
        let err = RemoteEmbedder::new(&EmbeddingConfig::new("voyage", " "), None).err().unwrap();
        assert!(err.is_rejected_request());
        let err = RemoteEmbedder::new(&EmbeddingConfig::new("claude", "k"), None).err().unwrap();
        assert!(matches!(err, Error::UnsupportedProvider(_)));
    }

    #[test]
    fn openai_responses_are_reordered_by_index() {
        let body = r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#;
        let vectors = parse_response(EmbeddingProvider::Mistral, body).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn ollama_and_tei_shapes_parse() {
        let ollama = parse_response(EmbeddingProvider::Ollama, r#"{"model":"m","embeddings":[[0.5,0.5]]}"#).unwrap();
        assert_eq!(ollama, vec![vec![0.5, 0.5]]);
        let tei = parse_response(EmbeddingProvider::HuggingFace, "[[1.0],[2.0]]").unwrap();
        assert_eq!(tei.len(), 2);
        assert!(parse_response(EmbeddingProvider::OpenAi, "{}").is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "狐".repeat(MAX_EMBED_CHARS);
        let cut = truncate_for_embedding(&long);
        assert!(cut.len() <= MAX_EMBED_CHARS);
        assert!(cut.chars().all(|c| c == '狐'));
        assert_eq!(truncate_for_embedding("short"), "short");
    }
}
