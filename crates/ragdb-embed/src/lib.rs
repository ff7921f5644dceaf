//! ragdb-embed
//!
//! Embedding clients selected from an `EmbeddingConfig`, plus the Voyage
//! reranker. Set
//! `APP_USE_FAKE_EMBEDDINGS=1` to swap every provider for the deterministic
//! hashing embedder (tests, offline development).

use tracing::info;

use ragdb_core::embed_config::EmbeddingConfig;
use ragdb_core::error::Result;
use ragdb_core::traits::Embedder;

pub mod hashing;
pub mod remote;
pub mod rerank;

pub use hashing::{HashingEmbedder, DEFAULT_DIM};
pub use remote::RemoteEmbedder;
pub use rerank::{VoyageReranker, DEFAULT_RERANK_MODEL};

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Embedder for `config`, honouring `APP_USE_FAKE_EMBEDDINGS`.
pub fn embedder_for(config: &EmbeddingConfig, base_url: Option<&str>) -> Result<Box<dyn Embedder>> {
    build_embedder(config, base_url, use_fake_embeddings())
}

/// The provider is validated in both modes, so an unsupported model name is
/// rejected the same way offline.
pub fn build_embedder(config: &EmbeddingConfig, base_url: Option<&str>, fake: bool) -> Result<Box<dyn Embedder>> {
    let provider = config.provider()?;
    if fake {
        let model = remote::model_name(config, provider);
        info!(model = %model, "using hashing embedder");
        return Ok(Box::new(HashingEmbedder::with_label(&format!("hash:{model}"), DEFAULT_DIM)));
    }
    Ok(Box::new(RemoteEmbedder::new(config, base_url)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_mode_is_deterministic_per_model() {
        let a = build_embedder(&EmbeddingConfig::new("ollama", ""), None, true).unwrap();
        let b = build_embedder(&EmbeddingConfig::new("voyage", ""), None, true).unwrap();
        assert_eq!(a.embedder_id(), "hash:mxbai-embed-large:d384");
        assert_ne!(a.embedder_id(), b.embedder_id());
        let v1 = a.embed_batch(&["棕色狐狸".to_string()]).await.unwrap();
        let v2 = a.embed_batch(&["棕色狐狸".to_string()]).await.unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1[0].len(), a.dim());
    }

    #[test]
    fn unsupported_model_is_rejected_offline_too() {
        let err = build_embedder(&EmbeddingConfig::new("claude-embed", ""), None, true).err().unwrap();
        assert_eq!(err.to_string(), "Unsupported embed model: `claude-embed`");
    }
}
