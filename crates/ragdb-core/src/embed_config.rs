//! Embedding configuration record and the providers it may name.
//!
//! The record is written once when a corpus is first built and every later
//! insertion or query reuses it, so vectors from two embedding spaces never
//! end up in the same index.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::traits::EmbeddingConfigStore;

pub const EMBED_CONFIG_FILE: &str = "embed_config.json";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub embed_model: String,
    #[serde(default)]
    pub api_key: String,
}

impl EmbeddingConfig {
    pub fn new(embed_model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { embed_model: embed_model.into(), api_key: api_key.into() }
    }

    pub fn provider(&self) -> Result<EmbeddingProvider> { EmbeddingProvider::from_model_name(&self.embed_model) }
}

// Keep credentials out of logs.
impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.api_key.is_empty() { "<empty>" } else { "<redacted>" };
        f.debug_struct("EmbeddingConfig").field("embed_model", &self.embed_model).field("api_key", &key).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAi,
    Mistral,
    Voyage,
    Ollama,
    HuggingFace,
}

impl EmbeddingProvider {
    /// Resolve a provider from a model name prefix (`gpt-4o` -> OpenAI, ...).
    pub fn from_model_name(model_name: &str) -> Result<Self> {
        let name = model_name.trim().to_ascii_lowercase();
        let provider = if name.starts_with("gpt") || name.starts_with("openai") {
            Self::OpenAi
        } else if name.starts_with("mistral") {
            Self::Mistral
        } else if name.starts_with("voyage") {
            Self::Voyage
        } else if name.starts_with("ollama") {
            Self::Ollama
        } else if name.starts_with("huggingface") {
            Self::HuggingFace
        } else {
            return Err(Error::UnsupportedProvider(model_name.to_string()));
        };
        Ok(provider)
    }

    /// Concrete embedding model requested from the provider.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "text-embedding-3-small",
            Self::Mistral => "mistral-embed",
            Self::Voyage => "voyage-3",
            Self::Ollama => "mxbai-embed-large",
            Self::HuggingFace => "bge-large-zh-v1.5",
        }
    }

    pub fn requires_api_key(self) -> bool { matches!(self, Self::OpenAi | Self::Mistral | Self::Voyage) }
}

/// JSON file store for the embedding configuration.
#[derive(Debug, Clone)]
pub struct JsonEmbeddingConfigStore {
    path: PathBuf,
}

impl JsonEmbeddingConfigStore {
    /// Store living at `<dir>/embed_config.json`.
    pub fn in_dir(dir: &Path) -> Self { Self { path: dir.join(EMBED_CONFIG_FILE) } }

    pub fn path(&self) -> &Path { &self.path }
}

impl EmbeddingConfigStore for JsonEmbeddingConfigStore {
    fn save(&self, config: &EmbeddingConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() { fs::create_dir_all(parent)?; }
        let mut file = fs::File::create(&self.path)?;
        file.write_all(serde_json::to_string_pretty(config)?.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn load(&self) -> Result<Option<EmbeddingConfig>> {
        if !self.path.exists() { return Ok(None); }
        let raw = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}
