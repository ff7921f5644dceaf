//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`APP_RETRIEVAL__TOP_K=8`). Provides helpers to expand
//! `~` and `${VAR}` and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::embed_config::EmbeddingConfig;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment.extract().map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        settings.retrieval.validate().map_err(|e| anyhow::anyhow!(e))
    }
}

/// Every tunable of the engine, with defaults matching the reference deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub retrieval: RetrievalSettings,
    pub text: TextSettings,
    pub embedding: EmbeddingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub raw_txt_dir: String,
    pub persist_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { raw_txt_dir: "persist_dir/data".to_string(), persist_dir: "persist_dir/index_storage".to_string() }
    }
}

/// What to do when an insert asks for a different embedding configuration
/// than the one the corpus was built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Keep the stored configuration and log a warning.
    #[default]
    Downgrade,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Results handed to the answer stage.
    pub top_k: usize,
    /// Candidates requested from every sub-retriever before fusion.
    pub candidate_k: usize,
    pub dense_weight: f32,
    pub lexical_weight: f32,
    pub mismatch_policy: MismatchPolicy,
    /// Rerank the fused list and keep this many results. Unset disables reranking.
    pub rerank_top_n: Option<usize>,
    pub rerank_model: String,
    /// Falls back to `embedding.api_key` when unset.
    pub rerank_api_key: Option<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 4,
            candidate_k: 10,
            dense_weight: 2.0,
            lexical_weight: 1.0,
            mismatch_policy: MismatchPolicy::Downgrade,
            rerank_top_n: None,
            rerank_model: "rerank-2".to_string(),
            rerank_api_key: None,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.dense_weight < 0.0 || self.lexical_weight < 0.0 {
            return Err("retrieval weights must be non-negative".to_string());
        }
        if self.dense_weight + self.lexical_weight <= 0.0 {
            return Err("at least one retrieval weight must be positive".to_string());
        }
        if self.candidate_k == 0 {
            return Err("retrieval.candidate_k must be at least 1".to_string());
        }
        if self.rerank_top_n == Some(0) {
            return Err("retrieval.rerank_top_n must be at least 1 when set".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSettings {
    pub similarity_top_k: usize,
    pub skip_stemming: bool,
    pub verbose: bool,
    /// Optional line-delimited file replacing the built-in Chinese stopwords.
    pub cn_stopwords_path: Option<String>,
}

impl Default for TextSettings {
    fn default() -> Self { Self { similarity_top_k: 10, skip_stemming: false, verbose: false, cn_stopwords_path: None } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub embed_model: String,
    pub api_key: String,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self { Self { embed_model: "ollama".to_string(), api_key: String::new(), base_url: None } }
}

impl EmbeddingSettings {
    pub fn to_config(&self) -> EmbeddingConfig { EmbeddingConfig::new(self.embed_model.clone(), self.api_key.clone()) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
