use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use ragdb_core::traits::Embedder;

pub const DEFAULT_DIM: usize = 384;

/// Deterministic, offline stand-in for a real embedding model: hashes word and
/// CJK-character features into a fixed number of buckets and L2-normalizes.
/// Texts sharing vocabulary end up close in cosine space.
pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self { Self::with_label("hash", dim) }

    /// `label` becomes part of the embedder id, so corpora built for
    /// different models stay distinguishable.
    pub fn with_label(label: &str, dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("{label}:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, feature) in features(text).iter().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            feature.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

/// Lower-cased ASCII words and single non-ASCII alphanumeric characters.
fn features(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            word.push(c.to_ascii_lowercase());
            continue;
        }
        if !word.is_empty() { out.push(std::mem::take(&mut word)); }
        if !c.is_ascii() && c.is_alphanumeric() { out.push(c.to_string()); }
    }
    if !word.is_empty() { out.push(word); }
    out
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
