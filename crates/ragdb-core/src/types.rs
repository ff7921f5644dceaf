//! Domain types shared by the lexical, vector and hybrid engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type DocId = String;
pub type Meta = BTreeMap<String, String>;

/// An immutable unit of retrievable content.
///
/// - `id`: stable identity, re-indexing the same id replaces the document
/// - `text`: the payload that is tokenized and embedded
/// - `metadata`: free-form key/value pairs (source path, chunk position, ...)
/// - `hash`: blake3 hex digest of `text`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub text: String,
    #[serde(default)]
    pub metadata: Meta,
    pub hash: String,
}

impl Document {
    pub fn new(id: impl Into<DocId>, text: impl Into<String>) -> Self {
        Self::with_metadata(id, text, Meta::new())
    }

    pub fn with_metadata(id: impl Into<DocId>, text: impl Into<String>, metadata: Meta) -> Self {
        let text = text.into();
        let hash = content_hash(&text);
        Self { id: id.into(), text, metadata, hash }
    }

    /// True when `hash` still matches `text`.
    pub fn is_intact(&self) -> bool { self.hash == content_hash(&self.text) }
}

pub fn content_hash(text: &str) -> String { blake3::hash(text.as_bytes()).to_hex().to_string() }

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Vector,
    Text,
}

/// The minimal surface returned by a dense index: an id and a score.
///
/// `id` matches `Document::id`. `score` is engine-specific but higher is
/// always better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocId,
    pub score: f32,
    pub source: SourceKind,
}

/// A resolved document together with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub document: Document,
    pub score: f32,
}

impl RankedResult {
    pub fn id(&self) -> &str { &self.document.id }
}
