//! Canonical document set shared by every retriever of a corpus.
//!
//! Retrievers only read from the store; the incremental indexer is its sole
//! writer. Ids are unique and a colliding `add` replaces the earlier entry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{DocId, Document};

pub const DOCSTORE_FILE: &str = "docstore.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStore {
    docs: BTreeMap<DocId, Document>,
}

impl DocumentStore {
    pub fn new() -> Self { Self::default() }

    pub fn from_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let mut store = Self::new();
        store.add(documents);
        store
    }

    /// Insert documents, last write wins for repeated ids. Returns how many
    /// entries were replaced.
    pub fn add(&mut self, documents: impl IntoIterator<Item = Document>) -> usize {
        let mut replaced = 0;
        for doc in documents {
            if self.docs.insert(doc.id.clone(), doc).is_some() { replaced += 1; }
        }
        replaced
    }

    pub fn get(&self, id: &str) -> Option<&Document> { self.docs.get(id) }

    pub fn all(&self) -> impl Iterator<Item = &Document> { self.docs.values() }

    pub fn ids(&self) -> BTreeSet<DocId> { self.docs.keys().cloned().collect() }

    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let records: Vec<&Document> = self.docs.values().collect();
        let mut file = fs::File::create(path)?;
        file.write_all(&serde_json::to_vec(&records)?)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::CorruptIndex(format!("missing document store at {}", path.display())));
        }
        let records: Vec<Document> = serde_json::from_slice(&fs::read(path)?)?;
        let mut store = Self::new();
        for doc in records {
            if !doc.is_intact() {
                return Err(Error::CorruptIndex(format!("document `{}` does not match its content hash", doc.id)));
            }
            if store.docs.insert(doc.id.clone(), doc).is_some() {
                return Err(Error::CorruptIndex("duplicate id in persisted document store".to_string()));
            }
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colliding_id_replaces() {
        let mut store = DocumentStore::new();
        assert!(store.is_empty());
        store.add([Document::new("a", "old"), Document::new("b", "bee")]);
        let replaced = store.add([Document::new("a", "new")]);
        assert_eq!(replaced, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").map(|d| d.text.as_str()), Some("new"));
        assert!(store.get("zzz").is_none());
    }

    #[test]
    fn persist_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DOCSTORE_FILE);
        let store = DocumentStore::from_documents([Document::new("x", "hello"), Document::new("y", "world")]);
        store.persist(&path).unwrap();
        let loaded = DocumentStore::load(&path).unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn tampered_record_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DOCSTORE_FILE);
        let mut doc = Document::new("x", "hello");
        doc.text = "changed".to_string();
        std::fs::write(&path, serde_json::to_vec(&vec![doc]).unwrap()).unwrap();
        assert!(DocumentStore::load(&path).unwrap_err().is_corruption());
    }
}
