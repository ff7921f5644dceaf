//! JSON persistence for the flat vector index.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use ragdb_core::types::DocId;

pub const VECTORS_FILE: &str = "vectors.json";

const FORMAT_VERSION: u32 = 1;

/// One embedded document: `hash` is the content hash the vector was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: DocId,
    pub hash: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoredVectors {
    pub version: u32,
    pub embedder_id: String,
    pub dim: usize,
    pub entries: Vec<VectorEntry>,
}

impl StoredVectors {
    pub fn new(embedder_id: impl Into<String>, dim: usize, entries: Vec<VectorEntry>) -> Self {
        Self { version: FORMAT_VERSION, embedder_id: embedder_id.into(), dim, entries }
    }
}

pub fn write(dir: &Path, stored: &StoredVectors) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(VECTORS_FILE);
    let mut writer = BufWriter::new(File::create(&path).with_context(|| format!("create {}", path.display()))?);
    serde_json::to_writer(&mut writer, stored)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

pub fn read(dir: &Path) -> Result<StoredVectors> {
    let path = dir.join(VECTORS_FILE);
    let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let stored: StoredVectors =
        serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parse {}", path.display()))?;
    if stored.version != FORMAT_VERSION { bail!("unknown vector store version {}", stored.version); }
    if let Some(bad) = stored.entries.iter().find(|e| e.vector.len() != stored.dim) {
        bail!("vector for `{}` has {} dimensions, expected {}", bad.id, bad.vector.len(), stored.dim);
    }
    Ok(stored)
}
