//! Turns a directory of text files into chunked `Document`s.
//!
//! Chunk ids are `<relative path>#<chunk index>`, so parsing the same file
//! again yields the same ids and re-indexing replaces instead of duplicating.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::types::{Document, Meta};

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 500, overlap_percent: 0.2 }
    }
}

#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_chunking(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<Document>> {
        self.process_files(data_dir, self.list_source_files(data_dir))
    }

    pub fn process_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<Document>> {
        let mut files = self.list_source_files(data_dir);
        if files.len() > limit { files.truncate(limit); info!(limit, "limited to first files"); }
        self.process_files(data_dir, files)
    }

    /// Chunk a single file; `data_dir` anchors the relative id.
    pub fn process_file(&self, data_dir: &Path, file_path: &Path) -> Result<Vec<Document>> {
        let content = self.read_file_content(file_path)?;
        let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
        Ok(self.chunk_content(&content, relative))
    }

    fn process_files(&self, data_dir: &Path, files: Vec<PathBuf>) -> Result<Vec<Document>> {
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no source files found");
            return Ok(vec![]);
        }
        let mut all_chunks = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), "processing file {}/{}", file_index + 1, files.len());
            all_chunks.extend(self.process_file(data_dir, file_path)?);
        }
        info!(files = files.len(), chunks = all_chunks.len(), "processed source files");
        Ok(all_chunks)
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    fn chunk_content(&self, content: &str, relative: &Path) -> Vec<Document> {
        let mut texts = Vec::new();
        for paragraph in content.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() { continue; }
            if self.count_tokens(paragraph) <= self.chunking_config.max_tokens {
                texts.push(paragraph.to_string());
            } else {
                texts.extend(self.split_paragraph_with_overlap(paragraph));
            }
        }

        let rel = relative.to_string_lossy().replace('\\', "/");
        let file_name = relative.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| rel.clone());
        let category = relative.parent().and_then(|p| p.to_str()).filter(|p| !p.is_empty()).unwrap_or("misc").to_string();
        let total_chunks = texts.len();
        texts
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| {
                let mut metadata = Meta::new();
                metadata.insert("file_path".to_string(), rel.clone());
                metadata.insert("file_name".to_string(), file_name.clone());
                metadata.insert("category".to_string(), category.clone());
                metadata.insert("chunk_index".to_string(), chunk_index.to_string());
                metadata.insert("total_chunks".to_string(), total_chunks.to_string());
                Document::with_metadata(format!("{rel}#{chunk_index}"), text, metadata)
            })
            .collect()
    }

    // Rough estimate: whitespace words for Latin text, characters for CJK.
    fn count_tokens(&self, text: &str) -> usize {
        let cjk = text.chars().filter(|c| is_cjk(*c)).count();
        let word_count = text.split_whitespace().count();
        cjk + (word_count as f32 / 0.75) as usize
    }

    fn split_paragraph_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let units = split_units(paragraph);
        let units_per_chunk = (self.chunking_config.max_tokens * 3 / 5).max(1);
        let overlap = (units_per_chunk as f32 * self.chunking_config.overlap_percent) as usize;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < units.len() {
            let end = (start + units_per_chunk).min(units.len());
            chunks.push(units[start..end].concat().trim().to_string());
            if end >= units.len() { break; }
            start = end - overlap.min(end - start - 1);
        }
        chunks
    }

    fn list_source_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            let supported = path.extension().and_then(|s| s.to_str()).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext));
            if supported { files.push(path.to_path_buf()); }
        }
        files.sort();
        files
    }
}

fn is_cjk(c: char) -> bool { ('\u{4E00}'..='\u{9FFF}').contains(&c) || ('\u{3400}'..='\u{4DBF}').contains(&c) }

/// Splits text into words (with their trailing whitespace) and single CJK
/// characters. The split is loss-less: concatenating every unit restores `text`.
fn split_units(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    for (i, c) in text.char_indices() {
        let boundary = match prev {
            None => false,
            Some(p) => is_cjk(c) || (is_cjk(p) && !c.is_whitespace()) || (p.is_whitespace() && !c.is_whitespace()),
        };
        if boundary { units.push(&text[start..i]); start = i; }
        prev = Some(c);
    }
    if start < text.len() { units.push(&text[start..]); }
    units
}
