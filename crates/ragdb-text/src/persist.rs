//! On-disk form of the lexical index: `index.json` holds postings, document
//! lengths, corpus records and BM25 parameters; `retriever.json` holds the
//! retriever settings. Tombstoned ordinals are compacted away on write.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ragdb_core::error::{Error, Result};
use ragdb_core::types::Document;

use crate::index::{Bm25Params, LexicalIndex, Posting, RetrieverSettings};
use crate::stopwords::builtin_cn_stopwords;
use crate::tokenizer::MixedTokenizer;

pub const INDEX_FILE: &str = "index.json";
pub const RETRIEVER_FILE: &str = "retriever.json";

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    params: Bm25Params,
    corpus: Vec<Document>,
    doc_lens: Vec<u32>,
    /// term -> [(ordinal, term frequency)]
    postings: BTreeMap<String, Vec<(u32, u32)>>,
}

impl LexicalIndex {
    pub fn persist(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let mut remap: Vec<Option<u32>> = Vec::with_capacity(self.corpus.len());
        let mut corpus = Vec::new();
        let mut doc_lens = Vec::new();
        for (ord, doc) in self.corpus.iter().enumerate() {
            if self.live[ord] {
                remap.push(Some(corpus.len() as u32));
                corpus.push(doc.clone());
                doc_lens.push(self.doc_lens[ord]);
            } else {
                remap.push(None);
            }
        }
        let mut postings = BTreeMap::new();
        for (term, list) in &self.postings {
            let compacted: Vec<(u32, u32)> =
                list.iter().filter_map(|p| remap[p.ord as usize].map(|ord| (ord, p.tf))).collect();
            if !compacted.is_empty() { postings.insert(term.clone(), compacted); }
        }

        let persisted = PersistedIndex { version: FORMAT_VERSION, params: self.params, corpus, doc_lens, postings };
        write_json(&dir.join(INDEX_FILE), &persisted)?;
        write_json(&dir.join(RETRIEVER_FILE), &self.settings)?;
        debug!(dir = %dir.display(), documents = persisted.corpus.len(), terms = persisted.postings.len(), "lexical index persisted");
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> { Self::load_with_stopwords(dir, builtin_cn_stopwords()) }

    pub fn load_with_stopwords(dir: &Path, cn_stopwords: Arc<HashSet<String>>) -> Result<Self> {
        let settings: RetrieverSettings = read_json(&dir.join(RETRIEVER_FILE))?;
        let persisted: PersistedIndex = read_json(&dir.join(INDEX_FILE))?;
        if persisted.version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!("unknown lexical index format version {}", persisted.version)));
        }
        let n = persisted.corpus.len();
        if persisted.doc_lens.len() != n {
            return Err(Error::CorruptIndex(format!("{} document lengths for {} documents", persisted.doc_lens.len(), n)));
        }

        let tokenizer = MixedTokenizer::with_options(settings.skip_stemming, cn_stopwords)?;
        let mut index = LexicalIndex::from_parts(tokenizer, settings, persisted.params);
        for (ord, doc) in persisted.corpus.iter().enumerate() {
            if index.by_id.insert(doc.id.clone(), ord as u32).is_some() {
                return Err(Error::CorruptIndex(format!("duplicate document id `{}` in lexical index", doc.id)));
            }
        }
        let mut postings = HashMap::with_capacity(persisted.postings.len());
        for (term, list) in persisted.postings {
            if let Some((ord, _)) = list.iter().find(|(ord, _)| *ord as usize >= n) {
                return Err(Error::CorruptIndex(format!("posting for `{term}` points at missing ordinal {ord}")));
            }
            postings.insert(term, list.into_iter().map(|(ord, tf)| Posting { ord, tf }).collect());
        }
        index.postings = postings;
        index.doc_lens = persisted.doc_lens;
        index.live = vec![true; n];
        index.corpus = persisted.corpus;
        Ok(index)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::CorruptIndex(format!("missing {}", path.display())),
        _ => Error::Io(e),
    })?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::CorruptIndex(format!("unreadable {}: {}", path.display(), e)))
}
