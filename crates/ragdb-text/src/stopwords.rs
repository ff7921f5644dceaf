use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use ragdb_core::error::{Error, Result};

static BUILTIN_CN: &str = include_str!("../resources/cn_stopwords.txt");

static BUILTIN_EN: &str = include_str!("../resources/en_stopwords.txt");

static DEFAULT_CN_STOPWORDS: LazyLock<Arc<HashSet<String>>> = LazyLock::new(|| Arc::new(parse_stopwords(BUILTIN_CN)));

/// One word per line; blank lines are ignored and entries are trimmed.
pub fn parse_stopwords(raw: &str) -> HashSet<String> {
    raw.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
}

/// The Chinese stopword list compiled into the binary.
pub fn builtin_cn_stopwords() -> Arc<HashSet<String>> { Arc::clone(&DEFAULT_CN_STOPWORDS) }

/// English stopwords applied before stemming, same set as bm25s `"english"`.
pub fn builtin_en_stopwords() -> Vec<String> { BUILTIN_EN.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect() }

/// Load a replacement list from disk. Meant to run once at startup; the
/// returned set is shared by every tokenizer built from it.
pub fn load_cn_stopwords(path: &Path) -> Result<Arc<HashSet<String>>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidConfig(format!("cannot read stopword list {}: {}", path.display(), e)))?;
    Ok(Arc::new(parse_stopwords(&raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_list_has_common_particles() {
        let words = builtin_cn_stopwords();
        for w in ["的", "了", "，", "。"] { assert!(words.contains(w), "missing {w}"); }
        assert!(!words.contains("棕色"));
    }

    #[test]
    fn english_list_is_the_short_lucene_set() {
        let words = builtin_en_stopwords();
        assert_eq!(words.len(), 33);
        for w in ["the", "and", "with", "such"] { assert!(words.iter().any(|x| x == w), "missing {w}"); }
        assert!(!words.iter().any(|x| x == "what"));
    }

    #[test]
    fn parse_skips_blank_lines() {
        let words = parse_stopwords("的\n\n  了 \n");
        assert_eq!(words.len(), 2);
        assert!(words.contains("了"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_cn_stopwords(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(err.is_rejected_request());
    }
}
