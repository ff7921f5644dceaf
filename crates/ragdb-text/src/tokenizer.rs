//! Mixed Chinese/English tokenization.
//!
//! Text is cut into maximal ASCII word runs (`[A-Za-z0-9_]+`) and the spans
//! between them. Word runs go through a tantivy analyzer (word pattern,
//! lower-casing, English stopwords, Snowball stemming). Spans holding any
//! non-ASCII character go through jieba's search-mode segmentation with the
//! Chinese stopword list applied. Spans of pure ASCII punctuation/whitespace
//! carry no tokens.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use jieba_rs::Jieba;
use tantivy::tokenizer::{Language, LowerCaser, RegexTokenizer, Stemmer, StopWordFilter, TextAnalyzer, TokenStream};

use ragdb_core::error::{Error, Result};

use crate::stopwords::{builtin_cn_stopwords, builtin_en_stopwords};

static JIEBA: LazyLock<Jieba> = LazyLock::new(Jieba::new);

/// Tokens are runs of at least two word characters.
const WORD_PATTERN: &str = r"\w\w+";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// ASCII letters, digits and underscore.
    Word,
    /// A non-word span containing at least one non-ASCII character.
    Cjk,
    /// A non-word span made only of ASCII whitespace/punctuation.
    Separator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub kind: SegmentKind,
}

fn is_word_char(c: char) -> bool { c.is_ascii_alphanumeric() || c == '_' }

/// Split `text` into alternating word/non-word segments. Concatenating the
/// segment texts always gives back `text`.
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_word: Option<bool> = None;
    for (i, c) in text.char_indices() {
        let word = is_word_char(c);
        match in_word {
            Some(prev) if prev != word => {
                out.push(classify(&text[start..i], prev));
                start = i;
            }
            _ => {}
        }
        in_word = Some(word);
    }
    if let Some(prev) = in_word { out.push(classify(&text[start..], prev)); }
    out
}

fn classify(text: &str, word: bool) -> Segment<'_> {
    let kind = if word {
        SegmentKind::Word
    } else if text.is_ascii() {
        SegmentKind::Separator
    } else {
        SegmentKind::Cjk
    };
    Segment { text, kind }
}

#[derive(Clone)]
pub struct MixedTokenizer {
    english: TextAnalyzer,
    cn_stopwords: Arc<HashSet<String>>,
    skip_stemming: bool,
}

impl MixedTokenizer {
    /// Stemming on, built-in Chinese stopwords.
    pub fn new() -> Result<Self> { Self::with_options(false, builtin_cn_stopwords()) }

    pub fn with_options(skip_stemming: bool, cn_stopwords: Arc<HashSet<String>>) -> Result<Self> {
        let words = RegexTokenizer::new(WORD_PATTERN).map_err(|e| Error::Operation(format!("word pattern: {e}")))?;
        let stop = StopWordFilter::remove(builtin_en_stopwords());
        let base = TextAnalyzer::builder(words).filter(LowerCaser).filter(stop);
        let english = if skip_stemming { base.build() } else { base.filter(Stemmer::new(Language::English)).build() };
        Ok(Self { english, cn_stopwords, skip_stemming })
    }

    pub fn skip_stemming(&self) -> bool { self.skip_stemming }

    pub fn cn_stopwords(&self) -> &Arc<HashSet<String>> { &self.cn_stopwords }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for segment in segments(text) {
            match segment.kind {
                SegmentKind::Word => tokens.extend(self.tokenize_english(segment.text)),
                SegmentKind::Cjk => tokens.extend(self.tokenize_chinese(segment.text)),
                SegmentKind::Separator => {}
            }
        }
        tokens
    }

    pub fn tokenize_english(&self, segment: &str) -> Vec<String> {
        let mut analyzer = self.english.clone();
        let mut stream = analyzer.token_stream(segment);
        let mut tokens = Vec::new();
        while stream.advance() {
            let text = &stream.token().text;
            if !text.is_empty() { tokens.push(text.clone()); }
        }
        tokens
    }

    pub fn tokenize_chinese(&self, segment: &str) -> Vec<String> {
        JIEBA
            .cut_for_search(segment, true)
            .into_iter()
            .map(str::trim)
            .filter(|t| t.chars().any(char::is_alphanumeric))
            .filter(|t| !self.cn_stopwords.contains(*t))
            .map(str::to_string)
            .collect()
    }
}

impl std::fmt::Debug for MixedTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixedTokenizer")
            .field("skip_stemming", &self.skip_stemming)
            .field("cn_stopwords", &self.cn_stopwords.len())
            .finish()
    }
}
