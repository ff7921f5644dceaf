//! ragdb-text
//!
//! Mixed Chinese/English tokenization and a BM25 lexical index with JSON
//! persistence.

pub mod index;
pub mod persist;
pub mod stopwords;
pub mod tokenizer;

pub use index::{Bm25Params, LexicalIndex, RetrieverSettings};
pub use stopwords::{builtin_cn_stopwords, load_cn_stopwords};
pub use tokenizer::{segments, MixedTokenizer, Segment, SegmentKind};
