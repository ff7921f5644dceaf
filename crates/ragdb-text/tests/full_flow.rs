use ragdb_core::traits::Retriever;
use ragdb_core::types::{Document, RankedResult};
use ragdb_text::{segments, LexicalIndex, MixedTokenizer, RetrieverSettings, SegmentKind};
use tempfile::TempDir;

fn fox_corpus() -> Vec<Document> {
    vec![
        Document::new("doc1", "The quick brown fox"),
        Document::new("doc2", "快速的棕色狐狸"),
        Document::new("doc3", "A slow green turtle"),
    ]
}

fn ids(results: &[RankedResult]) -> Vec<String> { results.iter().map(|r| r.id().to_string()).collect() }

fn assert_non_increasing(results: &[RankedResult]) {
    for pair in results.windows(2) { assert!(pair[0].score >= pair[1].score, "{} < {}", pair[0].score, pair[1].score); }
}

#[test]
fn lexical_fox_scenario() {
    let index = LexicalIndex::build(fox_corpus(), RetrieverSettings::default()).expect("build");

    let hits = index.query("quick fox", 3);
    let pos = |id: &str| hits.iter().position(|h| h.id() == id).expect("present");
    assert!(pos("doc1") < pos("doc3"));
    assert_eq!(hits[0].id(), "doc1");
    assert!(hits[0].score > 0.0);

    let hits = index.query("棕色", 3);
    assert_eq!(hits[0].id(), "doc2");
    assert!(hits[0].score > 0.0);
}

#[test]
fn k_is_clamped_and_scores_are_ordered() {
    let index = LexicalIndex::build(fox_corpus(), RetrieverSettings::default()).unwrap();
    for k in [0usize, 1, 2, 3, 50] {
        let hits = index.query("brown fox turtle 狐狸", k);
        assert!(hits.len() <= k.min(3));
        assert_non_increasing(&hits);
    }
    assert_eq!(index.query("brown", 50).len(), 3);
}

#[test]
fn persisted_index_answers_identically() {
    let tmp = TempDir::new().unwrap();
    let mut index = LexicalIndex::build(fox_corpus(), RetrieverSettings { similarity_top_k: 2, ..Default::default() }).unwrap();
    index.insert(vec![
        Document::new("doc4", "Brown bears and brown foxes share the forest"),
        Document::new("doc3", "A slow green turtle, now rewritten about a fox"),
    ]);
    index.persist(tmp.path()).expect("persist");
    let loaded = LexicalIndex::load(tmp.path()).expect("load");

    assert_eq!(loaded.settings().similarity_top_k, 2);
    assert_eq!(loaded.document_ids(), index.document_ids());
    for q in ["quick fox", "棕色", "brown", "turtle forest", "狐狸 fox", "nothing-matches-here"] {
        let a = index.query(q, 10);
        let b = loaded.query(q, 10);
        assert_eq!(ids(&a), ids(&b), "query {q}");
        let sa: Vec<f32> = a.iter().map(|r| r.score).collect();
        let sb: Vec<f32> = b.iter().map(|r| r.score).collect();
        assert_eq!(sa, sb, "query {q}");
    }
    assert_eq!(loaded.query_default("brown").len(), 2);
}

#[test]
fn insert_order_does_not_matter_after_reload() {
    let ab = vec![Document::new("a", "rust borrow checker"), Document::new("b", "检索增强生成")];
    let c = vec![Document::new("c", "borrow semantics in 检索 systems")];

    let tmp1 = TempDir::new().unwrap();
    let mut first = LexicalIndex::build(ab.clone(), RetrieverSettings::default()).unwrap();
    first.insert(c.clone());
    first.persist(tmp1.path()).unwrap();

    let tmp2 = TempDir::new().unwrap();
    let mut second = LexicalIndex::build(c, RetrieverSettings::default()).unwrap();
    second.insert(ab);
    second.persist(tmp2.path()).unwrap();

    let first = LexicalIndex::load(tmp1.path()).unwrap();
    let second = LexicalIndex::load(tmp2.path()).unwrap();
    assert_eq!(first.document_ids(), second.document_ids());
    for q in ["borrow", "检索", "rust systems"] {
        let a: Vec<(String, f32)> = first.query(q, 10).into_iter().map(|r| (r.id().to_string(), r.score)).collect();
        let b: Vec<(String, f32)> = second.query(q, 10).into_iter().map(|r| (r.id().to_string(), r.score)).collect();
        assert_eq!(a, b, "query {q}");
    }
}

#[test]
fn tied_scores_rank_the_same_whatever_the_insert_order() {
    let ab = vec![Document::new("a", "apple pie"), Document::new("b", "banana bread")];
    let c = vec![Document::new("c", "apple tart")];

    let tmp1 = TempDir::new().unwrap();
    let mut first = LexicalIndex::build(ab.clone(), RetrieverSettings::default()).unwrap();
    first.insert(c.clone());
    first.persist(tmp1.path()).unwrap();

    let tmp2 = TempDir::new().unwrap();
    let mut second = LexicalIndex::build(c, RetrieverSettings::default()).unwrap();
    second.insert(ab);
    second.persist(tmp2.path()).unwrap();

    let first = LexicalIndex::load(tmp1.path()).unwrap();
    let second = LexicalIndex::load(tmp2.path()).unwrap();
    for k in [1, 2, 3] {
        let a = first.query("apple", k);
        let b = second.query("apple", k);
        assert_eq!(ids(&a), ids(&b), "k = {k}");
    }
    let top = first.query("apple", 2);
    assert_eq!(ids(&top), vec!["a", "c"]);
    assert_eq!(top[0].score, top[1].score);
}

#[test]
fn reindexed_id_never_returns_old_content() {
    let tmp = TempDir::new().unwrap();
    let mut index = LexicalIndex::build(fox_corpus(), RetrieverSettings::default()).unwrap();
    index.insert(vec![Document::new("doc1", "An entirely different paragraph about databases")]);

    for q in ["quick fox", "databases", "brown"] {
        for hit in index.query(q, 10) {
            if hit.id() == "doc1" { assert!(hit.document.text.contains("databases")); }
        }
    }
    assert_eq!(index.len(), 3);

    index.persist(tmp.path()).unwrap();
    let loaded = LexicalIndex::load(tmp.path()).unwrap();
    assert_eq!(loaded.len(), 3);
    assert!(loaded.get("doc1").unwrap().text.contains("databases"));
}

#[test]
fn mixed_text_tokens_follow_segments() {
    let tokenizer = MixedTokenizer::new().unwrap();
    let english_only = "Retrieval augmented generation";
    assert!(segments(english_only).iter().all(|s| s.kind != SegmentKind::Cjk));
    let chinese_only = "检索增强生成";
    assert!(segments(chinese_only).iter().all(|s| s.kind == SegmentKind::Cjk));

    let mixed = format!("{english_only}{chinese_only}");
    let mut expected = tokenizer.tokenize(english_only);
    expected.extend(tokenizer.tokenize(chinese_only));
    assert_eq!(tokenizer.tokenize(&mixed), expected);
}

#[tokio::test]
async fn index_serves_as_a_retriever() {
    let index = LexicalIndex::build(fox_corpus(), RetrieverSettings::default()).unwrap();
    let retriever: &dyn Retriever = &index;
    assert_eq!(retriever.name(), "bm25");
    let hits = retriever.retrieve("turtle", 1).await.unwrap();
    assert_eq!(ids(&hits), vec!["doc3".to_string()]);
    assert!(retriever.retrieve("", 5).await.unwrap().is_empty());
}
