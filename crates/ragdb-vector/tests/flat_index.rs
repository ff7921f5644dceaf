use std::sync::Arc;

use ragdb_core::embed_config::EmbeddingConfig;
use ragdb_core::traits::{Embedder, VectorIndexService};
use ragdb_core::types::{Document, SourceKind};
use ragdb_embed::HashingEmbedder;
use ragdb_vector::{FlatVectorService, VECTORS_FILE};

fn corpus() -> Vec<Document> {
    vec![
        Document::new("doc1", "The quick brown fox"),
        Document::new("doc2", "快速的棕色狐狸"),
        Document::new("doc3", "A slow green turtle"),
    ]
}

fn service() -> FlatVectorService { FlatVectorService::with_embedder(Arc::new(HashingEmbedder::new(256))) }

fn config() -> EmbeddingConfig { EmbeddingConfig::new("ollama", "") }

#[tokio::test]
async fn nearest_document_comes_first() -> anyhow::Result<()> {
    let index = service().build(&corpus(), &config()).await?;
    let hits = index.query("quick brown fox", 3).await?;
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "doc1");
    assert!(hits.iter().all(|h| h.source == SourceKind::Vector));
    for pair in hits.windows(2) { assert!(pair[0].score >= pair[1].score); }

    let hits = index.query("棕色狐狸", 1).await?;
    assert_eq!(hits[0].id, "doc2");
    assert_eq!(index.query("fox", 50).await?.len(), 3);
    assert!(index.query("", 3).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn insert_replaces_existing_ids() -> anyhow::Result<()> {
    let mut index = service().build(&corpus(), &config()).await?;
    index.insert(&[Document::new("doc3", "brown fox den"), Document::new("doc4", "green meadow")]).await?;
    let mut ids = index.document_ids();
    ids.sort();
    assert_eq!(ids, vec!["doc1", "doc2", "doc3", "doc4"]);
    let hits = index.query("slow turtle", 4).await?;
    let doc3 = hits.iter().find(|h| h.id == "doc3").expect("doc3");
    assert!(doc3.score < 0.5, "old turtle text must be gone");
    Ok(())
}

#[tokio::test]
async fn persisted_vectors_reload_identically() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let svc = service();
    let index = svc.build(&corpus(), &config()).await?;
    index.persist(tmp.path())?;
    assert!(tmp.path().join(VECTORS_FILE).exists());

    let loaded = svc.load(tmp.path(), &config()).await?;
    assert_eq!(loaded.document_ids(), index.document_ids());
    let a = index.query("green turtle", 3).await?;
    let b = loaded.query("green turtle", 3).await?;
    assert_eq!(a.iter().map(|h| (&h.id, h.score)).collect::<Vec<_>>(), b.iter().map(|h| (&h.id, h.score)).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn loading_with_another_embedder_is_refused() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index = service().build(&corpus(), &config()).await?;
    index.persist(tmp.path())?;

    let other: Arc<dyn Embedder> = Arc::new(HashingEmbedder::with_label("other", 256));
    let err = FlatVectorService::with_embedder(other).load(tmp.path(), &config()).await.err().expect("refused");
    assert!(err.to_string().contains("refusing"));
    Ok(())
}

#[tokio::test]
async fn embedder_follows_the_configuration_in_fake_mode() -> anyhow::Result<()> {
    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");
    let index = FlatVectorService::new().build(&corpus(), &EmbeddingConfig::new("voyage", "")).await?;
    assert_eq!(index.document_ids().len(), 3);
    assert!(FlatVectorService::new().build(&corpus(), &EmbeddingConfig::new("nope", "")).await.is_err());
    Ok(())
}

#[tokio::test]
async fn identical_vectors_rank_by_id_not_insert_order() -> anyhow::Result<()> {
    let twins = [Document::new("zeta", "river otter"), Document::new("mu", "river otter")];
    let mut forward = service().build(&twins[..1], &config()).await?;
    forward.insert(&twins[1..]).await?;
    let mut backward = service().build(&twins[1..], &config()).await?;
    backward.insert(&twins[..1]).await?;

    for index in [&forward, &backward] {
        let hits = index.query("otter", 2).await?;
        assert_eq!(hits[0].score, hits[1].score);
        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["mu", "zeta"]);
        assert_eq!(index.query("otter", 1).await?[0].id, "mu");
    }
    Ok(())
}
