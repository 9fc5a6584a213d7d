mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use argo_core::assemble::FloatType;
use argo_core::compose::MISSING_VALUE;
use argo_core::embedding::Embedder;
use argo_core::store::memory::InMemoryIndexStore;
use argo_core::store::IndexStore;
use argo_harness::geocode::{GeocodeCache, Geocoder};
use argo_harness::index::{IndexPipeline, IndexSummary};
use argo_harness::ingest::ingest_all;
use argo_harness::progress::NoProgress;
use argo_harness::search::search;
use argo_harness::sqlite_store::SqliteIndexStore;
use async_trait::async_trait;
use common::*;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Deterministic embedder: the vector encodes the text length.
#[derive(Default)]
struct LengthEmbedder {
    texts: AtomicUsize,
}

#[async_trait]
impl Embedder for LengthEmbedder {
    fn model_name(&self) -> &str {
        "length-3"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0, 0.5]).collect())
    }
}

struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    fn model_name(&self) -> &str {
        "down"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("connection refused")
    }
}

struct FixedPlace;

#[async_trait]
impl Geocoder for FixedPlace {
    async fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<Option<String>> {
        Ok(Some("Arabian Sea, Indian Ocean".to_string()))
    }
}

/// Two BGC profiles of one float and one undated core profile.
async fn seeded_pool() -> (TempDir, SqlitePool) {
    let (tmp, pool) = test_pool().await;
    let mut opener = MapOpener::default();
    let bgc = add_float(
        &mut opener,
        2902746,
        FloatType::Bgc,
        meta_archive("2902746"),
        profile_archive(&[Cast::new(1.0, 12.3, 65.1), Cast::new(2.0, 12.5, 65.4)]),
    );
    let mut undated = Cast::new(7.0, -20.0, 100.0);
    undated.juld = None;
    let core = add_float(
        &mut opener,
        5906001,
        FloatType::Core,
        meta_archive("5906001"),
        profile_archive(&[undated]),
    );
    ingest_all(&pool, &opener, &[bgc, core], &NoProgress).await.unwrap();
    (tmp, pool)
}

fn pipeline<'a>(
    pool: &'a SqlitePool,
    store: &'a dyn IndexStore,
    embedder: Option<&'a dyn Embedder>,
) -> IndexPipeline<'a> {
    IndexPipeline {
        pool,
        store,
        embedder,
        embed_batch_size: 2,
        batch_size: 2,
        dry_run: false,
    }
}

async fn run(p: &IndexPipeline<'_>) -> IndexSummary {
    p.run(&mut GeocodeCache::disabled(), &NoProgress).await.unwrap()
}

#[tokio::test]
async fn index_composes_one_document_per_profile() {
    let (_tmp, pool) = seeded_pool().await;
    let store = InMemoryIndexStore::new();

    let summary = run(&pipeline(&pool, &store, None)).await;
    assert_eq!(summary.profiles, 3);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.documents_upserted, 3);
    assert_eq!(store.count().await.unwrap(), (3, 0));

    let first = store.get("1").await.unwrap().unwrap();
    assert!(first
        .document
        .starts_with("An oceanographic profile from a Biogeochemical Argo float (ID 2902746)."));
    assert!(first.document.contains("Data collected on 2024-01-15 during cycle 1 in the Winter."));
    assert_eq!(first.metadata["float_type"], "BGC");
    assert_eq!(first.metadata["max_pressure"], 200.0);
    assert_eq!(first.metadata["sea_surface_temp"], 28.0);
    assert_eq!(first.metadata["mean_oxygen"], MISSING_VALUE);
}

#[tokio::test]
async fn undated_profile_gets_unknown_date_fields() {
    let (_tmp, pool) = seeded_pool().await;
    let store = InMemoryIndexStore::new();
    run(&pipeline(&pool, &store, None)).await;

    let undated = store.get("3").await.unwrap().unwrap();
    assert!(undated.document.contains("the observation date is unknown"));
    assert_eq!(undated.metadata["date"], "unknown");
    assert_eq!(undated.metadata["year"], -999);
    assert_eq!(undated.metadata["season"], "Unknown");
    assert_eq!(undated.metadata["float_type"], "core");
}

#[tokio::test]
async fn rerun_overwrites_instead_of_duplicating() {
    let (_tmp, pool) = seeded_pool().await;
    let store = SqliteIndexStore::new(pool.clone());

    run(&pipeline(&pool, &store, None)).await;
    run(&pipeline(&pool, &store, None)).await;

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM index_documents").await, 3);
    let stored = store.get("2").await.unwrap().unwrap();
    assert_eq!(stored.metadata["cycle_number"], 2);
}

#[tokio::test]
async fn unchanged_documents_reuse_their_vectors() {
    let (_tmp, pool) = seeded_pool().await;
    let store = SqliteIndexStore::new(pool.clone());
    let embedder = LengthEmbedder::default();

    let first = run(&pipeline(&pool, &store, Some(&embedder))).await;
    assert_eq!(first.embeddings_written, 3);
    assert_eq!(first.embeddings_reused, 0);
    assert_eq!(store.count().await.unwrap(), (3, 3));

    let second = run(&pipeline(&pool, &store, Some(&embedder))).await;
    assert_eq!(second.embeddings_written, 0);
    assert_eq!(second.embeddings_reused, 3);
    assert_eq!(embedder.texts.load(Ordering::SeqCst), 3);

    let stored = store.get("1").await.unwrap().unwrap();
    assert!(stored.has_embedding);
    assert_eq!(stored.embedding_model.as_deref(), Some("length-3"));
}

#[tokio::test]
async fn changed_content_drops_the_stale_vector() {
    let (_tmp, pool) = seeded_pool().await;
    let store = SqliteIndexStore::new(pool.clone());
    let embedder = LengthEmbedder::default();
    run(&pipeline(&pool, &store, Some(&embedder))).await;

    sqlx::query("UPDATE measurements SET temperature = 30.0 WHERE pressure = 5.0")
        .execute(&pool)
        .await
        .unwrap();
    run(&pipeline(&pool, &store, None)).await;

    assert_eq!(store.count().await.unwrap(), (3, 0));
    let stored = store.get("1").await.unwrap().unwrap();
    assert!(stored.document.contains("30.00°C"));
    assert!(!stored.has_embedding);
}

#[tokio::test]
async fn embedding_failure_leaves_documents_pending() {
    let (_tmp, pool) = seeded_pool().await;
    let store = SqliteIndexStore::new(pool.clone());

    let summary = run(&pipeline(&pool, &store, Some(&DownEmbedder))).await;
    assert_eq!(summary.documents_upserted, 3);
    assert_eq!(summary.embeddings_pending, 3);
    assert_eq!(summary.embeddings_written, 0);
    assert_eq!(store.count().await.unwrap(), (3, 0));
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let (_tmp, pool) = seeded_pool().await;
    let store = SqliteIndexStore::new(pool.clone());
    let embedder = LengthEmbedder::default();
    let mut p = pipeline(&pool, &store, Some(&embedder));
    p.dry_run = true;

    let summary = run(&p).await;
    assert_eq!(summary.profiles, 3);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.documents_upserted, 0);
    assert_eq!(embedder.texts.load(Ordering::SeqCst), 0);
    assert_eq!(store.count().await.unwrap(), (0, 0));
}

#[tokio::test]
async fn place_names_are_looked_up_once_per_bucket() {
    let (_tmp, pool) = seeded_pool().await;
    let store = InMemoryIndexStore::new();
    let mut geocode = GeocodeCache::new(Box::new(FixedPlace));

    pipeline(&pool, &store, None)
        .run(&mut geocode, &NoProgress)
        .await
        .unwrap();

    let first = store.get("1").await.unwrap().unwrap();
    assert!(first.document.contains("near Arabian Sea."));
    // Each seeded profile sits in its own 0.1° bucket.
    assert_eq!(geocode.calls(), 3);

    pipeline(&pool, &store, None)
        .run(&mut geocode, &NoProgress)
        .await
        .unwrap();
    assert_eq!(geocode.calls(), 3);
}

#[tokio::test]
async fn keyword_search_finds_indexed_profiles() {
    let (_tmp, pool) = seeded_pool().await;
    let store = SqliteIndexStore::new(pool.clone());
    run(&pipeline(&pool, &store, None)).await;

    let hits = search(&store, None, "biogeochemical float", 10).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(hits[0].score, 1.0);
    assert_eq!(hits[2].score, 0.5);
}

#[tokio::test]
async fn vector_search_ranks_by_similarity() {
    let (_tmp, pool) = seeded_pool().await;
    let store = SqliteIndexStore::new(pool.clone());
    let embedder = LengthEmbedder::default();
    run(&pipeline(&pool, &store, Some(&embedder))).await;

    let hits = search(&store, Some(&embedder), "salinity", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score);
}
