//! Index pipeline: database → feature engine → composer → index store.
//!
//! Profiles are read in keyset-paginated pages ordered by `profile_id`.
//! Each page becomes one batch: documents are composed, optionally
//! embedded, and upserted as a unit. Re-running overwrites documents by
//! id; it never duplicates them.
//!
//! Embedding is non-fatal. A batch whose embedding call fails is still
//! upserted, without new vectors, and counted as pending.

use std::collections::HashMap;

use anyhow::{Context, Result};
use argo_core::compose::{compose_document, Batcher, IndexDocument, ProfileContext};
use argo_core::embedding::Embedder;
use argo_core::features::{derive_metrics, ProfileSeries};
use argo_core::store::{Embedding, IndexEntry, IndexStore};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::config::{self, Config};
use crate::db;
use crate::embedding::create_embedder;
use crate::geocode::GeocodeCache;
use crate::migrate;
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::sqlite_store::SqliteIndexStore;

/// Totals of an index run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub profiles: u64,
    pub batches: u64,
    pub documents_upserted: u64,
    pub embeddings_written: u64,
    pub embeddings_reused: u64,
    pub embeddings_pending: u64,
}

#[derive(Debug, Clone)]
struct ProfileRow {
    profile_id: i64,
    platform_id: i64,
    cycle_number: i32,
    profile_date: Option<DateTime<Utc>>,
    latitude: f64,
    longitude: f64,
    float_type: Option<String>,
}

async fn fetch_profile_page(pool: &SqlitePool, after_id: i64, limit: usize) -> Result<Vec<ProfileRow>> {
    let rows = sqlx::query(
        r#"
        SELECT p.profile_id, p.platform_id, p.cycle_number, p.profile_date,
               p.latitude, p.longitude, f.float_type
        FROM profiles p
        LEFT JOIN floats f ON f.platform_id = p.platform_id
        WHERE p.profile_id > ?
        ORDER BY p.profile_id
        LIMIT ?
        "#,
    )
    .bind(after_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<ProfileRow> {
            Ok(ProfileRow {
                profile_id: row.try_get("profile_id")?,
                platform_id: row.try_get("platform_id")?,
                cycle_number: row.try_get("cycle_number")?,
                profile_date: row.try_get("profile_date")?,
                latitude: row.try_get("latitude")?,
                longitude: row.try_get("longitude")?,
                float_type: row.try_get("float_type")?,
            })
        })
        .collect()
}

/// Measurement series for every profile id in `first..=last`.
async fn fetch_series(pool: &SqlitePool, first: i64, last: i64) -> Result<HashMap<i64, ProfileSeries>> {
    let rows = sqlx::query(
        r#"
        SELECT profile_id, pressure, temperature, salinity, doxy
        FROM measurements
        WHERE profile_id BETWEEN ? AND ?
        ORDER BY profile_id, pressure
        "#,
    )
    .bind(first)
    .bind(last)
    .fetch_all(pool)
    .await?;

    let mut series: HashMap<i64, ProfileSeries> = HashMap::new();
    for row in &rows {
        let profile_id: i64 = row.try_get("profile_id")?;
        series.entry(profile_id).or_default().push(
            row.try_get("pressure")?,
            row.try_get("temperature")?,
            row.try_get("salinity")?,
            row.try_get("doxy")?,
        );
    }
    Ok(series)
}

/// One index run over the database.
pub struct IndexPipeline<'a> {
    pub pool: &'a SqlitePool,
    pub store: &'a dyn IndexStore,
    pub embedder: Option<&'a dyn Embedder>,
    /// Texts per embedding request.
    pub embed_batch_size: usize,
    /// Documents per upsert; also the profile page size.
    pub batch_size: usize,
    /// Compose and count only; nothing is geocoded, embedded or written.
    pub dry_run: bool,
}

impl IndexPipeline<'_> {
    pub async fn run(
        &self,
        geocode: &mut GeocodeCache,
        reporter: &dyn ProgressReporter,
    ) -> Result<IndexSummary> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(self.pool)
            .await?;
        let mut summary = IndexSummary::default();
        let mut batcher = Batcher::new(self.batch_size);
        let mut after_id = 0i64;

        loop {
            let page = fetch_profile_page(self.pool, after_id, self.batch_size).await?;
            let (Some(first), Some(last)) = (page.first(), page.last()) else {
                break;
            };
            let mut series = fetch_series(self.pool, first.profile_id, last.profile_id).await?;
            after_id = last.profile_id;

            for row in page {
                let metrics = derive_metrics(&series.remove(&row.profile_id).unwrap_or_default());
                let place_name = if self.dry_run {
                    None
                } else {
                    geocode.place_name(row.latitude, row.longitude).await
                };
                let ctx = ProfileContext {
                    profile_id: row.profile_id,
                    platform_id: row.platform_id,
                    cycle_number: row.cycle_number,
                    profile_date: row.profile_date,
                    latitude: row.latitude,
                    longitude: row.longitude,
                    float_type: row.float_type,
                    place_name,
                };
                summary.profiles += 1;
                if let Some(batch) = batcher.push(compose_document(&ctx, &metrics)) {
                    self.flush(batch, &mut summary).await?;
                }
            }

            reporter.report(ProgressEvent::Indexing {
                n: summary.profiles,
                total: total.max(0) as u64,
            });
        }

        if let Some(batch) = batcher.finish() {
            self.flush(batch, &mut summary).await?;
        }
        Ok(summary)
    }

    async fn flush(&self, docs: Vec<IndexDocument>, summary: &mut IndexSummary) -> Result<()> {
        summary.batches += 1;
        if self.dry_run {
            return Ok(());
        }

        let mut vectors: HashMap<String, Vec<f32>> = HashMap::new();
        let mut model = None;
        if let Some(embedder) = self.embedder {
            let stale = self.store.needs_embedding(&docs, embedder.model_name()).await?;
            summary.embeddings_reused += (docs.len() - stale.len()) as u64;
            let todo: Vec<&IndexDocument> = docs.iter().filter(|d| stale.contains(&d.id)).collect();

            for chunk in todo.chunks(self.embed_batch_size.max(1)) {
                let texts: Vec<String> = chunk.iter().map(|d| d.document.clone()).collect();
                match embedder.embed(&texts).await {
                    Ok(vecs) => {
                        summary.embeddings_written += vecs.len() as u64;
                        for (doc, vec) in chunk.iter().zip(vecs) {
                            vectors.insert(doc.id.clone(), vec);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(documents = chunk.len(), error = %e, "embedding failed; documents left pending");
                        summary.embeddings_pending += chunk.len() as u64;
                    }
                }
            }
            model = Some(embedder.model_name().to_string());
        }

        let entries: Vec<IndexEntry> = docs
            .into_iter()
            .map(|doc| {
                let vector = vectors.remove(&doc.id);
                let entry = IndexEntry::new(doc);
                match (vector, &model) {
                    (Some(vector), Some(model)) => entry.with_embedding(Embedding {
                        model: model.clone(),
                        vector,
                    }),
                    _ => entry,
                }
            })
            .collect();

        self.store.upsert(&entries).await?;
        summary.documents_upserted += entries.len() as u64;
        Ok(())
    }
}

pub async fn run_index(
    config: &Config,
    batch_size: Option<usize>,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    let batch_size = batch_size.unwrap_or(config.index.batch_size);
    config::validate_index_batch_size(batch_size)?;

    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let store = SqliteIndexStore::new(pool.clone());
    let embedder = if dry_run {
        None
    } else {
        create_embedder(&config.embedding)?
    };
    let mut geocode = if dry_run {
        GeocodeCache::disabled()
    } else {
        GeocodeCache::from_config(&config.geocoding).context("Failed to set up geocoding")?
    };
    let reporter = progress.reporter();

    let pipeline = IndexPipeline {
        pool: &pool,
        store: &store,
        embedder: embedder.as_deref(),
        embed_batch_size: config.embedding.batch_size,
        batch_size,
        dry_run,
    };
    let summary = pipeline.run(&mut geocode, reporter.as_ref()).await?;

    if dry_run {
        println!("index (dry-run)");
        println!("  profiles: {}", summary.profiles);
        println!("  batches: {}", summary.batches);
    } else {
        println!("index");
        println!("  profiles: {}", summary.profiles);
        println!("  documents upserted: {}", summary.documents_upserted);
        println!("  batches: {}", summary.batches);
        if embedder.is_some() {
            println!("  embeddings written: {}", summary.embeddings_written);
            println!("  embeddings reused: {}", summary.embeddings_reused);
            println!("  embeddings pending: {}", summary.embeddings_pending);
        }
        if config.geocoding.enabled {
            println!("  geocoder calls: {}", geocode.calls());
        }
    }
    println!("ok");

    pool.close().await;
    Ok(())
}
