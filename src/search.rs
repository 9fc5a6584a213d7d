//! `argo search`: rank index documents against a query.
//!
//! With an embedding provider configured the query is embedded and
//! documents are ranked by cosine similarity; otherwise ranking is by the
//! share of query terms found in the document text.

use anyhow::Result;
use argo_core::store::{IndexHit, IndexStore};

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, embed_query};
use crate::migrate;
use crate::sqlite_store::SqliteIndexStore;

pub const DEFAULT_LIMIT: usize = 10;

/// Run a search against `store`; vector mode when `embedder` is given.
pub async fn search(
    store: &dyn IndexStore,
    embedder: Option<&dyn argo_core::embedding::Embedder>,
    query: &str,
    limit: usize,
) -> Result<Vec<IndexHit>> {
    if query.trim().is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    match embedder {
        Some(embedder) => {
            let query_vec = embed_query(embedder, query).await?;
            store.vector_search(&query_vec, limit).await
        }
        None => store.keyword_search(query, limit).await,
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let store = SqliteIndexStore::new(pool.clone());
    let embedder = create_embedder(&config.embedding)?;
    let hits = search(
        &store,
        embedder.as_deref(),
        query,
        limit.unwrap_or(DEFAULT_LIMIT),
    )
    .await?;

    if hits.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    let mode = if embedder.is_some() { "vector" } else { "keyword" };
    for (i, hit) in hits.iter().enumerate() {
        let platform = hit
            .metadata
            .get("platform_id")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".to_string());
        let date = hit
            .metadata
            .get("date")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        println!(
            "{}. [{:.3}] profile {}  float {}  {}  ({})",
            i + 1,
            hit.score,
            hit.id,
            platform,
            date,
            mode
        );
        println!("   {}", snippet(&hit.document, 240));
    }

    pool.close().await;
    Ok(())
}
