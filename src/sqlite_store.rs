//! SQLite-backed [`IndexStore`] over the `index_documents` table.
//!
//! Vectors are stored as little-endian `f32` BLOBs next to the document.
//! Vector and keyword search are brute force in Rust over the stored rows.

use std::collections::HashSet;

use anyhow::{Context, Result};
use argo_core::compose::IndexDocument;
use argo_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use argo_core::store::{query_terms, rank, term_score, IndexEntry, IndexHit, IndexStore, StoredDocument};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

pub struct SqliteIndexStore {
    pool: SqlitePool,
}

impl SqliteIndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_metadata(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let doc = &entry.doc;
            let metadata_json = serde_json::Value::Object(doc.metadata.clone()).to_string();
            let (blob, model) = match &entry.embedding {
                Some(e) => (Some(vec_to_blob(&e.vector)), Some(e.model.as_str())),
                None => (None, None),
            };

            // Without a fresh vector, keep the stored one only while the content is unchanged.
            sqlx::query(
                r#"
                INSERT INTO index_documents (id, document, metadata_json, content_hash, embedding, embedding_model, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = COALESCE(
                        excluded.embedding,
                        CASE WHEN index_documents.content_hash = excluded.content_hash
                             THEN index_documents.embedding END
                    ),
                    embedding_model = COALESCE(
                        excluded.embedding_model,
                        CASE WHEN index_documents.content_hash = excluded.content_hash
                             THEN index_documents.embedding_model END
                    ),
                    content_hash = excluded.content_hash,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.document)
            .bind(&metadata_json)
            .bind(doc.content_hash())
            .bind(blob)
            .bind(model)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert index document {}", doc.id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn needs_embedding(&self, docs: &[IndexDocument], model: &str) -> Result<HashSet<String>> {
        let mut stale: HashSet<String> = docs.iter().map(|d| d.id.clone()).collect();
        if docs.is_empty() {
            return Ok(stale);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, content_hash FROM index_documents WHERE embedding IS NOT NULL AND embedding_model = ",
        );
        qb.push_bind(model);
        qb.push(" AND id IN (");
        let mut ids = qb.separated(", ");
        for doc in docs {
            ids.push_bind(doc.id.as_str());
        }
        qb.push(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        for row in rows {
            let id: String = row.get("id");
            let hash: String = row.get("content_hash");
            if docs.iter().any(|d| d.id == id && d.content_hash() == hash) {
                stale.remove(&id);
            }
        }
        Ok(stale)
    }

    async fn get(&self, id: &str) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            r#"
            SELECT id, document, metadata_json, content_hash, embedding_model,
                   embedding IS NOT NULL AS has_embedding
            FROM index_documents WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let metadata_json: String = r.get("metadata_json");
            StoredDocument {
                id: r.get("id"),
                document: r.get("document"),
                metadata: parse_metadata(&metadata_json),
                content_hash: r.get("content_hash"),
                embedding_model: r.get("embedding_model"),
                has_embedding: r.get::<i64, _>("has_embedding") != 0,
            }
        }))
    }

    async fn count(&self) -> Result<(i64, i64)> {
        let row = sqlx::query("SELECT COUNT(*) AS total, COUNT(embedding) AS embedded FROM index_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok((row.get("total"), row.get("embedded")))
    }

    async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<IndexHit>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, document, metadata_json FROM index_documents")
            .fetch_all(&self.pool)
            .await?;

        let hits = rows
            .iter()
            .filter_map(|row| {
                let document: String = row.get("document");
                let score = term_score(&terms, &document);
                if score <= 0.0 {
                    return None;
                }
                let metadata_json: String = row.get("metadata_json");
                Some(IndexHit {
                    id: row.get("id"),
                    score,
                    document,
                    metadata: parse_metadata(&metadata_json),
                })
            })
            .collect();
        Ok(rank(hits, limit))
    }

    async fn vector_search(&self, query: &[f32], limit: usize) -> Result<Vec<IndexHit>> {
        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM index_documents WHERE embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let hits = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let metadata_json: String = row.get("metadata_json");
                IndexHit {
                    id: row.get("id"),
                    score: cosine_similarity(query, &blob_to_vec(&blob)) as f64,
                    document: row.get("document"),
                    metadata: parse_metadata(&metadata_json),
                }
            })
            .collect();
        Ok(rank(hits, limit))
    }
}
