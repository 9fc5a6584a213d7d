//! Index store abstraction.
//!
//! The [`IndexStore`] trait is what the index pipeline writes into and what
//! `argo search` reads from. Upserts are idempotent by document id: a
//! re-run replaces the document, it never duplicates it.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::compose::IndexDocument;

/// A vector for one document together with the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub model: String,
    pub vector: Vec<f32>,
}

/// One upsert unit.
///
/// When `embedding` is `None` the store keeps a previously stored vector
/// only if the document content is unchanged; otherwise the vector is
/// cleared so it can never describe stale text.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub doc: IndexDocument,
    pub embedding: Option<Embedding>,
}

impl IndexEntry {
    pub fn new(doc: IndexDocument) -> Self {
        Self {
            doc,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A document as held by the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Value,
    pub content_hash: String,
    pub embedding_model: Option<String>,
    pub has_embedding: bool,
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct IndexHit {
    pub id: String,
    pub score: f64,
    pub document: String,
    pub metadata: serde_json::Value,
}

/// Abstract index backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](IndexStore::upsert) | Insert or replace documents by id |
/// | [`needs_embedding`](IndexStore::needs_embedding) | Ids whose stored vector is stale or absent |
/// | [`get`](IndexStore::get) | Fetch one stored document |
/// | [`count`](IndexStore::count) | Total and embedded document counts |
/// | [`keyword_search`](IndexStore::keyword_search) | Term-match ranking over document text |
/// | [`vector_search`](IndexStore::vector_search) | Cosine similarity ranking |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert or replace every entry. Applied as one unit.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Ids of `docs` that have no stored vector for `model` matching their
    /// current content hash.
    async fn needs_embedding(&self, docs: &[IndexDocument], model: &str) -> Result<HashSet<String>>;

    async fn get(&self, id: &str) -> Result<Option<StoredDocument>>;

    /// `(documents, documents with a vector)`.
    async fn count(&self) -> Result<(i64, i64)>;

    async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<IndexHit>>;

    async fn vector_search(&self, query: &[f32], limit: usize) -> Result<Vec<IndexHit>>;
}

/// Lower-cased whitespace-separated query terms.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

/// Fraction of `terms` found in `text` (case-insensitive); `0.0` without terms.
pub fn term_score(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
    matched as f64 / terms.len() as f64
}

/// Sort hits by descending score (ties by id) and keep the top `limit`.
pub fn rank(mut hits: Vec<IndexHit>, limit: usize) -> Vec<IndexHit> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(limit);
    hits
}
