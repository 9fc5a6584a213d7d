//! In-memory [`IndexStore`] for tests and dry runs.
//!
//! A `BTreeMap` behind `std::sync::RwLock`. Vector search is brute-force
//! cosine similarity over all stored vectors.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::compose::IndexDocument;
use crate::embedding::cosine_similarity;

use super::{query_terms, rank, term_score, Embedding, IndexEntry, IndexHit, IndexStore, StoredDocument};

struct Slot {
    doc: IndexDocument,
    content_hash: String,
    embedding: Option<Embedding>,
}

impl Slot {
    fn hit(&self, score: f64) -> IndexHit {
        IndexHit {
            id: self.doc.id.clone(),
            score,
            document: self.doc.document.clone(),
            metadata: serde_json::Value::Object(self.doc.metadata.clone()),
        }
    }
}

/// In-memory index store.
#[derive(Default)]
pub struct InMemoryIndexStore {
    slots: RwLock<BTreeMap<String, Slot>>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory index store lock poisoned")
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut slots = self.slots.write().map_err(|_| poisoned())?;
        for entry in entries {
            let content_hash = entry.doc.content_hash();
            let embedding = match &entry.embedding {
                Some(e) => Some(e.clone()),
                None => slots
                    .get(&entry.doc.id)
                    .filter(|s| s.content_hash == content_hash)
                    .and_then(|s| s.embedding.clone()),
            };
            slots.insert(
                entry.doc.id.clone(),
                Slot {
                    doc: entry.doc.clone(),
                    content_hash,
                    embedding,
                },
            );
        }
        Ok(())
    }

    async fn needs_embedding(&self, docs: &[IndexDocument], model: &str) -> Result<HashSet<String>> {
        let slots = self.slots.read().map_err(|_| poisoned())?;
        Ok(docs
            .iter()
            .filter(|doc| {
                !slots.get(&doc.id).is_some_and(|s| {
                    s.content_hash == doc.content_hash()
                        && s.embedding.as_ref().is_some_and(|e| e.model == model)
                })
            })
            .map(|doc| doc.id.clone())
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredDocument>> {
        let slots = self.slots.read().map_err(|_| poisoned())?;
        Ok(slots.get(id).map(|s| StoredDocument {
            id: s.doc.id.clone(),
            document: s.doc.document.clone(),
            metadata: serde_json::Value::Object(s.doc.metadata.clone()),
            content_hash: s.content_hash.clone(),
            embedding_model: s.embedding.as_ref().map(|e| e.model.clone()),
            has_embedding: s.embedding.is_some(),
        }))
    }

    async fn count(&self) -> Result<(i64, i64)> {
        let slots = self.slots.read().map_err(|_| poisoned())?;
        let embedded = slots.values().filter(|s| s.embedding.is_some()).count();
        Ok((slots.len() as i64, embedded as i64))
    }

    async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<IndexHit>> {
        let terms = query_terms(query);
        let slots = self.slots.read().map_err(|_| poisoned())?;
        let hits = slots
            .values()
            .filter_map(|s| {
                let score = term_score(&terms, &s.doc.document);
                (score > 0.0).then(|| s.hit(score))
            })
            .collect();
        Ok(rank(hits, limit))
    }

    async fn vector_search(&self, query: &[f32], limit: usize) -> Result<Vec<IndexHit>> {
        let slots = self.slots.read().map_err(|_| poisoned())?;
        let hits = slots
            .values()
            .filter_map(|s| {
                s.embedding
                    .as_ref()
                    .map(|e| s.hit(cosine_similarity(query, &e.vector) as f64))
            })
            .collect();
        Ok(rank(hits, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn doc(id: &str, text: &str) -> IndexDocument {
        IndexDocument {
            id: id.into(),
            document: text.into(),
            metadata: Map::new(),
        }
    }

    fn embedded(d: IndexDocument, v: Vec<f32>) -> IndexEntry {
        IndexEntry::new(d).with_embedding(Embedding {
            model: "m".into(),
            vector: v,
        })
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let store = InMemoryIndexStore::new();
        store.upsert(&[IndexEntry::new(doc("1", "first"))]).await.unwrap();
        store.upsert(&[IndexEntry::new(doc("1", "second"))]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), (1, 0));
        assert_eq!(store.get("1").await.unwrap().unwrap().document, "second");
    }

    #[tokio::test]
    async fn unchanged_document_keeps_vector() {
        let store = InMemoryIndexStore::new();
        store.upsert(&[embedded(doc("1", "text"), vec![1.0, 0.0])]).await.unwrap();
        store.upsert(&[IndexEntry::new(doc("1", "text"))]).await.unwrap();
        assert!(store.get("1").await.unwrap().unwrap().has_embedding);
        assert!(store.needs_embedding(&[doc("1", "text")], "m").await.unwrap().is_empty());

        store.upsert(&[IndexEntry::new(doc("1", "changed"))]).await.unwrap();
        assert!(!store.get("1").await.unwrap().unwrap().has_embedding);
        assert!(store.needs_embedding(&[doc("1", "changed")], "m").await.unwrap().contains("1"));
    }

    #[tokio::test]
    async fn other_model_needs_embedding() {
        let store = InMemoryIndexStore::new();
        store.upsert(&[embedded(doc("1", "text"), vec![1.0])]).await.unwrap();
        let stale = store.needs_embedding(&[doc("1", "text")], "other").await.unwrap();
        assert!(stale.contains("1"));
    }

    #[tokio::test]
    async fn searches_rank_documents() {
        let store = InMemoryIndexStore::new();
        store
            .upsert(&[
                embedded(doc("1", "warm surface in Summer"), vec![1.0, 0.0]),
                embedded(doc("2", "cold Winter profile"), vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.keyword_search("winter", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "2");

        let hits = store.vector_search(&[0.9, 0.1], 1).await.unwrap();
        assert_eq!(hits[0].id, "1");
    }
}
