//! In-memory [`VectorIndex`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Search is brute-force cosine distance over every record in the
//! collection.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::IndexedDocument;

use super::{CollectionInfo, QueryHit, VectorIndex};

struct StoredCollection {
    info: CollectionInfo,
    records: Vec<IndexedDocument>,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, StoredCollection>>,
    allow_reset: bool,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            allow_reset: true,
        }
    }

    /// Build an index whose [`reset`](VectorIndex::reset) is refused.
    pub fn without_reset() -> Self {
        Self {
            allow_reset: false,
            ..Self::new()
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let cols = self.collections.read().map_err(poisoned)?;
        Ok(cols.get(name).map(|c| c.info.clone()))
    }

    async fn create_collection(
        &self,
        name: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<CollectionInfo> {
        let mut cols = self.collections.write().map_err(poisoned)?;
        if cols.contains_key(name) {
            bail!("collection already exists: {}", name);
        }
        let info = CollectionInfo {
            name: name.to_string(),
            metadata: metadata.clone(),
        };
        cols.insert(
            name.to_string(),
            StoredCollection {
                info: info.clone(),
                records: Vec::new(),
            },
        );
        Ok(info)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let cols = self.collections.read().map_err(poisoned)?;
        cols.get(collection)
            .map(|c| c.records.len())
            .ok_or_else(|| anyhow!("collection does not exist: {}", collection))
    }

    async fn upsert(&self, collection: &str, records: &[IndexedDocument]) -> Result<()> {
        let mut cols = self.collections.write().map_err(poisoned)?;
        let stored = cols
            .get_mut(collection)
            .ok_or_else(|| anyhow!("collection does not exist: {}", collection))?;
        for record in records {
            match stored.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.records.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query_vec: &[f32],
        n_results: usize,
    ) -> Result<Vec<QueryHit>> {
        let cols = self.collections.read().map_err(poisoned)?;
        let stored = cols
            .get(collection)
            .ok_or_else(|| anyhow!("collection does not exist: {}", collection))?;

        let mut scored: Vec<(f32, &IndexedDocument)> = Vec::with_capacity(stored.records.len());
        for r in &stored.records {
            if r.embedding.len() != query_vec.len() {
                bail!(
                    "embedding dimension mismatch in collection {}: record {} has {} dims, query has {}",
                    collection,
                    r.id,
                    r.embedding.len(),
                    query_vec.len()
                );
            }
            scored.push((cosine_distance(query_vec, &r.embedding), r));
        }
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n_results);

        Ok(scored
            .into_iter()
            .map(|(distance, r)| QueryHit {
                id: r.id.clone(),
                document: Some(r.document.clone()),
                metadata: Some(r.metadata.clone()),
                distance: Some(distance),
            })
            .collect())
    }

    async fn reset(&self) -> Result<()> {
        if !self.allow_reset {
            bail!("reset is disabled for this index");
        }
        self.collections.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, document: &str, embedding: Vec<f32>) -> IndexedDocument {
        IndexedDocument {
            id: id.to_string(),
            document: document.to_string(),
            metadata: BTreeMap::new(),
            embedding,
        }
    }

    async fn index_with_collection() -> InMemoryIndex {
        let index = InMemoryIndex::new();
        index
            .create_collection("tickets", &BTreeMap::new())
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_get_missing_collection_is_none() {
        let index = InMemoryIndex::new();
        assert!(index.get_collection("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let index = index_with_collection().await;
        assert!(index
            .create_collection("tickets", &BTreeMap::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let index = index_with_collection().await;
        index
            .upsert("tickets", &[record("T1", "old", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert("tickets", &[record("T1", "new", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(index.count("tickets").await.unwrap(), 1);

        let hits = index.query("tickets", &[0.0, 1.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.as_deref(), Some("new"));
        assert!(hits[0].distance.unwrap().abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_query_orders_by_distance_and_truncates() {
        let index = index_with_collection().await;
        index
            .upsert(
                "tickets",
                &[
                    record("far", "far", vec![-1.0, 0.0]),
                    record("near", "near", vec![1.0, 0.1]),
                    record("mid", "mid", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        let hits = index.query("tickets", &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
    }

    #[tokio::test]
    async fn test_query_with_wrong_dims_errors() {
        let index = index_with_collection().await;
        index
            .upsert("tickets", &[record("T1", "doc", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert!(index.query("tickets", &[1.0, 0.0, 0.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_respects_flag() {
        let index = index_with_collection().await;
        index.reset().await.unwrap();
        assert!(index.get_collection("tickets").await.unwrap().is_none());

        let locked = InMemoryIndex::without_reset();
        assert!(locked.reset().await.is_err());
    }
}
