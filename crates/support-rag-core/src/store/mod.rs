//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the operations the index manager and
//! query engine consume, enabling pluggable backends (SQLite on disk,
//! in-memory for tests). A [`Collection`] pairs a named collection with the
//! client that owns it.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::IndexedDocument;

/// Name and descriptive metadata of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub metadata: BTreeMap<String, String>,
}

/// A single nearest-neighbour hit.
///
/// Fields are optional because backends may return partial rows; the
/// retrieval layer skips hits it cannot use.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub document: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
    /// Cosine distance in `[0, 2]`; smaller is more similar.
    pub distance: Option<f32>,
}

/// Abstract vector index backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_collection`](VectorIndex::get_collection) | Look up a collection (`None` if absent) |
/// | [`create_collection`](VectorIndex::create_collection) | Create a named collection |
/// | [`count`](VectorIndex::count) | Number of records in a collection |
/// | [`upsert`](VectorIndex::upsert) | Insert or overwrite records by id |
/// | [`query`](VectorIndex::query) | k-nearest-neighbour search |
/// | [`reset`](VectorIndex::reset) | Drop every collection |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    async fn create_collection(
        &self,
        name: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<CollectionInfo>;

    async fn count(&self, collection: &str) -> Result<usize>;

    /// Insert or overwrite records. Re-upserting an existing id replaces
    /// its document, metadata, and embedding; it never duplicates.
    async fn upsert(&self, collection: &str, records: &[IndexedDocument]) -> Result<()>;

    /// Return up to `n_results` hits ordered by ascending distance.
    async fn query(
        &self,
        collection: &str,
        query_vec: &[f32],
        n_results: usize,
    ) -> Result<Vec<QueryHit>>;

    /// Drop all collections. Backends may refuse when reset is disabled.
    async fn reset(&self) -> Result<()>;
}

/// Handle to one collection inside a [`VectorIndex`].
#[derive(Clone)]
pub struct Collection {
    info: CollectionInfo,
    client: Arc<dyn VectorIndex>,
}

impl Collection {
    pub fn new(info: CollectionInfo, client: Arc<dyn VectorIndex>) -> Self {
        Self { info, client }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.info.metadata
    }

    pub async fn count(&self) -> Result<usize> {
        self.client.count(&self.info.name).await
    }

    pub async fn upsert(&self, records: &[IndexedDocument]) -> Result<()> {
        self.client.upsert(&self.info.name, records).await
    }

    pub async fn query(&self, query_vec: &[f32], n_results: usize) -> Result<Vec<QueryHit>> {
        self.client
            .query(&self.info.name, query_vec, n_results)
            .await
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.info.name)
            .field("metadata", &self.info.metadata)
            .finish()
    }
}
