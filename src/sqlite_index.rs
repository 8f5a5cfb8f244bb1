//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Records live in a single `records` table keyed by `(collection, id)`;
//! embeddings are stored as little-endian `f32` BLOBs. Queries are
//! brute-force cosine distance over every record in the collection, which
//! is adequate for ticket archives in the tens of thousands.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

use support_rag_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use support_rag_core::models::IndexedDocument;
use support_rag_core::store::{CollectionInfo, QueryHit, VectorIndex};

use crate::db;
use crate::migrate;

/// Persistent vector index in `<index dir>/index.sqlite3`.
pub struct SqliteIndex {
    pool: SqlitePool,
    allow_reset: bool,
}

impl SqliteIndex {
    /// Open the index under `index_dir`, creating the directory and schema
    /// if needed.
    pub async fn open(index_dir: &Path, allow_reset: bool) -> Result<Self> {
        let pool = db::connect(index_dir).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool, allow_reset })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_metadata(json: &str) -> Option<BTreeMap<String, String>> {
    serde_json::from_str(json).ok()
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query("SELECT name, metadata_json FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| {
            let metadata_json: String = row.get("metadata_json");
            CollectionInfo {
                name: row.get("name"),
                metadata: parse_metadata(&metadata_json).unwrap_or_default(),
            }
        }))
    }

    async fn create_collection(
        &self,
        name: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<CollectionInfo> {
        if self.get_collection(name).await?.is_some() {
            bail!("collection already exists: {}", name);
        }

        sqlx::query("INSERT INTO collections (name, metadata_json, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(serde_json::to_string(metadata)?)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;

        Ok(CollectionInfo {
            name: name.to_string(),
            metadata: metadata.clone(),
        })
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        if self.get_collection(collection).await?.is_none() {
            bail!("collection does not exist: {}", collection);
        }
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn upsert(&self, collection: &str, records: &[IndexedDocument]) -> Result<()> {
        if self.get_collection(collection).await?.is_none() {
            bail!("collection does not exist: {}", collection);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document, metadata_json, embedding, dims, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&record.document)
            .bind(serde_json::to_string(&record.metadata)?)
            .bind(vec_to_blob(&record.embedding))
            .bind(record.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query_vec: &[f32],
        n_results: usize,
    ) -> Result<Vec<QueryHit>> {
        if self.get_collection(collection).await?.is_none() {
            bail!("collection does not exist: {}", collection);
        }

        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata_json");
            let blob: Vec<u8> = row.get("embedding");
            let embedding = blob_to_vec(&blob);

            if embedding.len() != query_vec.len() {
                bail!(
                    "embedding dimension mismatch in collection {}: record {} has {} dims, query has {}",
                    collection,
                    id,
                    embedding.len(),
                    query_vec.len()
                );
            }

            hits.push(QueryHit {
                metadata: parse_metadata(&metadata_json),
                document: Some(row.get("document")),
                distance: Some(cosine_distance(query_vec, &embedding)),
                id,
            });
        }

        hits.sort_by(|a, b| {
            let left = a.distance.unwrap_or(f32::INFINITY);
            let right = b.distance.unwrap_or(f32::INFINITY);
            left.partial_cmp(&right).unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn reset(&self) -> Result<()> {
        if !self.allow_reset {
            bail!("reset is disabled for this index (index.allow_reset = false)");
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM collections")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
