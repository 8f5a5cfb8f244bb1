//! Index management: collection setup, lazy population, and reindexing.
//!
//! [`IndexManager`] owns the process-wide index client. The first call to
//! [`create_or_get_collection`](IndexManager::create_or_get_collection)
//! opens the SQLite index, finds or creates the ticket collection, and,
//! if the collection is empty, loads, embeds, and upserts every ticket
//! before returning. Later calls find a non-empty collection and return
//! immediately.
//!
//! A populated collection is returned without locking. Otherwise the
//! check-count-then-populate sequence runs under an async mutex so
//! concurrent first callers do not each run a full indexing pass.
//!
//! The collection records the embedding model name and dimensionality it
//! was built with. Opening it with a different model is an error; the
//! index has to be reset and rebuilt.

use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info, warn};

use support_rag_core::models::{IndexedDocument, Ticket};
use support_rag_core::store::{Collection, CollectionInfo, VectorIndex};
use support_rag_core::{RagError, Result};

use crate::config::Config;
use crate::embedding::{Embedder, EmbeddingGenerator};
use crate::loader::TicketSource;
use crate::sqlite_index::SqliteIndex;

const DESCRIPTION_KEY: &str = "description";
const EMBEDDING_MODEL_KEY: &str = "embedding_model";
const EMBEDDING_DIMS_KEY: &str = "embedding_dims";

/// Health of a collection as reported by [`IndexManager::get_collection_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Healthy,
    Empty,
}

/// Diagnostic descriptor for a collection. Never an error value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CollectionStats {
    Report {
        total_tickets: usize,
        collection_name: String,
        status: CollectionStatus,
    },
    Error {
        status: String,
        message: String,
    },
}

pub struct IndexManager {
    index_dir: Option<PathBuf>,
    allow_reset: bool,
    collection_name: String,
    description: String,
    client: OnceCell<Arc<dyn VectorIndex>>,
    source: TicketSource,
    embeddings: Arc<EmbeddingGenerator>,
    populate: Mutex<()>,
}

impl IndexManager {
    /// A manager for the SQLite index configured in `[index]`. Nothing is
    /// opened until first use.
    pub fn from_config(config: &Config, embeddings: Arc<EmbeddingGenerator>) -> Self {
        Self {
            index_dir: Some(config.index.path.clone()),
            allow_reset: config.index.allow_reset,
            collection_name: config.index.collection.clone(),
            description: config.index.description.clone(),
            client: OnceCell::new(),
            source: TicketSource::new(&config.tickets.path),
            embeddings,
            populate: Mutex::new(()),
        }
    }

    /// A manager over an already-open index client.
    pub fn with_client(
        client: Arc<dyn VectorIndex>,
        collection_name: &str,
        source: TicketSource,
        embeddings: Arc<EmbeddingGenerator>,
    ) -> Self {
        Self {
            index_dir: None,
            allow_reset: true,
            collection_name: collection_name.to_string(),
            description: "Support tickets knowledge base".to_string(),
            client: OnceCell::new_with(Some(client)),
            source,
            embeddings,
            populate: Mutex::new(()),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn source(&self) -> &TicketSource {
        &self.source
    }

    /// The shared index client, opening it on first call.
    pub async fn client(&self) -> anyhow::Result<Arc<dyn VectorIndex>> {
        self.client
            .get_or_try_init(|| async {
                let dir = self
                    .index_dir
                    .as_ref()
                    .ok_or_else(|| anyhow!("no index directory configured"))?;
                let index = SqliteIndex::open(dir, self.allow_reset)
                    .await
                    .with_context(|| format!("failed to open index at {}", dir.display()))?;
                info!(path = %dir.display(), "initialized index client");
                Ok::<_, anyhow::Error>(Arc::new(index) as Arc<dyn VectorIndex>)
            })
            .await
            .cloned()
    }

    async fn open_collection(&self) -> anyhow::Result<(Collection, Arc<dyn VectorIndex>)> {
        let client = self.client().await?;
        let model = self.embeddings.model().await?;

        let info = match client.get_collection(&self.collection_name).await? {
            Some(info) => {
                check_embedding_model(&info, model.as_ref())?;
                info!(collection = %self.collection_name, "retrieved existing collection");
                info
            }
            None => {
                let mut metadata = BTreeMap::new();
                metadata.insert(DESCRIPTION_KEY.to_string(), self.description.clone());
                metadata.insert(EMBEDDING_MODEL_KEY.to_string(), model.model_name().to_string());
                metadata.insert(EMBEDDING_DIMS_KEY.to_string(), model.dims().to_string());
                let info = client
                    .create_collection(&self.collection_name, &metadata)
                    .await?;
                info!(collection = %self.collection_name, "created new collection");
                info
            }
        };

        Ok((Collection::new(info, client.clone()), client))
    }

    /// The collection if it exists and already holds records. Takes no lock.
    async fn populated_collection(
        &self,
    ) -> anyhow::Result<Option<(Collection, Arc<dyn VectorIndex>, usize)>> {
        let client = self.client().await?;
        let Some(info) = client.get_collection(&self.collection_name).await? else {
            return Ok(None);
        };
        let model = self.embeddings.model().await?;
        check_embedding_model(&info, model.as_ref())?;

        let collection = Collection::new(info, client.clone());
        let count = collection.count().await?;
        if count == 0 {
            return Ok(None);
        }
        Ok(Some((collection, client, count)))
    }

    /// Open the collection, populating it first if it is empty.
    ///
    /// # Errors
    ///
    /// [`RagError::Init`] wrapping any failure while opening the index,
    /// creating the collection, or running the initial indexing pass. A
    /// collection built with a different embedding model is also an
    /// initialization failure.
    pub async fn create_or_get_collection(&self) -> Result<(Collection, Arc<dyn VectorIndex>)> {
        let result = async {
            if let Some((collection, client, count)) = self.populated_collection().await? {
                info!(count, "collection already contains tickets");
                return Ok((collection, client));
            }

            let _guard = self.populate.lock().await;
            let (collection, client) = self.open_collection().await?;

            // Another caller may have populated it while we waited.
            let count = collection.count().await?;
            if count == 0 {
                info!("collection is empty, loading support tickets");
                self.index_all_tickets(&collection).await?;
                let final_count = collection.count().await?;
                info!(count = final_count, "loaded tickets into index");
            } else {
                info!(count, "collection already contains tickets");
            }

            Ok::<_, anyhow::Error>((collection, client))
        }
        .await;

        result.map_err(|e| {
            error!(error = %e, "error initializing index");
            RagError::Init(format!("{:#}", e))
        })
    }

    /// Run a full indexing pass regardless of the current count.
    pub async fn reindex(&self) -> Result<usize> {
        let _guard = self.populate.lock().await;
        let (collection, _) = self
            .open_collection()
            .await
            .map_err(|e| RagError::Init(format!("{:#}", e)))?;
        self.index_all_tickets(&collection).await
    }

    /// Drop every collection in the index.
    pub async fn reset(&self) -> anyhow::Result<()> {
        let _guard = self.populate.lock().await;
        self.client().await?.reset().await?;
        warn!("index reset; all collections dropped");
        Ok(())
    }

    /// Load, embed, and upsert every ticket into `collection`.
    ///
    /// A missing or unusable ticket source is a warning and a no-op.
    /// Tickets that cannot be paired with an embedding are skipped.
    /// Returns the number of documents written.
    ///
    /// # Errors
    ///
    /// [`RagError::Embedding`] if embedding fails, [`RagError::Index`] if
    /// the batch upsert fails.
    pub async fn index_all_tickets(&self, collection: &Collection) -> Result<usize> {
        let tickets = match self.source.load_all_tickets() {
            Ok(tickets) if !tickets.is_empty() => tickets,
            Ok(_) => {
                warn!("no tickets found to index");
                return Ok(0);
            }
            Err(e @ (RagError::NotFound(_) | RagError::Invalid(_))) => {
                warn!(error = %e, "no tickets found to index");
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        info!(count = tickets.len(), "loading support tickets for indexing");
        let embeddings = self.embeddings.get_embeddings(&tickets).await?;

        let documents = pair_with_embeddings(&tickets, embeddings);
        if documents.is_empty() {
            error!("no valid tickets to index");
            return Ok(0);
        }

        info!(count = documents.len(), collection = collection.name(), "indexing tickets");
        collection.upsert(&documents).await.map_err(|e| {
            error!(error = %e, "error during ticket indexing");
            RagError::Index(e.to_string())
        })?;

        info!(count = documents.len(), "successfully indexed tickets");
        Ok(documents.len())
    }

    /// Count, name, and health of `collection`.
    pub async fn get_collection_stats(&self, collection: &Collection) -> CollectionStats {
        match collection.count().await {
            Ok(count) => CollectionStats::Report {
                total_tickets: count,
                collection_name: collection.name().to_string(),
                status: if count > 0 {
                    CollectionStatus::Healthy
                } else {
                    CollectionStatus::Empty
                },
            },
            Err(e) => {
                error!(error = %e, "error getting collection stats");
                CollectionStats::Error {
                    status: "error".to_string(),
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Fail if `info` was built with a different embedding model than `model`.
/// Collections without recorded model metadata are accepted.
fn check_embedding_model(info: &CollectionInfo, model: &dyn Embedder) -> anyhow::Result<()> {
    if let Some(name) = info.metadata.get(EMBEDDING_MODEL_KEY) {
        if name != model.model_name() {
            bail!(
                "collection {} was built with embedding model {}, but {} is configured; reset and rebuild the index",
                info.name,
                name,
                model.model_name()
            );
        }
    }
    if let Some(dims) = info.metadata.get(EMBEDDING_DIMS_KEY) {
        if *dims != model.dims().to_string() {
            bail!(
                "collection {} was built with {}-dimensional embeddings, but the configured model produces {}; reset and rebuild the index",
                info.name,
                dims,
                model.dims()
            );
        }
    }
    Ok(())
}

/// Match each ticket with non-empty text to its embedding, in order.
fn pair_with_embeddings(tickets: &[Ticket], embeddings: Vec<Vec<f32>>) -> Vec<IndexedDocument> {
    let embeddable: Vec<&Ticket> = tickets
        .iter()
        .filter(|t| !t.embedding_text().is_empty())
        .collect();

    if embeddable.len() != embeddings.len() {
        error!(
            tickets = embeddable.len(),
            embeddings = embeddings.len(),
            "embedding count does not match ticket count"
        );
    }

    embeddable
        .into_iter()
        .zip(embeddings)
        .filter_map(|(ticket, embedding)| {
            if embedding.is_empty() {
                error!(ticket_id = %ticket.id, "error processing ticket: empty embedding");
                return None;
            }
            Some(IndexedDocument::from_ticket(ticket, embedding))
        })
        .collect()
}
