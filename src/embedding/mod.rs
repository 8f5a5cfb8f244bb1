//! Embedding generation.
//!
//! [`EmbeddingGenerator`] owns the process-wide embedding model handle: it is
//! built lazily on first use from [`EmbeddingConfig`] and memoized, so the
//! model loads at most once per generator. Ticket and query embeddings both
//! go through the same handle and therefore share one vector space.
//!
//! Concrete models implement [`Embedder`]:
//! - **[`LocalProvider`]**: fastembed ONNX inference; no network calls after model download.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API.
//! - **[`HashingEmbedder`]**: offline feature hashing (`provider = "hash"`).
//!
//! Every provider makes a single attempt per request; failures surface as
//! [`RagError::Embedding`].

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

pub use support_rag_core::embedding::{Embedder, HashingEmbedder};
use support_rag_core::models::Ticket;
use support_rag_core::{RagError, Result};

use crate::config::EmbeddingConfig;

#[cfg(feature = "local-embeddings-fastembed")]
const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";
const DEFAULT_HASH_DIMS: usize = 384;

/// Lazily-initialized, shared embedding model plus batching policy.
pub struct EmbeddingGenerator {
    config: EmbeddingConfig,
    model: OnceCell<Arc<dyn Embedder>>,
}

impl EmbeddingGenerator {
    /// A generator that builds its model from `config` on first use.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            config: config.clone(),
            model: OnceCell::new(),
        }
    }

    /// A generator around an already-constructed model.
    pub fn with_embedder(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            config: EmbeddingConfig {
                provider: embedder.model_name().to_string(),
                batch_size: batch_size.max(1),
                ..EmbeddingConfig::default()
            },
            model: OnceCell::new_with(Some(embedder)),
        }
    }

    /// Whether the model has been constructed yet.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// The memoized model, constructing it on first call.
    ///
    /// Concurrent first callers wait on the same initialization.
    pub async fn model(&self) -> Result<Arc<dyn Embedder>> {
        self.model
            .get_or_try_init(|| async {
                info!(provider = %self.config.provider, model = ?self.config.model, "loading embedding model");
                let model = create_provider(&self.config).await.map_err(|e| {
                    error!(error = %e, "error loading embedding model");
                    RagError::Embedding(format!("failed to load embedding model: {}", e))
                })?;
                info!(model = model.model_name(), dims = model.dims(), "embedding model loaded");
                Ok::<_, RagError>(model)
            })
            .await
            .cloned()
    }

    /// Embed each ticket's `subject + "\n\n" + body`, trimmed.
    ///
    /// Tickets whose text is empty are skipped (and logged); the output
    /// holds one vector per remaining ticket, in input order. Returns an
    /// empty list if there is nothing to embed.
    pub async fn get_embeddings(&self, tickets: &[Ticket]) -> Result<Vec<Vec<f32>>> {
        if tickets.is_empty() {
            warn!("empty ticket list provided for embedding generation");
            return Ok(Vec::new());
        }

        let texts: Vec<String> = tickets
            .iter()
            .filter_map(|t| {
                let text = t.embedding_text();
                if text.is_empty() {
                    warn!(ticket_id = %t.id, "skipping empty ticket");
                    None
                } else {
                    Some(text)
                }
            })
            .collect();

        if texts.is_empty() {
            error!("no valid text content found in tickets");
            return Ok(Vec::new());
        }

        info!(count = texts.len(), "generating embeddings for ticket texts");
        let model = self.model().await?;
        let vectors = model
            .embed(&texts, self.config.batch_size)
            .await
            .map_err(|e| {
                error!(error = %e, "error generating embeddings");
                RagError::Embedding(format!("failed to generate embeddings: {}", e))
            })?;

        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "model returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        info!(count = vectors.len(), "generated embeddings");
        Ok(vectors)
    }

    /// Embed a single query string.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidInput`] if the query is blank; [`RagError::Embedding`]
    /// if the model fails.
    pub async fn get_query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("query cannot be empty".into()));
        }

        let model = self.model().await?;
        model
            .embed(&[query.to_string()], 1)
            .await
            .map_err(|e| {
                error!(error = %e, "error generating query embedding");
                RagError::Embedding(format!("failed to generate query embedding: {}", e))
            })?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("empty embedding response".into()))
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"local"` | [`LocalProvider`] (requires the `local-embeddings-fastembed` feature) |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"hash"` | [`HashingEmbedder`] |
pub async fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::load(config).await?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "hash" => Ok(Arc::new(HashingEmbedder::new(
            config.dims.unwrap_or(DEFAULT_HASH_DIMS),
        ))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference via fastembed.
///
/// The model is downloaded from Hugging Face on first load and cached.
/// `TextEmbedding` needs `&mut self`, so it sits behind a mutex and runs on
/// the blocking pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    inner: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub async fn load(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let fastembed_model = config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or_else(|| default_local_dims(&model_name));

        let inner = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
            )
            .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))
        })
        .await??;

        Ok(Self {
            model_name,
            dims,
            inner: Arc::new(std::sync::Mutex::new(inner)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], batch_size: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        let inner = self.inner.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut model = inner
                .lock()
                .map_err(|e| anyhow!("embedding model mutex poisoned: {}", e))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, all-minilm-l12-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn default_local_dims(name: &str) -> usize {
    match name {
        "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
        _ => 384,
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], batch_size: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size.max(1)) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });

            let response = self
                .client
                .post(format!("{}/api/embed", self.url))
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    )
                })?;

            let status = response.status();
            if !status.is_success() {
                let body_text = response.text().await.unwrap_or_default();
                bail!("Ollama API error {}: {}", status, body_text);
            }

            let json: serde_json::Value = response.json().await?;
            out.extend(parse_ollama_response(&json)?);
        }
        Ok(out)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> anyhow::Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
                .map(|values| values_to_vec(values))
        })
        .collect()
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings`. Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String], batch_size: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size.max(1)) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });

            let response = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body_text = response.text().await.unwrap_or_default();
                bail!("OpenAI API error {}: {}", status, body_text);
            }

            let json: serde_json::Value = response.json().await?;
            out.extend(parse_openai_response(&json)?);
        }
        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> anyhow::Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = data
        .iter()
        .enumerate()
        .map(|(pos, item)| {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .unwrap_or(pos as u64);
            let embedding = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
            Ok((index, values_to_vec(embedding)))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn values_to_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}
