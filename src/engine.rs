//! Retrieval-augmented query engine.
//!
//! [`QueryEngine::resolve_query`] is the outermost boundary of the
//! pipeline and always returns answer text:
//!
//! | Stage | Failure | Answer |
//! |-------|---------|--------|
//! | Retrieve | nothing relevant, or retrieval failed | [`NO_TICKETS_ANSWER`] |
//! | Generate | no API key configured | [`NOT_CONFIGURED_ANSWER`] |
//! | Generate | backend returned no text | [`EMPTY_GENERATION_ANSWER`] |
//! | Any | other error | [`error_answer`] with the failure description |
//!
//! Retrieval embeds the query with the same [`EmbeddingGenerator`] used
//! at indexing time, then runs a vector query against the collection.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use support_rag_core::generation::{GenerationParams, TextGenerator};
use support_rag_core::models::RetrievedTicket;
use support_rag_core::prompt;
use support_rag_core::retrieval::{clamp_top_k, hits_to_tickets};
use support_rag_core::{RagError, Result};

use crate::config::{Config, RetrievalConfig};
use crate::embedding::EmbeddingGenerator;
use crate::index::{CollectionStats, IndexManager};
use crate::llm::{GeminiGenerator, GeneratorError};
use crate::loader::TicketStatsReport;

pub const NO_TICKETS_ANSWER: &str = "I couldn't find any relevant support tickets to answer your question. This might be a new type of issue. Please contact our support team directly for personalized assistance.";

pub const NOT_CONFIGURED_ANSWER: &str =
    "Error: AI service is not properly configured. Please contact support.";

pub const EMPTY_GENERATION_ANSWER: &str = "I apologize, but I'm having trouble generating a response right now. Please try rephrasing your question or contact support directly.";

/// Answer text for an unexpected failure anywhere in the pipeline.
pub fn error_answer(err: &dyn std::fmt::Display) -> String {
    format!(
        "I encountered an error while processing your question. Please try again or contact our support team for assistance. Error: {}",
        err
    )
}

/// First 50 characters of `query`, for log lines.
fn preview(query: &str) -> String {
    query.chars().take(50).collect()
}

/// Index and ticket-file diagnostics, as served by `GET /stats` and
/// printed by `tix stats`.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub collection: CollectionStats,
    pub tickets: TicketStatsReport,
}

pub struct QueryEngine {
    index: Arc<IndexManager>,
    embeddings: Arc<EmbeddingGenerator>,
    generator: Option<Arc<dyn TextGenerator>>,
    retrieval: RetrievalConfig,
    params: GenerationParams,
}

impl QueryEngine {
    pub fn new(
        index: Arc<IndexManager>,
        embeddings: Arc<EmbeddingGenerator>,
        generator: Option<Arc<dyn TextGenerator>>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embeddings,
            generator,
            retrieval,
            params: GenerationParams::SUPPORT_ANSWER,
        }
    }

    /// Wire the engine from configuration. A missing API key is logged and
    /// leaves the engine without a generator; retrieval still works.
    pub fn from_config(config: &Config) -> Self {
        let embeddings = Arc::new(EmbeddingGenerator::from_config(&config.embedding));
        let index = Arc::new(IndexManager::from_config(config, embeddings.clone()));

        let generator: Option<Arc<dyn TextGenerator>> = match GeminiGenerator::from_env(&config.llm)
        {
            Ok(g) => Some(Arc::new(g)),
            Err(GeneratorError::MissingApiKey(var)) => {
                error!(env = %var, "API key not found; set it in the environment to enable answers");
                None
            }
            Err(e) => {
                error!(error = %e, "failed to build generative model client");
                None
            }
        };

        Self::new(index, embeddings, generator, config.retrieval.clone())
    }

    pub fn index(&self) -> &Arc<IndexManager> {
        &self.index
    }

    /// Retrieve up to `k` tickets (default `retrieval.default_top_k`,
    /// capped at `retrieval.max_top_k`), most similar first.
    ///
    /// A blank query yields an empty list. Backend failures are returned
    /// as errors so callers can tell them apart from "no results".
    pub async fn try_query_top_k_tickets(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<RetrievedTicket>> {
        let k = clamp_top_k(
            k.unwrap_or(self.retrieval.default_top_k),
            self.retrieval.max_top_k,
        );

        let query = query.trim();
        if query.is_empty() {
            warn!("empty query provided");
            return Ok(Vec::new());
        }

        let (collection, _client) = self.index.create_or_get_collection().await?;
        let query_vec = self.embeddings.get_query_embedding(query).await?;
        let hits = collection
            .query(&query_vec, k)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        if hits.is_empty() {
            info!(query = %preview(query), "no results found for query");
            return Ok(Vec::new());
        }

        let tickets = hits_to_tickets(hits);
        info!(count = tickets.len(), "retrieved relevant tickets for query");
        Ok(tickets)
    }

    /// [`try_query_top_k_tickets`](Self::try_query_top_k_tickets) that
    /// logs any failure and returns an empty list instead.
    pub async fn query_top_k_tickets(&self, query: &str, k: Option<usize>) -> Vec<RetrievedTicket> {
        self.try_query_top_k_tickets(query, k)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "error during semantic search");
                Vec::new()
            })
    }

    /// Collection and ticket statistics. Never fails; problems are
    /// reported inside the descriptors.
    pub async fn diagnostics(&self) -> Diagnostics {
        let collection = match self.index.create_or_get_collection().await {
            Ok((collection, _)) => self.index.get_collection_stats(&collection).await,
            Err(e) => CollectionStats::Error {
                status: "error".to_string(),
                message: e.to_string(),
            },
        };
        Diagnostics {
            collection,
            tickets: self.index.source().get_ticket_stats(),
        }
    }

    pub fn build_rag_prompt(&self, query: &str, tickets: &[RetrievedTicket]) -> String {
        prompt::build_rag_prompt(query, tickets)
    }

    /// Answer `query` from the `k` most relevant tickets. Never fails.
    pub async fn resolve_query(&self, query: &str, k: Option<usize>) -> String {
        match self.answer(query, k).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "error in RAG pipeline");
                error_answer(&e)
            }
        }
    }

    async fn answer(&self, query: &str, k: Option<usize>) -> anyhow::Result<String> {
        let tickets = self.query_top_k_tickets(query, k).await;
        if tickets.is_empty() {
            warn!(query = %preview(query), "no relevant tickets found for query");
            return Ok(NO_TICKETS_ANSWER.to_string());
        }

        let rag_prompt = self.build_rag_prompt(query, &tickets);

        let Some(generator) = &self.generator else {
            error!("generative model API key not configured");
            return Ok(NOT_CONFIGURED_ANSWER.to_string());
        };

        match generator.generate(&rag_prompt, &self.params).await? {
            Some(text) if !text.trim().is_empty() => {
                info!(query = %preview(query), "generated response for query");
                Ok(text.trim().to_string())
            }
            _ => {
                error!(model = generator.model_name(), "empty response from generative model");
                Ok(EMPTY_GENERATION_ANSWER.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::TicketSource;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use support_rag_core::embedding::HashingEmbedder;
    use support_rag_core::store::memory::InMemoryIndex;
    use tempfile::TempDir;

    const TICKETS: &str = r#"[
        {"id": "1", "subject": "Password reset", "body": "User cannot log in", "resolution": "Reset via email link"},
        {"id": "2", "subject": "Printer jam", "body": "Paper stuck in tray", "resolution": "Open rear panel"}
    ]"#;

    /// Returns a fixed reply and remembers the last prompt.
    struct ScriptedGenerator {
        reply: Option<String>,
        last_prompt: Mutex<Option<String>>,
    }

    impl ScriptedGenerator {
        fn replying(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> anyhow::Result<Option<String>> {
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct DownGenerator;

    #[async_trait]
    impl TextGenerator for DownGenerator {
        fn model_name(&self) -> &str {
            "down"
        }
        async fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> anyhow::Result<Option<String>> {
            bail!("connection refused")
        }
    }

    fn engine(
        tmp: &TempDir,
        tickets: Option<&str>,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> QueryEngine {
        let path = tmp.path().join("tickets.json");
        if let Some(tickets) = tickets {
            fs::write(&path, tickets).unwrap();
        }
        let embeddings = Arc::new(EmbeddingGenerator::with_embedder(
            Arc::new(HashingEmbedder::new(256)),
            32,
        ));
        let index = Arc::new(IndexManager::with_client(
            Arc::new(InMemoryIndex::new()),
            "support_tickets",
            TicketSource::new(path),
            embeddings.clone(),
        ));
        QueryEngine::new(index, embeddings, generator, RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_password_scenario_retrieves_ticket() {
        let tmp = TempDir::new().unwrap();
        let eng = engine(&tmp, Some(TICKETS), None);
        let results = eng
            .try_query_top_k_tickets("I forgot my password", Some(1))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ticket_id, "1");
        assert_eq!(results[0].resolution, "Reset via email link");
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_k_is_capped_at_max() {
        let tmp = TempDir::new().unwrap();
        let many: Vec<serde_json::Value> = (0..15)
            .map(|i| {
                serde_json::json!({
                    "id": i.to_string(),
                    "subject": format!("Issue {}", i),
                    "body": "Something is broken",
                })
            })
            .collect();
        let eng = engine(&tmp, Some(&serde_json::to_string(&many).unwrap()), None);
        let results = eng.query_top_k_tickets("broken", Some(50)).await;
        assert_eq!(results.len(), 10);
    }

    #[tokio::test]
    async fn test_blank_query_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let eng = engine(&tmp, Some(TICKETS), None);
        assert!(eng.try_query_top_k_tickets("   ", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_collection_gives_no_tickets_answer() {
        let tmp = TempDir::new().unwrap();
        let generator = ScriptedGenerator::replying(Some("unused"));
        let eng = engine(&tmp, None, Some(generator.clone()));
        assert_eq!(eng.resolve_query("anything", None).await, NO_TICKETS_ANSWER);
        assert!(generator.last_prompt.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_generator_answer() {
        let tmp = TempDir::new().unwrap();
        let eng = engine(&tmp, Some(TICKETS), None);
        assert_eq!(
            eng.resolve_query("I forgot my password", None).await,
            NOT_CONFIGURED_ANSWER
        );
    }

    #[tokio::test]
    async fn test_empty_generation_answer() {
        let tmp = TempDir::new().unwrap();
        let eng = engine(&tmp, Some(TICKETS), Some(ScriptedGenerator::replying(None)));
        assert_eq!(
            eng.resolve_query("I forgot my password", None).await,
            EMPTY_GENERATION_ANSWER
        );

        let eng = engine(&tmp, Some(TICKETS), Some(ScriptedGenerator::replying(Some("  \n"))));
        assert_eq!(
            eng.resolve_query("I forgot my password", None).await,
            EMPTY_GENERATION_ANSWER
        );
    }

    #[tokio::test]
    async fn test_failing_generator_answer_contains_cause() {
        let tmp = TempDir::new().unwrap();
        let eng = engine(&tmp, Some(TICKETS), Some(Arc::new(DownGenerator)));
        let answer = eng.resolve_query("I forgot my password", None).await;
        assert!(answer.starts_with("I encountered an error while processing your question."));
        assert!(answer.ends_with("Error: connection refused"));
    }

    #[tokio::test]
    async fn test_answer_is_trimmed_and_prompt_has_context() {
        let tmp = TempDir::new().unwrap();
        let generator = ScriptedGenerator::replying(Some("\n  Use the email reset link.  \n"));
        let eng = engine(&tmp, Some(TICKETS), Some(generator.clone()));

        let answer = eng.resolve_query("I forgot my password", Some(1)).await;
        assert_eq!(answer, "Use the email reset link.");

        let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("## User Question:\nI forgot my password"));
        assert!(prompt.contains("Case: Password reset"));
        assert!(prompt.contains("Resolution: Reset via email link"));
    }
}
