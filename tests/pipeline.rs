//! End-to-end pipeline tests against the on-disk SQLite index, plus the
//! HTTP API served on an ephemeral port.

use anyhow::bail;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use support_rag::config::RetrievalConfig;
use support_rag::embedding::{EmbeddingGenerator, HashingEmbedder};
use support_rag::engine::{QueryEngine, NOT_CONFIGURED_ANSWER, NO_TICKETS_ANSWER};
use support_rag::index::IndexManager;
use support_rag::loader::TicketSource;
use support_rag::sqlite_index::SqliteIndex;
use support_rag_core::generation::{GenerationParams, TextGenerator};
use support_rag_core::models::Ticket;
use support_rag_core::store::VectorIndex;

const TICKETS: &str = r#"[
    {"id": "1", "subject": "Password reset", "body": "User cannot log in", "resolution": "Reset via email link"},
    {"id": "2", "subject": "Printer jam", "body": "Paper stuck in tray", "resolution": "Open the rear panel"}
]"#;

struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> anyhow::Result<Option<String>> {
        let cases = prompt.matches("Case: ").count();
        Ok(Some(format!("  Answered from {} cases.  ", cases)))
    }
}

struct BrokenIndex;

#[async_trait]
impl VectorIndex for BrokenIndex {
    async fn get_collection(
        &self,
        _name: &str,
    ) -> anyhow::Result<Option<support_rag_core::store::CollectionInfo>> {
        bail!("index storage unavailable")
    }
    async fn create_collection(
        &self,
        _name: &str,
        _metadata: &std::collections::BTreeMap<String, String>,
    ) -> anyhow::Result<support_rag_core::store::CollectionInfo> {
        bail!("index storage unavailable")
    }
    async fn count(&self, _collection: &str) -> anyhow::Result<usize> {
        bail!("index storage unavailable")
    }
    async fn upsert(
        &self,
        _collection: &str,
        _records: &[support_rag_core::models::IndexedDocument],
    ) -> anyhow::Result<()> {
        bail!("index storage unavailable")
    }
    async fn query(
        &self,
        _collection: &str,
        _query_vec: &[f32],
        _n_results: usize,
    ) -> anyhow::Result<Vec<support_rag_core::store::QueryHit>> {
        bail!("index storage unavailable")
    }
    async fn reset(&self) -> anyhow::Result<()> {
        bail!("index storage unavailable")
    }
}

fn write_tickets(dir: &Path, contents: &str) -> TicketSource {
    let path = dir.join("tickets.json");
    fs::write(&path, contents).unwrap();
    TicketSource::new(path)
}

fn embeddings() -> Arc<EmbeddingGenerator> {
    hash_embeddings(256)
}

fn hash_embeddings(dims: usize) -> Arc<EmbeddingGenerator> {
    Arc::new(EmbeddingGenerator::with_embedder(
        Arc::new(HashingEmbedder::new(dims)),
        32,
    ))
}

async fn sqlite_engine(
    tmp: &TempDir,
    source: TicketSource,
    generator: Option<Arc<dyn TextGenerator>>,
) -> QueryEngine {
    sqlite_engine_with(tmp, source, generator, embeddings()).await
}

async fn sqlite_engine_with(
    tmp: &TempDir,
    source: TicketSource,
    generator: Option<Arc<dyn TextGenerator>>,
    embeddings: Arc<EmbeddingGenerator>,
) -> QueryEngine {
    let client = Arc::new(
        SqliteIndex::open(&tmp.path().join("index"), true)
            .await
            .unwrap(),
    );
    let index = Arc::new(IndexManager::with_client(
        client,
        "support_tickets",
        source,
        embeddings.clone(),
    ));
    QueryEngine::new(index, embeddings, generator, RetrievalConfig::default())
}

#[tokio::test]
async fn test_password_scenario_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let source = write_tickets(tmp.path(), TICKETS);
    let engine = sqlite_engine(&tmp, source, Some(Arc::new(EchoGenerator))).await;

    let results = engine
        .try_query_top_k_tickets("I forgot my password", None)
        .await
        .unwrap();
    assert_eq!(results[0].ticket_id, "1");
    assert_eq!(results[0].resolution, "Reset via email link");
    assert!(results[0].score > results[1].score);

    let answer = engine.resolve_query("I forgot my password", Some(2)).await;
    assert_eq!(answer, "Answered from 2 cases.");
}

#[tokio::test]
async fn test_exact_text_match_scores_near_one() {
    let tmp = TempDir::new().unwrap();
    let source = write_tickets(tmp.path(), TICKETS);
    let engine = sqlite_engine(&tmp, source, None).await;

    let results = engine
        .try_query_top_k_tickets("Password reset\n\nUser cannot log in", Some(1))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].ticket_id, "1");
    assert!(results[0].score > 0.99, "score = {}", results[0].score);
}

#[tokio::test]
async fn test_reupsert_changed_content_has_no_duplicates() {
    let tmp = TempDir::new().unwrap();
    let source = write_tickets(tmp.path(), TICKETS);
    let engine = sqlite_engine(&tmp, source, None).await;
    engine.index().create_or_get_collection().await.unwrap();

    write_tickets(
        tmp.path(),
        r#"[{"id": "1", "subject": "Account locked", "body": "Too many attempts", "resolution": "Unlock in admin panel"}]"#,
    );
    engine.index().reindex().await.unwrap();

    let results = engine
        .try_query_top_k_tickets("Account locked", Some(10))
        .await
        .unwrap();
    let ones: Vec<_> = results.iter().filter(|t| t.ticket_id == "1").collect();
    assert_eq!(ones.len(), 1);
    assert_eq!(ones[0].subject, "Account locked");
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_index_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let source = write_tickets(tmp.path(), TICKETS);
    {
        let engine = sqlite_engine(&tmp, source.clone(), None).await;
        engine.index().create_or_get_collection().await.unwrap();
    }

    // With the ticket file gone, only the persisted index can answer.
    fs::remove_file(source.path()).unwrap();
    let engine = sqlite_engine(&tmp, source, None).await;
    let results = engine.query_top_k_tickets("printer paper", None).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].ticket_id, "2");
}

#[tokio::test]
async fn test_empty_collection_falls_back() {
    let tmp = TempDir::new().unwrap();
    let source = TicketSource::new(tmp.path().join("missing.json"));
    let engine = sqlite_engine(&tmp, source, Some(Arc::new(EchoGenerator))).await;
    assert_eq!(engine.resolve_query("anything at all", None).await, NO_TICKETS_ANSWER);
}

#[tokio::test]
async fn test_broken_index_is_distinguishable_but_never_escapes() {
    let tmp = TempDir::new().unwrap();
    let source = write_tickets(tmp.path(), TICKETS);
    let embeddings = embeddings();
    let index = Arc::new(IndexManager::with_client(
        Arc::new(BrokenIndex),
        "support_tickets",
        source,
        embeddings.clone(),
    ));
    let engine = QueryEngine::new(index, embeddings, None, RetrievalConfig::default());

    let err = engine
        .try_query_top_k_tickets("password", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "init_error");
    assert!(err.to_string().contains("index storage unavailable"));

    assert!(engine.query_top_k_tickets("password", None).await.is_empty());
    assert_eq!(engine.resolve_query("password", None).await, NO_TICKETS_ANSWER);
}

#[tokio::test]
async fn test_changed_embedding_dims_is_an_error_not_empty_results() {
    let tmp = TempDir::new().unwrap();
    let source = write_tickets(tmp.path(), TICKETS);
    {
        let engine = sqlite_engine(&tmp, source.clone(), None).await;
        engine.index().create_or_get_collection().await.unwrap();
    }

    let engine = sqlite_engine_with(&tmp, source, None, hash_embeddings(128)).await;
    let err = engine
        .try_query_top_k_tickets("password reset", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "init_error");
    assert!(err.to_string().contains("rebuild the index"));
}

#[tokio::test]
async fn test_mismatched_vectors_without_model_metadata_fail_search() {
    let tmp = TempDir::new().unwrap();
    let source = write_tickets(tmp.path(), TICKETS);
    {
        let client = SqliteIndex::open(&tmp.path().join("index"), true)
            .await
            .unwrap();
        client
            .create_collection("support_tickets", &std::collections::BTreeMap::new())
            .await
            .unwrap();
        let ticket = Ticket {
            id: "1".to_string(),
            subject: "Password reset".to_string(),
            body: "User cannot log in".to_string(),
            resolution: None,
            status: None,
            priority: None,
            created_at: None,
        };
        client
            .upsert(
                "support_tickets",
                &[support_rag_core::models::IndexedDocument::from_ticket(
                    &ticket,
                    vec![1.0, 0.0, 0.0],
                )],
            )
            .await
            .unwrap();
        client.pool().close().await;
    }

    let engine = sqlite_engine(&tmp, source, None).await;
    let err = engine
        .try_query_top_k_tickets("password reset", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "search_error");
    assert!(err.to_string().contains("dimension mismatch"));
    assert_eq!(engine.resolve_query("password reset", None).await, NO_TICKETS_ANSWER);
}

#[tokio::test]
async fn test_prompt_for_retrieved_tickets() {
    let tmp = TempDir::new().unwrap();
    let source = write_tickets(tmp.path(), TICKETS);
    let engine = sqlite_engine(&tmp, source, None).await;

    let tickets = engine.query_top_k_tickets("I forgot my password", Some(2)).await;
    let prompt = engine.build_rag_prompt("I forgot my password", &tickets);
    let first = prompt.find("Case: Password reset").unwrap();
    let second = prompt.find("Case: Printer jam").unwrap();
    assert!(first < second);
    assert_eq!(prompt.matches("Relevance: ").count(), 2);

    assert_eq!(
        engine.resolve_query("I forgot my password", None).await,
        NOT_CONFIGURED_ANSWER
    );
}

// ============ HTTP API ============

async fn spawn_server(engine: QueryEngine) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(support_rag::server::serve(listener, Arc::new(engine)));
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_http_api() {
    let tmp = TempDir::new().unwrap();
    let source = write_tickets(tmp.path(), TICKETS);
    let engine = sqlite_engine(&tmp, source, Some(Arc::new(EchoGenerator))).await;
    let base = spawn_server(engine).await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));

    let answer: serde_json::Value = client
        .post(format!("{}/query", base))
        .json(&serde_json::json!({"query": "I forgot my password", "k": 1}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answer["answer"], "Answered from 1 cases.");

    let search: serde_json::Value = client
        .post(format!("{}/search", base))
        .json(&serde_json::json!({"query": "I forgot my password"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search["results"][0]["ticket_id"], "1");

    let stats: serde_json::Value = client
        .get(format!("{}/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["collection"]["total_tickets"], 2);
    assert_eq!(stats["tickets"]["total_tickets"], 2);

    let sample: serde_json::Value = client
        .get(format!("{}/tickets/sample?n=1", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tickets: Vec<Ticket> = serde_json::from_value(sample["tickets"].clone()).unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].id, "1");
}

#[tokio::test]
async fn test_http_bad_requests() {
    let tmp = TempDir::new().unwrap();
    let source = write_tickets(tmp.path(), TICKETS);
    let engine = sqlite_engine(&tmp, source, None).await;
    let base = spawn_server(engine).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/query", base))
        .json(&serde_json::json!({"query": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "query must not be empty");

    let resp = client
        .post(format!("{}/search", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}
