//! HTTP front end for the query engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/query` | Answer a question: `{query, k?}` → `{answer}` |
//! | `POST` | `/search` | Retrieve tickets: `{query, k?}` → `{results}` |
//! | `GET`  | `/stats` | Collection and ticket-file diagnostics |
//! | `GET`  | `/tickets/sample?n=` | First `n` tickets from the source file |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! `POST /query` only fails on a malformed request; every pipeline failure
//! is already folded into the answer text.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser chat UI
//! on another origin can call the API.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use support_rag_core::models::{RetrievedTicket, Ticket};
use support_rag_core::RagError;

use crate::config::Config;
use crate::engine::{Diagnostics, QueryEngine};

const DEFAULT_SAMPLE_SIZE: usize = 5;

#[derive(Clone)]
struct AppState {
    engine: Arc<QueryEngine>,
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(QueryEngine::from_config(config));
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %config.server.bind, "support API listening");
    serve(listener, engine).await
}

/// Serve the API on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, engine: Arc<QueryEngine>) -> anyhow::Result<()> {
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

pub fn router(engine: Arc<QueryEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/query", post(handle_query))
        .route("/search", post(handle_search))
        .route("/stats", get(handle_stats))
        .route("/tickets/sample", get(handle_sample))
        .layer(cors)
        .with_state(AppState { engine })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match err {
            RagError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query, POST /search ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

impl QueryRequest {
    fn validated(self) -> Result<Self, AppError> {
        if self.query.trim().is_empty() {
            return Err(bad_request("query must not be empty"));
        }
        if self.k == Some(0) {
            return Err(bad_request("k must be >= 1"));
        }
        Ok(self)
    }
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
}

async fn handle_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = body?;
    let req = req.validated()?;
    let answer = state.engine.resolve_query(&req.query, req.k).await;
    Ok(Json(QueryResponse { answer }))
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<RetrievedTicket>,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = body?;
    let req = req.validated()?;
    let results = state
        .engine
        .try_query_top_k_tickets(&req.query, req.k)
        .await?;
    Ok(Json(SearchResponse { results }))
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Json<Diagnostics> {
    Json(state.engine.diagnostics().await)
}

// ============ GET /tickets/sample ============

#[derive(Deserialize)]
struct SampleParams {
    n: Option<usize>,
}

#[derive(Serialize)]
struct SampleResponse {
    tickets: Vec<Ticket>,
}

async fn handle_sample(
    State(state): State<AppState>,
    Query(params): Query<SampleParams>,
) -> Json<SampleResponse> {
    let n = params.n.unwrap_or(DEFAULT_SAMPLE_SIZE);
    Json(SampleResponse {
        tickets: state.engine.index().source().get_ticket_sample(n),
    })
}
