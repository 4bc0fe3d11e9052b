//! JSON HTTP API.
//!
//! Exposes the pipeline and its management operations for dashboards and
//! other services.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question, returns a `UnifiedResult` |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/cache/stats` | Cache statistics snapshot |
//! | `POST` | `/cache/clear` | Reset cache entries, counters and stats |
//! | `GET`  | `/cache/top` | Most frequent questions (`?limit=`) |
//! | `GET`  | `/learned/popular` | Most-used learned queries (`?limit=`) |
//! | `GET`  | `/learned/recent` | Recently used learned queries (`?limit=`) |
//! | `GET`  | `/documents` | List indexed knowledge documents |
//! | `POST` | `/documents` | Add a document to the index |
//! | `POST` | `/documents/reindex` | Reset the index to the built-in corpus |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! A resolvable question always returns `200` with a valid `UnifiedResult`
//! — resolver failures are carried inside the body (`success: false`), not
//! as transport errors. Only malformed input maps to `400`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! dashboards.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::config::Config;
use crate::index::DocumentIndex;
use crate::learning::LearningStore;
use crate::models::KnowledgeDocument;
use crate::pipeline::Pipeline;
use crate::seed;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    cache: Arc<ResultCache>,
    learning: Arc<LearningStore>,
    index: Arc<DocumentIndex>,
}

/// Start the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(
    config: &Config,
    pipeline: Arc<Pipeline>,
    cache: Arc<ResultCache>,
    learning: Arc<LearningStore>,
    index: Arc<DocumentIndex>,
) -> anyhow::Result<()> {
    let state = AppState {
        pipeline,
        cache,
        learning,
        index,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .route("/cache/stats", get(handle_cache_stats))
        .route("/cache/clear", post(handle_cache_clear))
        .route("/cache/top", get(handle_cache_top))
        .route("/learned/popular", get(handle_learned_popular))
        .route("/learned/recent", get(handle_learned_recent))
        .route("/documents", get(handle_list_documents).post(handle_add_document))
        .route("/documents/reindex", post(handle_reindex))
        .layer(cors)
        .with_state(state);

    println!("qa-harness server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an HTTP response.
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

fn data_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "data_error".to_string(),
        message: message.into(),
    }
}

// ============ Handlers ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

/// `POST /ask` — run the full pipeline on one question.
async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<crate::models::UnifiedResult>, AppError> {
    if request.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let result = state.pipeline.answer(&request.question).await;
    Ok(Json(result))
}

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

async fn handle_cache_stats(State(state): State<AppState>) -> Json<crate::models::CacheStats> {
    Json(state.cache.stats())
}

async fn handle_cache_clear(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.cache.clear();
    Json(serde_json::json!({ "cleared": true }))
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

async fn handle_cache_top(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Json<serde_json::Value> {
    let queries = state.cache.top_frequent(params.limit.unwrap_or(10));
    Json(serde_json::json!({ "queries": queries }))
}

async fn handle_learned_popular(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let queries = state
        .learning
        .popular(params.limit.unwrap_or(10) as i64)
        .await
        .map_err(|e| data_error(e.to_string()))?;
    Ok(Json(serde_json::json!({ "queries": queries })))
}

async fn handle_learned_recent(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let queries = state
        .learning
        .recent(params.limit.unwrap_or(10) as i64)
        .await
        .map_err(|e| data_error(e.to_string()))?;
    Ok(Json(serde_json::json!({ "queries": queries })))
}

async fn handle_list_documents(State(state): State<AppState>) -> Json<serde_json::Value> {
    let docs = state.index.documents();
    Json(serde_json::json!({ "count": docs.len(), "documents": docs }))
}

#[derive(Deserialize)]
struct AddDocumentRequest {
    id: Option<String>,
    title: Option<String>,
    content: String,
}

/// `POST /documents` — add a document to the running index. Generates a
/// UUID when the caller doesn't provide an id.
async fn handle_add_document(
    State(state): State<AppState>,
    Json(request): Json<AddDocumentRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if request.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }

    let id = request.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let doc = KnowledgeDocument {
        id: id.clone(),
        title: request.title,
        content: request.content,
        embedding: None,
        metadata: Default::default(),
    };

    state.index.add_document(doc).await;
    Ok(Json(serde_json::json!({ "id": id, "indexed": true })))
}

/// `POST /documents/reindex` — bulk re-index back to the built-in corpus.
async fn handle_reindex(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.index.reindex(seed::knowledge_corpus()).await;
    Json(serde_json::json!({ "count": state.index.len() }))
}
