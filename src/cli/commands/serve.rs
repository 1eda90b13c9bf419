//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for ingestion, retrieval, and avatar replies.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::{AvatarError, ProviderErrorKind};
use crate::orchestrator::{IngestRequest, IngestResult, Orchestrator};
use crate::rag::{QueryOptions, SourceReference};
use crate::vector_store::{QueryRecord, SourceSummary};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// Shared application state.
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let orchestrator = Arc::new(Orchestrator::new(settings)?);
    let app = router(orchestrator);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Avatar API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("Ingest", "POST   /ingest");
    Output::kv("Ingest batch", "POST   /ingest/batch");
    Output::kv("Query", "POST   /query");
    Output::kv("Search", "POST   /search");
    Output::kv("List sources", "GET    /owners/{owner_id}/sources");
    Output::kv("Delete source", "DELETE /owners/{owner_id}/sources/{content_id}");
    Output::kv("History", "GET    /owners/{owner_id}/history");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the API router around an orchestrator.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = Arc::new(AppState { orchestrator });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/ingest/batch", post(ingest_batch))
        .route("/query", post(query))
        .route("/search", post(search))
        .route("/owners/{owner_id}/sources", get(list_sources))
        .route("/owners/{owner_id}/sources/{content_id}", delete(delete_source))
        .route("/owners/{owner_id}/history", get(history))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct BatchRequest {
    requests: Vec<IngestRequest>,
}

#[derive(Serialize)]
struct BatchResponse {
    results: Vec<IngestResult>,
    succeeded: usize,
}

#[derive(Deserialize)]
struct QueryRequest {
    owner_id: String,
    message: String,
    #[serde(flatten)]
    options: QueryOptions,
}

#[derive(Deserialize)]
struct SearchRequest {
    owner_id: String,
    query: String,
    #[serde(flatten)]
    options: QueryOptions,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SourceReference>,
}

#[derive(Serialize)]
struct SourceListResponse {
    sources: Vec<SourceSummary>,
    total: usize,
}

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    20
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<QueryRecord>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(e: AvatarError) -> Response {
    let status = match &e {
        AvatarError::InvalidInput(_) | AvatarError::ContentTooLarge { .. } => StatusCode::BAD_REQUEST,
        AvatarError::ContentNotFound(_) => StatusCode::NOT_FOUND,
        AvatarError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => match e.provider_kind() {
            Some(ProviderErrorKind::RateLimit) => StatusCode::TOO_MANY_REQUESTS,
            Some(_) => StatusCode::BAD_GATEWAY,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        },
    };
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ingest(State(state): State<Arc<AppState>>, Json(req): Json<IngestRequest>) -> Response {
    let result = state.orchestrator.ingest(req).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(result)).into_response()
}

async fn ingest_batch(State(state): State<Arc<AppState>>, Json(req): Json<BatchRequest>) -> Response {
    let results = state.orchestrator.ingest_batch(req.requests).await;
    Json(BatchResponse {
        succeeded: results.iter().filter(|r| r.success).count(),
        results,
    })
    .into_response()
}

async fn query(State(state): State<Arc<AppState>>, Json(req): Json<QueryRequest>) -> Response {
    match state
        .orchestrator
        .query(&req.message, &req.owner_id, &req.options)
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn search(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> Response {
    match state
        .orchestrator
        .search(&req.query, &req.owner_id, &req.options)
        .await
    {
        Ok(ranked) => Json(SearchResponse {
            results: ranked.iter().map(SourceReference::from).collect(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_sources(State(state): State<Arc<AppState>>, Path(owner_id): Path<String>) -> Response {
    match state.orchestrator.list_sources(&owner_id).await {
        Ok(sources) => Json(SourceListResponse {
            total: sources.len(),
            sources,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_source(
    State(state): State<Arc<AppState>>,
    Path((owner_id, content_id)): Path<(String, Uuid)>,
) -> Response {
    match state.orchestrator.delete_source(content_id, &owner_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(AvatarError::ContentNotFound(content_id.to_string())),
        Err(e) => error_response(e),
    }
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Response {
    match state.orchestrator.history(&owner_id, params.limit).await {
        Ok(history) => Json(HistoryResponse { history }).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::FetcherRegistry;
    use crate::test_support::{HashEmbedder, ScriptedChat};
    use crate::vector_store::MemoryVectorStore;
    use serde_json::{json, Value};

    const PROSE: &str = "My favourite pre-race breakfast is oatmeal with banana and a spoon of honey, \
        eaten three hours before the start so there is time to digest before warming up.";

    async fn spawn_api() -> String {
        let mut settings = Settings::default();
        settings.retrieval.threshold = 0.2;
        settings.embedding.dimensions = 256;

        let orchestrator = Orchestrator::with_components(
            settings,
            Arc::new(HashEmbedder::new(256)),
            Arc::new(ScriptedChat::replying("Oatmeal, always.")),
            Arc::new(MemoryVectorStore::new()),
            FetcherRegistry::new(),
        )
        .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(orchestrator))).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_ingest_query_delete_flow() {
        let base = spawn_api().await;
        let client = reqwest::Client::new();

        let health: Value = client
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        let resp = client
            .post(format!("{}/ingest", base))
            .json(&json!({
                "owner_id": "maya",
                "source_type": "custom_text",
                "text": PROSE,
                "label": "Race day",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let result: Value = resp.json().await.unwrap();
        assert_eq!(result["success"], true);
        let content_id = result["content_id"].as_str().unwrap().to_string();

        let resp = client
            .post(format!("{}/query", base))
            .json(&json!({
                "owner_id": "maya",
                "message": "What is your pre-race breakfast?",
                "match_count": 3,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let answer: Value = resp.json().await.unwrap();
        assert_eq!(answer["response"], "Oatmeal, always.");
        assert_eq!(answer["has_results"], true);
        assert_eq!(answer["sources"][0]["label"], "Race day");

        let sources: Value = client
            .get(format!("{}/owners/maya/sources", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(sources["total"], 1);
        assert_eq!(sources["sources"][0]["chunk_count"], 1);

        let history: Value = client
            .get(format!("{}/owners/maya/history?limit=5", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history["history"].as_array().unwrap().len(), 1);

        let resp = client
            .delete(format!("{}/owners/other/sources/{}", base, content_id))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = client
            .delete(format!("{}/owners/maya/sources/{}", base, content_id))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
    }

    #[tokio::test]
    async fn test_failed_ingest_and_bad_query() {
        let base = spawn_api().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/ingest/batch", base))
            .json(&json!({
                "requests": [
                    { "owner_id": "maya", "source_type": "custom_text", "text": PROSE },
                    { "owner_id": "maya", "source_type": "custom_text", "text": "too short" },
                    { "owner_id": "maya", "source_type": "youtube_video", "source_id": "abc" },
                ]
            }))
            .send()
            .await
            .unwrap();
        let batch: Value = resp.json().await.unwrap();
        assert_eq!(batch["succeeded"], 1);
        assert!(batch["results"][1]["error"]
            .as_str()
            .unwrap()
            .starts_with("Insufficient content"));
        assert!(batch["results"][2]["error"].as_str().unwrap().contains("not configured"));

        let resp = client
            .post(format!("{}/ingest", base))
            .json(&json!({ "owner_id": "maya", "source_type": "custom_text", "text": "short" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);

        let resp = client
            .post(format!("{}/query", base))
            .json(&json!({ "owner_id": "maya", "message": "  " }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }
}
