use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sieve_core::tokenizer::analyze;
use sieve_core::{DocId, IndexConfig, SearchIndex};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub url: Option<String>,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub documents: u32,
    pub terms: usize,
    pub generation: u64,
}

/// Serving handle. Searches clone the inner `Arc`, so a reload swaps in a
/// whole new index while in-flight queries finish on the old one.
#[derive(Clone)]
pub struct AppState {
    pub index: Arc<RwLock<Arc<SearchIndex>>>,
    pub config: Arc<IndexConfig>,
    pub admin_token: Option<String>,
}

impl AppState {
    fn current(&self) -> Arc<SearchIndex> {
        self.index.read().clone()
    }
}

pub fn build_app(config: IndexConfig, admin_token: Option<String>) -> Result<Router> {
    // Load the index tables at startup
    let index = SearchIndex::open(&config)?;
    let app_state = AppState {
        index: Arc::new(RwLock::new(Arc::new(index))),
        config: Arc::new(config),
        admin_token,
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/admin/reload", post(reload_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let index = state.current();
    let terms = analyze(&params.q);
    let k = params.k.max(1);

    // store reads are blocking file I/O
    let ranked = tokio::task::spawn_blocking({
        let index = index.clone();
        move || match index.try_search_scored(&terms, k) {
            Ok(ranked) => ranked,
            Err(e) => {
                tracing::error!(error = %e, "search failed");
                Vec::new()
            }
        }
    })
    .await
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "search task panicked");
        Vec::new()
    });

    let results: Vec<SearchHit> = ranked
        .into_iter()
        .map(|(doc_id, score)| SearchHit { doc_id, score, url: index.doc_name(doc_id).map(str::to_string) })
        .collect();
    let elapsed = start.elapsed();
    Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits: results.len(), results })
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.current().doc_name(doc_id) {
        Some(url) => Ok(Json(serde_json::json!({ "doc_id": doc_id, "url": url }))),
        None => Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" })))),
    }
}

/// Open the index currently on disk and swap it in. The old index keeps serving on failure.
async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<ReloadResponse>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let config = state.config.clone();
    let opened = tokio::task::spawn_blocking(move || SearchIndex::open(&config))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let index = opened.map_err(|e| {
        tracing::warn!(error = %e, "reload rejected; keeping current index");
        (StatusCode::CONFLICT, format!("{e:#}"))
    })?;

    let response = ReloadResponse { documents: index.num_documents(), terms: index.num_terms(), generation: index.generation() };
    *state.index.write() = Arc::new(index);
    tracing::info!(documents = response.documents, generation = response.generation, "index reloaded");
    Ok(Json(response))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
