//! HTTP query API over the stored pattern catalog.
//!
//! All routes are read-only; the catalog is written only by ingestion. Error
//! bodies are JSON objects of the form `{"detail": "..."}`.

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{error, info};

use patternlang_core::expand::expand_stored;
use patternlang_shared::{AppConfig, Confidence, ExpandedPattern, Pattern, PatternLangError};
use patternlang_storage::Storage;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(storage: Arc<Storage>, config: AppConfig) -> Self {
        Self {
            storage,
            config: Arc::new(config),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Build the query router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/id/{id}", get(pattern_by_id))
        .route("/name/{name}", get(pattern_by_name))
        .route("/find/{name}", get(find_by_name))
        .route("/page_number/{page}", get(pattern_at_page))
        .route("/confidence/{level}", get(patterns_by_confidence))
        .route("/tag/{tag}", get(patterns_by_tag))
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "query API listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An error response: status code plus a human-readable detail.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }
}

impl From<PatternLangError> for ApiError {
    fn from(err: PatternLangError) -> Self {
        match err {
            PatternLangError::NotFound { .. } => Self::not_found(err.to_string()),
            PatternLangError::DepthOutOfRange { .. } | PatternLangError::Validation { .. } => {
                Self::bad_request(err.to_string())
            }
            other => {
                error!(error = %other, "request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: "internal error".into(),
                }
            }
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DepthQuery {
    depth: Option<u32>,
}

async fn index(State(state): State<AppState>) -> Json<Value> {
    let service = &state.config.service;
    Json(json!({
        "name": service.name,
        "version": env!("CARGO_PKG_VERSION"),
        "description": service.description,
        "contact": service.contact_url,
    }))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> ApiResult<Value> {
    let patterns = state.storage.count_patterns().await?;
    let links = state.storage.count_links().await?;
    let latest_run = state.storage.latest_ingest_run().await?;
    Ok(Json(json!({
        "patterns": patterns,
        "links": links,
        "latest_run": latest_run,
    })))
}

async fn pattern_by_id(
    State(state): State<AppState>,
    id: std::result::Result<Path<u32>, PathRejection>,
    query: std::result::Result<Query<DepthQuery>, QueryRejection>,
) -> ApiResult<ExpandedPattern> {
    let Path(id) = id?;
    let Query(query) = query?;
    expand_with_depth(&state, id, query.depth).await
}

async fn pattern_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
    query: std::result::Result<Query<DepthQuery>, QueryRejection>,
) -> ApiResult<ExpandedPattern> {
    let Query(query) = query?;
    let pattern = state
        .storage
        .get_pattern_by_name(&name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("pattern named '{name}' not found")))?;
    expand_with_depth(&state, pattern.id, query.depth).await
}

async fn expand_with_depth(
    state: &AppState,
    id: u32,
    depth: Option<u32>,
) -> ApiResult<ExpandedPattern> {
    let server = &state.config.server;
    let depth = depth.unwrap_or(server.default_depth);
    let expanded = expand_stored(&state.storage, id, depth, server.max_depth).await?;
    Ok(Json(expanded))
}

async fn find_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<Pattern>> {
    Ok(Json(state.storage.find_patterns_by_name(&name).await?))
}

async fn pattern_at_page(
    State(state): State<AppState>,
    page: std::result::Result<Path<u32>, PathRejection>,
) -> ApiResult<Pattern> {
    let Path(page) = page?;
    if let Some(pattern) = state.storage.get_pattern_at_page(page).await? {
        return Ok(Json(pattern));
    }

    let first = state.storage.list_patterns().await?;
    let hint = first
        .iter()
        .map(|p| p.page_reference)
        .min()
        .map(|page| format!(", first pattern at page_number = {page}"))
        .unwrap_or_default();
    Err(ApiError::not_found(format!(
        "No pattern found at or below the specified page number{hint}"
    )))
}

async fn patterns_by_confidence(
    State(state): State<AppState>,
    level: std::result::Result<Path<u8>, PathRejection>,
) -> ApiResult<Vec<Pattern>> {
    let Path(level) = level?;
    let confidence = Confidence::try_from(level).map_err(ApiError::bad_request)?;
    Ok(Json(
        state.storage.list_patterns_by_confidence(confidence).await?,
    ))
}

async fn patterns_by_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> ApiResult<Vec<Pattern>> {
    Ok(Json(state.storage.list_patterns_by_tag(&tag).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use patternlang_core::ingest::{SilentProgress, ingest};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn test_state() -> AppState {
        let tmp = std::env::temp_dir().join(format!("pl_api_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.expect("open test db");

        let mut config = AppConfig::default();
        config.source.patterns_dir =
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures/patterns");
        ingest(&storage, &config.source, &SilentProgress)
            .await
            .expect("ingest fixtures");

        AppState::new(Arc::new(storage), config)
    }

    async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
        let response = router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn index_and_health() {
        let state = test_state().await;
        let (status, body) = get_json(&state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

        let response = router(state)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_counts() {
        let state = test_state().await;
        let (status, body) = get_json(&state, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["patterns"], 4);
        assert_eq!(body["links"], 7);
        assert_eq!(body["latest_run"]["failures"], 2);
    }

    #[tokio::test]
    async fn id_uses_default_depth() {
        let state = test_state().await;
        let (status, body) = get_json(&state, "/id/4").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Agricultural Valleys");
        assert_eq!(body["confidence"], 1);
        assert_eq!(body["forward_links"][0]["id"], 3);
        assert_eq!(body["backlinks"][0]["id"], 3);
        assert_eq!(body["forward_links"][0]["forward_links"], json!([]));
    }

    #[tokio::test]
    async fn id_depth_zero_and_limits() {
        let state = test_state().await;
        let (status, body) = get_json(&state, "/id/1?depth=0").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["forward_links"], json!([]));
        assert_eq!(body["backlinks"], json!([]));

        let (status, body) = get_json(&state, "/id/1?depth=4").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("depth"));

        let (status, _) = get_json(&state, "/id/1?depth=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_id_is_404() {
        let state = test_state().await;
        let (status, body) = get_json(&state, "/id/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].is_string());

        let (status, _) = get_json(&state, "/id/abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn name_lookup_is_case_insensitive() {
        let state = test_state().await;
        let (status, body) = get_json(&state, "/name/Independent%20Regions?depth=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 1);
        assert_eq!(body["forward_links"].as_array().unwrap().len(), 2);

        let (status, _) = get_json(&state, "/name/Nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn find_returns_flat_patterns() {
        let state = test_state().await;
        let (status, body) = get_json(&state, "/find/country").await;
        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "city country fingers");
        assert!(items[0].get("forward_links").is_none());
    }

    #[tokio::test]
    async fn page_number_floor() {
        let state = test_state().await;
        let (status, body) = get_json(&state, "/page_number/20").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 2);

        let (status, body) = get_json(&state, "/page_number/5").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("page_number = 10"));
    }

    #[tokio::test]
    async fn confidence_levels() {
        let state = test_state().await;
        let (status, body) = get_json(&state, "/confidence/2").await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<_> = body.as_array().unwrap().iter().map(|p| p["id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(3)]);

        let (status, _) = get_json(&state, "/confidence/7").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tag_substring() {
        let state = test_state().await;
        let (status, body) = get_json(&state, "/tag/regional").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 4);

        let (_, body) = get_json(&state, "/tag/buildings").await;
        assert_eq!(body, json!([]));
    }
}
