//! HTTP surface
//!
//! JSON endpoints in front of the gate and the catalog. Rejections are mapped
//! onto status codes: 400 for validation, 429 for the rate limit, 502/504 for
//! warehouse failures.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{retry_after_secs, GatewayError};
use crate::interception::catalog::DEFAULT_PREVIEW_ROWS;
use crate::interception::{Catalog, QueryGate, TableInfo};
use crate::warehouse::{Column, EnvironmentKind, QueryResult};

/// Header carrying the caller's session identity
pub const SESSION_HEADER: &str = "x-session-id";

/// Identity shared by callers that do not identify themselves
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// The shared application state
pub struct AppState {
    /// Execution gate
    pub gate: QueryGate,

    /// Table browser
    pub catalog: Catalog,

    /// Detected runtime environment
    pub environment: EnvironmentKind,
}

/// Body of `POST /api/v1/query`
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// SQL text
    pub query: String,

    /// Caller identity; falls back to the session header
    #[serde(default)]
    pub identity: Option<String>,
}

/// Successful query response
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    /// Id of this request, also present in the logs
    pub request_id: Uuid,

    /// Result columns
    pub columns: Vec<Column>,

    /// Result rows
    pub rows: Vec<Vec<Value>>,

    /// Number of rows
    pub row_count: usize,
}

impl QueryResponse {
    fn new(request_id: Uuid, result: QueryResult) -> Self {
        Self {
            request_id,
            row_count: result.row_count(),
            columns: result.columns,
            rows: result.rows,
        }
    }
}

/// Rejection or failure response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Id of this request
    pub request_id: Uuid,

    /// Machine-readable code
    pub code: &'static str,

    /// User-safe message
    pub message: String,

    /// Seconds to wait before retrying, for rate-limited requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// A gateway error bound to the request it belongs to
pub struct ApiError {
    request_id: Uuid,
    error: GatewayError,
}

/// HTTP status for a gateway error
pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::Rejected(_) => StatusCode::BAD_REQUEST,
        GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        let retry_after = self.error.retry_after().map(|d| retry_after_secs(&d));
        let body = ErrorResponse {
            request_id: self.request_id,
            code: self.error.code_str(),
            message: self.error.user_message(),
            retry_after_secs: retry_after,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Create a new API router with the specified state
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/query", post(run_query))
        .route("/api/v1/tables", get(list_tables))
        .route("/api/v1/tables/:name", get(preview_table))
        .with_state(state)
}

fn resolve_identity(body_identity: Option<String>, headers: &HeaderMap) -> String {
    body_identity
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| {
            headers
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .unwrap_or_else(|| ANONYMOUS_IDENTITY.to_string())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "query-guard",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.environment,
    }))
}

async fn run_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let identity = resolve_identity(request.identity, &headers);
    debug!("Request {} from {}", request_id, identity);

    match state.gate.execute(&request.query, &identity).await {
        Ok(result) => Ok(Json(QueryResponse::new(request_id, result))),
        Err(error) => Err(ApiError { request_id, error }),
    }
}

async fn list_tables(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TableInfo>>, ApiError> {
    let request_id = Uuid::new_v4();
    state
        .catalog
        .list_tables()
        .await
        .map(Json)
        .map_err(|error| ApiError { request_id, error })
}

/// Query string of `GET /api/v1/tables/:name`
#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    /// Rows to return
    pub limit: Option<usize>,
}

async fn preview_table(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let limit = params.limit.unwrap_or(DEFAULT_PREVIEW_ROWS);
    match state.catalog.preview_table(&name, limit).await {
        Ok(result) => Ok(Json(QueryResponse::new(request_id, result))),
        Err(error) => Err(ApiError { request_id, error }),
    }
}
