//! REST API server for the transaction insights agent
//!
//! Exposes customer turns, session reset and audit lookup over HTTP.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::InsightsAgent;
use crate::error::AgentError;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRequest {
    /// Omit to start a new session.
    pub session_id: Option<String>,
    pub customer_id: String,
    pub query: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<InsightsAgent>,
}

/// =============================
/// Helpers
/// =============================

fn status_for(error: &AgentError) -> StatusCode {
    match error {
        AgentError::SessionBusy(_) => StatusCode::CONFLICT,
        AgentError::SessionMismatch(_) => StatusCode::FORBIDDEN,
        AgentError::InvalidQuery(_) | AgentError::InvalidToolInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(error: AgentError) -> ApiResult {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!(error = %error, "Request failed");
    }
    (status, Json(ApiResponse::error(error.to_string())))
}

fn parse_audit_id(raw: &str) -> Result<Uuid, ApiResult> {
    Uuid::parse_str(raw).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("'{}' is not a valid audit id", raw))),
        )
    })
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Query Endpoint
/// =============================

async fn handle_query(State(state): State<ApiState>, Json(req): Json<QueryRequest>) -> ApiResult {
    info!(
        session_id = ?req.session_id,
        customer_id = %req.customer_id,
        "Received query"
    );

    match state
        .agent
        .handle_turn(req.session_id.as_deref(), &req.customer_id, &req.query)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(ApiResponse::success(response))),
        Err(e) => failure(e),
    }
}

/// =============================
/// Session Endpoints
/// =============================

async fn abandon_session(State(state): State<ApiState>, Path(session_id): Path<String>) -> ApiResult {
    match state.agent.abandon_session(&session_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "session_id": session_id }))),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("session {} not found", session_id))),
        ),
        Err(e) => failure(e),
    }
}

async fn session_audit(State(state): State<ApiState>, Path(session_id): Path<String>) -> ApiResult {
    match state.agent.session_audit(&session_id).await {
        Ok(records) => (StatusCode::OK, Json(ApiResponse::success(records))),
        Err(e) => failure(e),
    }
}

/// =============================
/// Audit Endpoint
/// =============================

async fn get_audit(State(state): State<ApiState>, Path(audit_id): Path<String>) -> ApiResult {
    let audit_id = match parse_audit_id(&audit_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.agent.audit_record(audit_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::success(record))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("audit record {} not found", audit_id))),
        ),
        Err(e) => failure(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(agent: Arc<InsightsAgent>) -> Router {
    let state = ApiState { agent };

    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(handle_query))
        .route("/api/sessions/:session_id", delete(abandon_session))
        .route("/api/sessions/:session_id/audit", get(session_audit))
        .route("/api/audit/:audit_id", get(get_audit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    agent: Arc<InsightsAgent>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(agent);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
