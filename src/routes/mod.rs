use axum::{
    extract::{Query, State},
    middleware::{self as axum_middleware},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::error::ApiError;
use crate::middleware;
use crate::session::SessionSlot;

pub mod tools;

use tools::{ToolCall, ToolResult};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway_api_key: Option<String>,
    pub sessions: Arc<SessionSlot>,
    pub config: Arc<Config>,
}

/// Health check routes (no authentication required)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Tool and resource routes (require the gateway key when one is configured)
pub fn tool_routes(state: AppState) -> Router {
    Router::new()
        .route("/tools", get(list_tools_handler))
        .route("/tools/call", post(call_tool_handler))
        .route("/resources", get(list_resources_handler))
        .route("/resources/read", get(read_resource_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Webinar Gateway is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// GET /tools - List tool descriptors
async fn list_tools_handler() -> Json<Value> {
    Json(json!({ "tools": tools::tool_definitions() }))
}

/// POST /tools/call - Invoke a tool
///
/// Failures of the tool itself (unconfigured gateway, failed credential
/// exchange, Zoom API errors) come back as a result with `isError` set.
/// Malformed calls and unknown tools are HTTP errors.
async fn call_tool_handler(
    State(state): State<AppState>,
    Json(call): Json<ToolCall>,
) -> Result<Json<ToolResult>, ApiError> {
    tracing::info!("Tool call: {}", call.name);

    match tools::dispatch(&state, &call).await {
        Ok(text) => Ok(Json(ToolResult::text(text))),
        Err(err @ (ApiError::UnknownTool(_) | ApiError::ValidationError(_))) => Err(err),
        Err(err) => {
            tracing::error!("Error in tool {} ({}): {}", call.name, err.error_type(), err);
            Ok(Json(ToolResult::error(format!(
                "Error executing {}: {}",
                call.name, err
            ))))
        }
    }
}

/// GET /resources - List resource descriptors
async fn list_resources_handler() -> Json<Value> {
    Json(json!({ "resources": tools::resource_definitions() }))
}

#[derive(Debug, Deserialize)]
pub struct ResourceQuery {
    pub uri: String,
}

/// GET /resources/read?uri=... - Read a resource
async fn read_resource_handler(
    State(state): State<AppState>,
    Query(query): Query<ResourceQuery>,
) -> Result<Json<Value>, ApiError> {
    tracing::debug!("Resource read: {}", query.uri);
    tools::read_resource(&state, &query.uri).await.map(Json)
}
