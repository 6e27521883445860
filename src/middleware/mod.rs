// Gateway key authentication and CORS middleware

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tower_http::cors::{Any, CorsLayer};

use crate::error::ApiError;
use crate::routes::AppState;

/// Authentication middleware
///
/// When a gateway key is configured, requires it in the Authorization header
/// ("Bearer {key}") or in x-api-key. Without a key every request passes.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected_key) = state.gateway_api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let bearer_ok = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|key| key == expected_key)
        .unwrap_or(false);

    let api_key_ok = request
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .map(|key| key == expected_key)
        .unwrap_or(false);

    if bearer_ok || api_key_ok {
        return Ok(next.run(request).await);
    }

    let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
    tracing::warn!(
        "[{}] Access attempt with invalid or missing API key: {} {}",
        request_id,
        request.method(),
        request.uri().path()
    );
    Err(ApiError::GatewayAuth(
        "Invalid or missing API Key".to_string(),
    ))
}

/// Create CORS middleware layer
///
/// Configures CORS to allow all origins, methods, and headers.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
