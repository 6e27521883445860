// Error handling module
// Defines error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;

/// Errors that can occur while dispatching tools or calling the webinar API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Caller did not present the gateway API key
    #[error("Authentication failed: {0}")]
    GatewayAuth(String),

    /// Credential exchange with the identity endpoint failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// No Zoom credentials configured yet
    #[error("Zoom API not configured. Run 'auto_configure_zoom' or 'configure_zoom' first.")]
    NotConfigured,

    /// Error from the Zoom API
    #[error("Zoom API error: {status} - {message}")]
    UpstreamApiError { status: u16, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Tool name not known to the dispatcher
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Resource URI not known to the dispatcher
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Short error type used in response bodies
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::GatewayAuth(_) => "auth_error",
            ApiError::Auth(e) => e.kind(),
            ApiError::NotConfigured => "not_configured",
            ApiError::UpstreamApiError { .. } => "zoom_api_error",
            ApiError::ConfigError(_) => "config_error",
            ApiError::ValidationError(_) => "validation_error",
            ApiError::UnknownTool(_) => "unknown_tool",
            ApiError::UnknownResource(_) => "unknown_resource",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::GatewayAuth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::Transport(e)) if e.is_timeout() => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ApiError::Auth(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UpstreamApiError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::ConfigError(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownTool(_) | ApiError::UnknownResource(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = match &self {
            ApiError::Internal(err) => {
                // Log internal errors
                tracing::error!("Internal error: {:?}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}
