// Tool and resource catalogue plus dispatch

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::AppState;
use crate::auth::{TokenState, TokenStatus};
use crate::config::{mask, ZoomConfig};
use crate::error::ApiError;
use crate::session::Session;

/// Tool invocation request
#[derive(Debug, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub content_type: &'static str,
    pub text: String,
}

/// Tool invocation result
#[derive(Debug, Serialize)]
pub struct ToolResult {
    pub content: Vec<TextContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: String) -> Self {
        Self {
            content: vec![TextContent {
                content_type: "text",
                text,
            }],
            is_error: false,
        }
    }

    pub fn error(text: String) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }
}

/// Descriptors for every tool the gateway dispatches
pub fn tool_definitions() -> Value {
    json!([
        {
            "name": "auto_configure_zoom",
            "description": "Auto-configure Zoom API from environment variables (.env file)",
            "inputSchema": {"type": "object", "properties": {}}
        },
        {
            "name": "configure_zoom",
            "description": "Manually configure Zoom API credentials",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "account_id": {"type": "string", "description": "Zoom account ID"},
                    "client_id": {"type": "string", "description": "Zoom app client ID"},
                    "client_secret": {"type": "string", "description": "Zoom app client secret"}
                },
                "required": ["account_id", "client_id", "client_secret"]
            }
        },
        {
            "name": "get_token_status",
            "description": "Check current access token status and remaining time",
            "inputSchema": {"type": "object", "properties": {}}
        },
        {
            "name": "refresh_token",
            "description": "Force refresh the access token",
            "inputSchema": {"type": "object", "properties": {}}
        },
        {
            "name": "invalidate_token",
            "description": "Discard the cached access token; the next request exchanges a new one",
            "inputSchema": {"type": "object", "properties": {}}
        },
        {
            "name": "get_users",
            "description": "Get Zoom account users",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": {"type": "string", "description": "Optional specific user ID"}
                }
            }
        }
    ])
}

/// Descriptors for readable resources
pub fn resource_definitions() -> Value {
    json!([
        {
            "uri": "zoom://config",
            "name": "Zoom Configuration",
            "description": "Current Zoom API configuration status",
            "mimeType": "application/json"
        },
        {
            "uri": "zoom://token-status",
            "name": "Token Status",
            "description": "Current access token status and expiry information",
            "mimeType": "application/json"
        },
        {
            "uri": "zoom://env-status",
            "name": "Environment Status",
            "description": "Check if environment variables are properly loaded",
            "mimeType": "application/json"
        }
    ])
}

/// Run a tool and produce its text output
pub async fn dispatch(state: &AppState, call: &ToolCall) -> Result<String, ApiError> {
    match call.name.as_str() {
        "auto_configure_zoom" => auto_configure(state).await,
        "configure_zoom" => configure(state, &call.arguments).await,
        "get_token_status" => {
            let session = require_session(state).await?;
            Ok(format_status(&session.manager.status().await))
        }
        "refresh_token" => {
            let session = require_session(state).await?;
            let status = session.manager.refresh().await?;
            let minutes = match status {
                TokenStatus::Valid {
                    remaining_minutes, ..
                } => remaining_minutes,
                _ => 0,
            };
            Ok(format!(
                "Token refreshed successfully!\nValid for: {} minutes",
                minutes
            ))
        }
        "invalidate_token" => {
            let session = require_session(state).await?;
            session.manager.invalidate().await;
            Ok("Token cache cleared\nA new token will be generated on the next request".to_string())
        }
        "get_users" => {
            let session = require_session(state).await?;
            let user_id = optional_str(&call.arguments, "user_id")?;
            let data = session.api.get_users(user_id).await?;
            Ok(format_users(&data, user_id.is_some()))
        }
        other => Err(ApiError::UnknownTool(other.to_string())),
    }
}

/// Read a resource as JSON
pub async fn read_resource(state: &AppState, uri: &str) -> Result<Value, ApiError> {
    match uri {
        "zoom://config" => Ok(match state.sessions.current().await {
            Some(session) => {
                let config = session.manager.config();
                let token_cache_active = session.manager.state().await != TokenState::Empty;
                json!({
                    "configured": true,
                    "account_id": mask(&config.account_id),
                    "base_url": config.base_url,
                    "token_cache_active": token_cache_active,
                    "token_store": session.manager.store_location(),
                })
            }
            None => json!({"configured": false}),
        }),
        "zoom://token-status" => {
            let session = require_session(state).await?;
            let status = session.manager.status().await;
            let mut body = serde_json::to_value(&status)
                .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
            body["message"] = Value::String(status.message());
            Ok(body)
        }
        "zoom://env-status" => Ok(match ZoomConfig::from_env() {
            Some(config) => json!({
                "status": "loaded",
                "credentials": config.masked(),
            }),
            None => json!({
                "status": "missing",
                "message": "Environment variables not found. Check .env file.",
                "required": ["ZOOM_ACCOUNT_ID", "ZOOM_CLIENT_ID", "ZOOM_CLIENT_SECRET"],
            }),
        }),
        other => Err(ApiError::UnknownResource(other.to_string())),
    }
}

async fn require_session(state: &AppState) -> Result<Arc<Session>, ApiError> {
    state.sessions.current().await.ok_or(ApiError::NotConfigured)
}

async fn auto_configure(state: &AppState) -> Result<String, ApiError> {
    let Some(env_config) = ZoomConfig::from_env() else {
        return Err(ApiError::ConfigError(
            "Environment variables not found!\n\n\
             Please create a .env file with:\n\
             ZOOM_ACCOUNT_ID=your_account_id\n\
             ZOOM_CLIENT_ID=your_client_id\n\
             ZOOM_CLIENT_SECRET=your_client_secret"
                .to_string(),
        ));
    };

    let config = state.config.zoom_config(
        env_config.account_id,
        env_config.client_id,
        env_config.client_secret,
    );
    let account = mask(&config.account_id);
    state.sessions.configure(config).await?;

    Ok(format!(
        "Zoom API auto-configured from environment!\nAccount ID: {}\nSmart token caching is now active!",
        account
    ))
}

async fn configure(state: &AppState, args: &Value) -> Result<String, ApiError> {
    let config = state.config.zoom_config(
        required_str(args, "account_id")?.to_string(),
        required_str(args, "client_id")?.to_string(),
        required_str(args, "client_secret")?.to_string(),
    );
    state.sessions.configure(config).await?;

    Ok("Zoom API configured manually! Token caching is now active.".to_string())
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ApiError> {
    match args.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(ApiError::ValidationError(
            format!("missing required argument '{}'", key),
        )),
        Some(_) => Err(ApiError::ValidationError(format!(
            "argument '{}' must be a string",
            key
        ))),
    }
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, ApiError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ApiError::ValidationError(format!(
            "argument '{}' must be a string",
            key
        ))),
    }
}

pub fn format_status(status: &TokenStatus) -> String {
    match status {
        TokenStatus::NoToken => "No access token cached".to_string(),
        TokenStatus::Valid {
            remaining_minutes, ..
        } => format!(
            "Access token is VALID\nRemaining time: {} minutes",
            remaining_minutes
        ),
        TokenStatus::Expired { .. } => {
            "Access token has EXPIRED\nWill generate new token on next request".to_string()
        }
    }
}

fn format_users(data: &Value, single: bool) -> String {
    let field = |user: &Value, key: &str| -> String {
        match user.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "-".to_string(),
            Some(other) => other.to_string(),
        }
    };

    if data.is_null() {
        return "No user data returned".to_string();
    }

    if single {
        return [
            "User Details:".to_string(),
            format!("ID: {}", field(data, "id")),
            format!("Email: {}", field(data, "email")),
            format!("First Name: {}", field(data, "first_name")),
            format!("Last Name: {}", field(data, "last_name")),
            format!("Type: {}", field(data, "type")),
        ]
        .join("\n");
    }

    let users = data
        .get("users")
        .and_then(|u| u.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut lines = vec![format!("Found {} users:", users.len()), String::new()];
    for user in users.iter().take(10) {
        lines.push(format!(
            "• {} (ID: {})",
            field(user, "email"),
            field(user, "id")
        ));
    }
    if users.len() > 10 {
        lines.push(format!("... and {} more users", users.len() - 10));
    }
    lines.join("\n")
}
