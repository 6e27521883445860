use anyhow::Context;
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenManager;
use crate::error::ApiError;

/// Page size used when listing collections
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// Thin client for the Zoom REST API.
///
/// Every call asks the token manager for headers first; nothing here retries.
pub struct ZoomApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Source of authorization headers
    auth: Arc<TokenManager>,

    base_url: String,
}

impl ZoomApiClient {
    pub fn new(
        auth: Arc<TokenManager>,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = auth.config().base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            auth,
            base_url,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and decode the JSON response.
    /// 204 and empty bodies decode to `Value::Null`.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let headers = self.auth.get_auth_header().await?;
        let url = self.url(path);

        tracing::debug!(method = %method, url = %url, "Sending Zoom API request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .headers(headers)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, url = %url, "Zoom API request error");
            ApiError::Internal(anyhow::anyhow!("HTTP request failed: {}", e))
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                url = %url,
                response_body = %text,
                "Zoom API request failed"
            );
            return Err(ApiError::UpstreamApiError {
                status: status.as_u16(),
                message: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            ApiError::Internal(anyhow::anyhow!("Invalid JSON from Zoom API: {}", e))
        })
    }

    pub async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        self.request_json(Method::GET, path, query, None).await
    }

    /// A single user, or the first page of active users
    pub async fn get_users(&self, user_id: Option<&str>) -> Result<Value, ApiError> {
        match user_id {
            Some(id) => self.get_json(&format!("users/{}", id), &[]).await,
            None => {
                let query = [
                    ("status", "active".to_string()),
                    ("page_size", DEFAULT_PAGE_SIZE.to_string()),
                    ("page_number", "1".to_string()),
                ];
                self.get_json("users", &query).await
            }
        }
    }
}
