use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::error::AuthError;
use super::exchange;
use super::store::CredentialStore;
use super::types::{CachedToken, CredentialRecord, TokenState, TokenStatus, DEFAULT_BUFFER_MINUTES};
use crate::config::ZoomConfig;

/// Tunables for a token manager
#[derive(Debug, Clone)]
pub struct TokenManagerOptions {
    /// Minutes before expiry at which a token stops being handed out
    pub buffer_minutes: i64,

    /// Upper bound on a whole exchange request, in seconds
    pub request_timeout: u64,

    pub connect_timeout: u64,
}

impl Default for TokenManagerOptions {
    fn default() -> Self {
        Self {
            buffer_minutes: DEFAULT_BUFFER_MINUTES,
            request_timeout: 30,
            connect_timeout: 10,
        }
    }
}

/// Token manager
/// Caches the bearer token, exchanges credentials when it goes stale and
/// mirrors every new token to the durable store
pub struct TokenManager {
    config: ZoomConfig,

    /// Current credential record
    record: RwLock<CredentialRecord>,

    /// Serializes exchanges so concurrent stale callers share one round trip
    exchange_lock: Mutex<()>,

    /// Durable mirror
    store: Arc<dyn CredentialStore>,

    /// HTTP client for the identity endpoint
    client: Client,

    buffer: Duration,
}

impl TokenManager {
    /// Create a manager, seeding the record from the durable store
    pub fn new(
        config: ZoomConfig,
        store: Arc<dyn CredentialStore>,
        options: TokenManagerOptions,
    ) -> Result<Self> {
        tracing::info!("Loading cached token from {}", store.location());
        let mut record = store.load();

        // A token minted for another account is useless here
        if let Some(owner) = record.token().and_then(|t| t.account_id.as_deref()) {
            if owner != config.account_id {
                tracing::info!("Cached token belongs to a different account, ignoring it");
                record = CredentialRecord::empty();
            }
        }

        let buffer = Duration::try_minutes(options.buffer_minutes)
            .filter(|b| *b >= Duration::zero())
            .with_context(|| format!("Invalid refresh buffer: {} minutes", options.buffer_minutes))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(options.request_timeout))
            .connect_timeout(std::time::Duration::from_secs(options.connect_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let manager = Self {
            config,
            record: RwLock::new(record),
            exchange_lock: Mutex::new(()),
            store,
            client,
            buffer,
        };

        Ok(manager)
    }

    pub fn config(&self) -> &ZoomConfig {
        &self.config
    }

    /// Location of the durable mirror
    pub fn store_location(&self) -> String {
        self.store.location()
    }

    /// Token if the record is fresh, without touching the network
    async fn fresh_token(&self) -> Option<String> {
        let record = self.record.read().await;
        if record.is_valid_at(Utc::now(), self.buffer) {
            record.access_token().map(str::to_string)
        } else {
            None
        }
    }

    /// Check validity against the configured buffer
    pub async fn is_valid(&self) -> bool {
        self.record.read().await.is_valid_at(Utc::now(), self.buffer)
    }

    /// Check validity against an explicit buffer.
    /// A buffer too large to represent leaves no valid window.
    pub async fn is_valid_with_buffer(&self, buffer_minutes: i64) -> bool {
        let Some(buffer) = Duration::try_minutes(buffer_minutes) else {
            return false;
        };
        self.record.read().await.is_valid_at(Utc::now(), buffer)
    }

    pub async fn state(&self) -> TokenState {
        self.record.read().await.state_at(Utc::now(), self.buffer)
    }

    /// Get a usable bearer token, exchanging credentials only when needed.
    ///
    /// Callers that find the token stale queue on the exchange lock; whoever
    /// gets it second sees the token the first one just obtained.
    pub async fn get_authorization(&self, force_refresh: bool) -> Result<String, AuthError> {
        if !force_refresh {
            if let Some(token) = self.fresh_token().await {
                tracing::debug!(
                    "Using cached token - {} minutes remaining",
                    self.remaining_minutes().await.unwrap_or(0)
                );
                return Ok(token);
            }
        }

        let _exchange = self.exchange_lock.lock().await;

        if !force_refresh {
            if let Some(token) = self.fresh_token().await {
                tracing::debug!("Token was refreshed by a concurrent caller");
                return Ok(token);
            }
        }

        let grant = exchange::exchange_account_credentials(&self.client, &self.config)
            .await
            .map_err(|e| {
                tracing::error!("Error getting access token ({}): {}", e.kind(), e);
                e
            })?;

        let expires_in = grant.expires_in;
        let token = CachedToken::issued(
            grant.access_token,
            Utc::now(),
            expires_in,
            Some(self.config.account_id.clone()),
        )
        .ok_or_else(|| {
            AuthError::MalformedCredentialResponse(format!(
                "expires_in out of range: {}",
                expires_in
            ))
        })?;
        let record = CredentialRecord::from(token.clone());

        {
            let mut current = self.record.write().await;
            *current = record.clone();
        }

        self.store.save(&record);

        tracing::info!(
            "Token cached - valid until {}",
            token.expires_at.format("%H:%M:%S UTC")
        );

        Ok(token.access_token)
    }

    /// Whole minutes until expiry, never negative
    pub async fn remaining_minutes(&self) -> Option<i64> {
        self.record.read().await.remaining_minutes_at(Utc::now())
    }

    /// Diagnostic snapshot; never triggers an exchange
    pub async fn status(&self) -> TokenStatus {
        self.record.read().await.status_at(Utc::now(), self.buffer)
    }

    /// Force an exchange and report the resulting status
    pub async fn refresh(&self) -> Result<TokenStatus, AuthError> {
        self.get_authorization(true).await?;
        Ok(self.status().await)
    }

    /// Drop the cached token and its durable copy
    pub async fn invalidate(&self) {
        let _exchange = self.exchange_lock.lock().await;
        {
            let mut record = self.record.write().await;
            *record = CredentialRecord::empty();
        }
        self.store.clear();
        tracing::info!("Token cache cleared");
    }

    /// Headers for calls against the webinar API
    pub async fn get_auth_header(&self) -> Result<HeaderMap, AuthError> {
        let token = self.get_authorization(false).await?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            AuthError::MalformedCredentialResponse(
                "access_token contains characters not allowed in a header".to_string(),
            )
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::FileStore;
    use futures::future::join_all;
    use std::fs;
    use tempfile::TempDir;

    const TOKEN_BODY: &str = r#"{"access_token": "abc123", "token_type": "bearer", "expires_in": 3600}"#;

    fn test_config(server: &mockito::ServerGuard) -> ZoomConfig {
        ZoomConfig {
            account_id: "acct-123".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            base_url: format!("{}/v2", server.url()),
            token_url: format!("{}/oauth/token", server.url()),
        }
    }

    fn manager_with_store(server: &mockito::ServerGuard, dir: &TempDir) -> TokenManager {
        let store = Arc::new(FileStore::new(dir.path().join("token.json")));
        TokenManager::new(test_config(server), store, TokenManagerOptions::default()).unwrap()
    }

    async fn token_mock(server: &mut mockito::ServerGuard, hits: usize) -> mockito::Mock {
        server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TOKEN_BODY)
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let mut server = mockito::Server::new_async().await;
        let mock = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();
        let manager = manager_with_store(&server, &dir);

        assert_eq!(manager.state().await, TokenState::Empty);
        assert_eq!(manager.get_authorization(false).await.unwrap(), "abc123");
        assert_eq!(manager.get_authorization(false).await.unwrap(), "abc123");
        assert_eq!(manager.state().await, TokenState::Fresh);
        assert!(manager.is_valid().await);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_persists_record() {
        let mut server = mockito::Server::new_async().await;
        let _mock = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();
        let manager = manager_with_store(&server, &dir);

        manager.get_authorization(false).await.unwrap();

        let raw: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("token.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["access_token"], "abc123");
        assert!(raw["expires_at"].as_str().unwrap().ends_with("+00:00"));
    }

    #[tokio::test]
    async fn test_reload_reuses_persisted_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();

        {
            let manager = manager_with_store(&server, &dir);
            manager.get_authorization(false).await.unwrap();
        }

        // New process lifetime: served from the durable copy
        let manager = manager_with_store(&server, &dir);
        assert!(manager.is_valid().await);
        assert_eq!(manager.get_authorization(false).await.unwrap(), "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_durable_token_triggers_exchange() {
        let mut server = mockito::Server::new_async().await;
        let mock = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("token.json"),
            r#"{"access_token": "x", "expires_at": "2020-01-01T00:00:00+00:00"}"#,
        )
        .unwrap();

        let manager = manager_with_store(&server, &dir);
        assert!(!manager.is_valid().await);
        assert_eq!(manager.state().await, TokenState::Stale);
        assert_eq!(manager.remaining_minutes().await, Some(0));
        assert!(matches!(manager.status().await, TokenStatus::Expired { .. }));

        assert_eq!(manager.get_authorization(false).await.unwrap(), "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_corrupt_durable_token_triggers_exchange() {
        let mut server = mockito::Server::new_async().await;
        let mock = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("token.json"), "{{{{").unwrap();

        let manager = manager_with_store(&server, &dir);
        assert_eq!(manager.status().await, TokenStatus::NoToken);
        assert_eq!(manager.get_authorization(false).await.unwrap(), "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_of_other_account_ignored() {
        let server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("token.json"),
            r#"{"access_token": "x", "expires_at": "2999-01-01T00:00:00Z", "account_id": "someone-else"}"#,
        )
        .unwrap();

        let manager = manager_with_store(&server, &dir);
        assert_eq!(manager.state().await, TokenState::Empty);
    }

    #[tokio::test]
    async fn test_failed_exchange_keeps_previous_token() {
        let mut server = mockito::Server::new_async().await;
        let ok = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();
        let manager = manager_with_store(&server, &dir);

        manager.get_authorization(false).await.unwrap();
        ok.remove_async().await;

        let denied = server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .with_body(r#"{"reason": "Invalid client_id or client_secret"}"#)
            .expect(1)
            .create_async()
            .await;

        let before = manager.status().await;
        let err = manager.get_authorization(true).await.unwrap_err();
        assert!(matches!(err, AuthError::AuthExchangeFailed { status: 401, .. }));
        assert_eq!(manager.status().await, before);

        // Prior token is still fresh and served from cache
        assert_eq!(manager.get_authorization(false).await.unwrap(), "abc123");
        denied.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_response_leaves_record_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{"expires_in": 3600}"#)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let manager = manager_with_store(&server, &dir);

        let err = manager.get_authorization(false).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedCredentialResponse(_)));
        assert_eq!(manager.state().await, TokenState::Empty);
        assert!(!dir.path().join("token.json").exists());
    }

    #[tokio::test]
    async fn test_force_refresh_always_exchanges() {
        let mut server = mockito::Server::new_async().await;
        let mock = token_mock(&mut server, 2).await;
        let dir = TempDir::new().unwrap();
        let manager = manager_with_store(&server, &dir);

        manager.get_authorization(false).await.unwrap();
        let status = manager.refresh().await.unwrap();
        assert!(matches!(status, TokenStatus::Valid { remaining_minutes: 59..=60, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let mut server = mockito::Server::new_async().await;
        let mock = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(manager_with_store(&server, &dir));

        let calls = (0..16).map(|_| {
            let manager = manager.clone();
            async move { manager.get_authorization(false).await }
        });
        let results = join_all(calls).await;

        assert!(results.iter().all(|r| r.as_deref().ok() == Some("abc123")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalidate_clears_memory_and_disk() {
        let mut server = mockito::Server::new_async().await;
        let _mock = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();
        let manager = manager_with_store(&server, &dir);

        manager.get_authorization(false).await.unwrap();
        assert!(dir.path().join("token.json").exists());

        manager.invalidate().await;
        assert_eq!(manager.state().await, TokenState::Empty);
        assert_eq!(manager.remaining_minutes().await, None);
        assert!(!dir.path().join("token.json").exists());
    }

    #[tokio::test]
    async fn test_validity_buffer_override() {
        let mut server = mockito::Server::new_async().await;
        let _mock = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();
        let manager = manager_with_store(&server, &dir);

        manager.get_authorization(false).await.unwrap();
        assert!(manager.is_valid_with_buffer(5).await);
        assert!(!manager.is_valid_with_buffer(61).await);
        assert!(!manager.is_valid_with_buffer(i64::MAX).await);
    }

    #[tokio::test]
    async fn test_out_of_range_buffer_rejected() {
        let server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("token.json")));
        let options = TokenManagerOptions {
            buffer_minutes: i64::MAX,
            ..TokenManagerOptions::default()
        };

        assert!(TokenManager::new(test_config(&server), store, options).is_err());
    }

    #[tokio::test]
    async fn test_huge_lifetime_fails_without_caching() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{"access_token": "abc", "expires_in": 9223372036854775807}"#)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let manager = manager_with_store(&server, &dir);

        let err = manager.get_authorization(false).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedCredentialResponse(_)));
        assert_eq!(manager.state().await, TokenState::Empty);
    }

    #[tokio::test]
    async fn test_unwritable_store_keeps_token_in_memory() {
        let mut server = mockito::Server::new_async().await;
        let mock = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();
        // Parent of the token file is a regular file, so every write fails
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let store = Arc::new(FileStore::new(blocker.join("token.json")));
        let manager =
            TokenManager::new(test_config(&server), store, TokenManagerOptions::default())
                .unwrap();

        assert_eq!(manager.get_authorization(false).await.unwrap(), "abc123");
        assert!(manager.is_valid().await);
        assert_eq!(manager.get_authorization(false).await.unwrap(), "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_header() {
        let mut server = mockito::Server::new_async().await;
        let _mock = token_mock(&mut server, 1).await;
        let dir = TempDir::new().unwrap();
        let manager = manager_with_store(&server, &dir);

        let headers = manager.get_auth_header().await.unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer abc123");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }
}
