// Configured Zoom session and its guarded replacement

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::{open_store, TokenManager, TokenManagerOptions};
use crate::config::{Config, ZoomConfig};
use crate::http_client::ZoomApiClient;

/// Settings shared by every session the slot creates
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub token_file: PathBuf,
    pub manager: TokenManagerOptions,
    pub connect_timeout: u64,
    pub request_timeout: u64,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            token_file: config.token_file.clone(),
            manager: config.token_manager_options(),
            connect_timeout: config.http_connect_timeout,
            request_timeout: config.http_request_timeout,
        }
    }
}

/// A token manager plus the API client that consumes it
pub struct Session {
    pub manager: Arc<TokenManager>,
    pub api: ZoomApiClient,
}

impl Session {
    pub fn new(config: ZoomConfig, settings: &SessionSettings) -> Result<Self> {
        let store = open_store(&settings.token_file);
        let manager = Arc::new(TokenManager::new(config, store, settings.manager.clone())?);
        let api = ZoomApiClient::new(
            manager.clone(),
            settings.connect_timeout,
            settings.request_timeout,
        )?;
        Ok(Self { manager, api })
    }
}

/// Holder of the current session.
///
/// Teardown of the old session and construction of the new one happen under
/// one lock, so callers see either the old session or the finished new one.
/// Callers keep their `Arc` for the duration of a call; a replaced session is
/// dropped once the last of them finishes.
pub struct SessionSlot {
    current: Mutex<Option<Arc<Session>>>,
    settings: SessionSettings,
}

impl SessionSlot {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            current: Mutex::new(None),
            settings,
        }
    }

    /// Replace the current session with one for `config`
    pub async fn configure(&self, config: ZoomConfig) -> Result<Arc<Session>> {
        let mut current = self.current.lock().await;

        if let Some(old) = current.take() {
            // Credentials for a different account must not leave a usable token behind
            if old.manager.config().account_id != config.account_id {
                old.manager.invalidate().await;
            }
            tracing::info!("Previous Zoom session torn down");
        }

        let session = Arc::new(Session::new(config, &self.settings)?);
        *current = Some(session.clone());
        tracing::info!("Zoom session initialized");

        Ok(session)
    }

    /// Handle to the current session, if configured
    pub async fn current(&self) -> Option<Arc<Session>> {
        self.current.lock().await.clone()
    }

    pub async fn is_configured(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Drop the current session
    pub async fn shutdown(&self) {
        if self.current.lock().await.take().is_some() {
            tracing::info!("Zoom session cleaned up");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenState;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> SessionSettings {
        SessionSettings {
            token_file: dir.path().join("token.json"),
            manager: TokenManagerOptions::default(),
            connect_timeout: 5,
            request_timeout: 5,
        }
    }

    fn zoom_config(server: &mockito::ServerGuard, account_id: &str) -> ZoomConfig {
        ZoomConfig {
            account_id: account_id.to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            base_url: format!("{}/v2", server.url()),
            token_url: format!("{}/oauth/token", server.url()),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_slot() {
        let dir = TempDir::new().unwrap();
        let slot = SessionSlot::new(settings(&dir));
        assert!(!slot.is_configured().await);
        assert!(slot.current().await.is_none());
    }

    #[tokio::test]
    async fn test_configure_and_shutdown() {
        let server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let slot = SessionSlot::new(settings(&dir));

        let session = slot.configure(zoom_config(&server, "acct-1")).await.unwrap();
        let current = slot.current().await.unwrap();
        assert!(Arc::ptr_eq(&session, &current));

        slot.shutdown().await;
        assert!(!slot.is_configured().await);
        // Outstanding handles stay usable after teardown
        assert_eq!(current.manager.state().await, TokenState::Empty);
    }

    #[tokio::test]
    async fn test_reconfigure_same_account_keeps_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{"access_token": "abc123", "expires_in": 3600}"#)
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let slot = SessionSlot::new(settings(&dir));

        let first = slot.configure(zoom_config(&server, "acct-1")).await.unwrap();
        first.manager.get_authorization(false).await.unwrap();

        let second = slot.configure(zoom_config(&server, "acct-1")).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.manager.state().await, TokenState::Fresh);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reconfigure_other_account_drops_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{"access_token": "abc123", "expires_in": 3600}"#)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let slot = SessionSlot::new(settings(&dir));

        let first = slot.configure(zoom_config(&server, "acct-1")).await.unwrap();
        first.manager.get_authorization(false).await.unwrap();

        let second = slot.configure(zoom_config(&server, "acct-2")).await.unwrap();
        assert_eq!(second.manager.state().await, TokenState::Empty);
        assert!(!dir.path().join("token.json").exists());
    }
}
