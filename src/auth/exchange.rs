// Account credentials exchange against the identity endpoint

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;

use super::error::AuthError;
use super::types::{TokenGrant, TokenResponse, DEFAULT_EXPIRES_IN_SECS, MAX_EXPIRES_IN_SECS};
use crate::config::ZoomConfig;

/// Basic credential: base64 of `client_id:client_secret`
pub fn basic_credential(client_id: &str, client_secret: &str) -> String {
    STANDARD.encode(format!("{}:{}", client_id, client_secret))
}

/// Trade client credentials for a bearer token.
///
/// Performs exactly one request; the caller decides what to do with a failure.
pub async fn exchange_account_credentials(
    client: &Client,
    config: &ZoomConfig,
) -> Result<TokenGrant, AuthError> {
    tracing::info!("Requesting new access token from {}", config.token_url);

    // Zoom Server-to-Server OAuth uses form-urlencoded data
    let form = [
        ("grant_type", "account_credentials"),
        ("account_id", config.account_id.as_str()),
    ];

    let response = client
        .post(&config.token_url)
        .header(
            AUTHORIZATION,
            format!(
                "Basic {}",
                basic_credential(&config.client_id, &config.client_secret)
            ),
        )
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .form(&form)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        tracing::error!(
            "Credential exchange failed: status={}, body={}",
            status,
            body
        );

        // Surface the provider's reason when it sends one
        if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(reason) = error_json.get("reason").and_then(|v| v.as_str()) {
                tracing::error!("Identity endpoint reason: {}", reason);
            }
        }

        return Err(AuthError::AuthExchangeFailed {
            status: status.as_u16(),
            body,
        });
    }

    parse_token_response(&body)
}

/// Extract the token and lifetime from a success body
pub fn parse_token_response(body: &str) -> Result<TokenGrant, AuthError> {
    let data: TokenResponse = serde_json::from_str(body).map_err(|e| {
        AuthError::MalformedCredentialResponse(format!("invalid token response body: {}", e))
    })?;

    let access_token = data
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            AuthError::MalformedCredentialResponse(
                "response does not contain access_token".to_string(),
            )
        })?;

    let expires_in = data.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    if expires_in <= 0 {
        return Err(AuthError::MalformedCredentialResponse(format!(
            "non-positive expires_in: {}",
            expires_in
        )));
    }
    if expires_in > MAX_EXPIRES_IN_SECS {
        return Err(AuthError::MalformedCredentialResponse(format!(
            "expires_in out of range: {}",
            expires_in
        )));
    }

    Ok(TokenGrant {
        access_token,
        expires_in,
    })
}
