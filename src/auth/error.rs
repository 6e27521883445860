// Errors of the credential exchange protocol

use thiserror::Error;

/// Failure of an in-flight credential exchange.
///
/// None of these mutate the cached record; callers propagate them unchanged.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Identity endpoint answered with a non-success status
    #[error("Credential exchange failed: {status} - {body}")]
    AuthExchangeFailed { status: u16, body: String },

    /// Success status but the body is not a usable token response
    #[error("Malformed credential response: {0}")]
    MalformedCredentialResponse(String),

    /// Network failure or timeout talking to the identity endpoint
    #[error("Credential exchange request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl AuthError {
    /// Short machine-readable kind, used in logs and tool output
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::AuthExchangeFailed { .. } => "auth_exchange_failed",
            AuthError::MalformedCredentialResponse(_) => "malformed_credential_response",
            AuthError::Transport(e) if e.is_timeout() => "timeout",
            AuthError::Transport(_) => "transport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AuthError::AuthExchangeFailed {
            status: 401,
            body: "invalid_client".to_string(),
        };
        assert_eq!(err.to_string(), "Credential exchange failed: 401 - invalid_client");
        assert_eq!(err.kind(), "auth_exchange_failed");

        let err = AuthError::MalformedCredentialResponse("missing access_token".to_string());
        assert_eq!(
            err.to_string(),
            "Malformed credential response: missing access_token"
        );
        assert_eq!(err.kind(), "malformed_credential_response");
    }
}
