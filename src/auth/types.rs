// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default token lifetime when the identity endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Default safety margin before expiry, in minutes
pub const DEFAULT_BUFFER_MINUTES: i64 = 5;

/// Longest token lifetime accepted from the identity endpoint (ten years)
pub const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Largest refresh buffer accepted, in minutes (one day)
pub const MAX_BUFFER_MINUTES: i64 = 24 * 60;

/// A complete bearer credential. Token and expiry only ever exist together.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedToken {
    pub access_token: String,

    /// Moment of exchange. Absent when reloaded from a record that did not carry it.
    pub issued_at: Option<DateTime<Utc>>,

    pub expires_at: DateTime<Utc>,

    /// Account the token was issued for, if known
    pub account_id: Option<String>,
}

impl CachedToken {
    /// Build a token issued at `issued_at` with a server-declared lifetime.
    /// None when the expiry is not representable.
    pub fn issued(
        access_token: String,
        issued_at: DateTime<Utc>,
        expires_in_secs: i64,
        account_id: Option<String>,
    ) -> Option<Self> {
        let expires_at = Duration::try_seconds(expires_in_secs)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))?;

        Some(Self {
            access_token,
            issued_at: Some(issued_at),
            expires_at,
            account_id,
        })
    }
}

/// Logical state of the credential record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Empty,
    Fresh,
    Stale,
}

/// In-memory credential record.
///
/// Replaced as a whole on every successful exchange, so readers never see a
/// token without its expiry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialRecord {
    token: Option<CachedToken>,
}

impl CredentialRecord {
    pub fn empty() -> Self {
        Self { token: None }
    }

    pub fn token(&self) -> Option<&CachedToken> {
        self.token.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.access_token.as_str())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token.as_ref().map(|t| t.expires_at)
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none()
    }

    /// True iff a token is present and `now < expires_at - buffer`
    pub fn is_valid_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match &self.token {
            Some(t) if !t.access_token.is_empty() => t
                .expires_at
                .checked_sub_signed(buffer)
                .map_or(false, |edge| now < edge),
            _ => false,
        }
    }

    pub fn state_at(&self, now: DateTime<Utc>, buffer: Duration) -> TokenState {
        if self.token.is_none() {
            TokenState::Empty
        } else if self.is_valid_at(now, buffer) {
            TokenState::Fresh
        } else {
            TokenState::Stale
        }
    }

    /// Whole minutes until expiry, floored and clamped at zero
    pub fn remaining_minutes_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at()
            .map(|exp| (exp - now).num_seconds().div_euclid(60).max(0))
    }

    /// Read-only projection used for diagnostics
    pub fn status_at(&self, now: DateTime<Utc>, buffer: Duration) -> TokenStatus {
        match &self.token {
            None => TokenStatus::NoToken,
            Some(t) if self.is_valid_at(now, buffer) => TokenStatus::Valid {
                remaining_minutes: self.remaining_minutes_at(now).unwrap_or(0),
                expires_at: t.expires_at,
            },
            Some(t) => TokenStatus::Expired {
                expired_at: t.expires_at,
            },
        }
    }
}

impl From<CachedToken> for CredentialRecord {
    fn from(token: CachedToken) -> Self {
        Self { token: Some(token) }
    }
}

/// Token status for operators
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TokenStatus {
    NoToken,
    Valid {
        remaining_minutes: i64,
        expires_at: DateTime<Utc>,
    },
    Expired {
        expired_at: DateTime<Utc>,
    },
}

impl TokenStatus {
    /// Human readable summary
    pub fn message(&self) -> String {
        match self {
            TokenStatus::NoToken => "No token cached".to_string(),
            TokenStatus::Valid {
                remaining_minutes, ..
            } => format!("Token valid for {} minutes", remaining_minutes),
            TokenStatus::Expired { .. } => "Token has expired".to_string(),
        }
    }
}

/// Identity endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<i64>,
    #[allow(dead_code)]
    pub token_type: Option<String>,
    #[allow(dead_code)]
    pub scope: Option<String>,
}

/// Result of a successful exchange
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
}

/// Durable token record. Only `access_token` and `expires_at` are
/// authoritative on reload; the rest is informational.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: Option<String>,
    pub expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_display: Option<String>,
}

impl From<&CachedToken> for StoredToken {
    fn from(token: &CachedToken) -> Self {
        Self {
            access_token: Some(token.access_token.clone()),
            expires_at: Some(token.expires_at.to_rfc3339()),
            issued_at: token.issued_at.map(|t| t.to_rfc3339()),
            account_id: token.account_id.clone(),
            expires_at_display: Some(token.expires_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        }
    }
}
