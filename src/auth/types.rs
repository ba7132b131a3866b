// Credential types and token endpoint payloads

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted OAuth credential record
///
/// Stored as JSON under a single storage key. Replaced in full on every
/// successful exchange or refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// True once `now` is inside the skew window before `expires_at`.
    /// Records without an expiry never expire locally.
    pub fn is_expiring_within(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            None => false,
            Some(exp) => exp.checked_sub_signed(skew).map_or(true, |start| now > start),
        }
    }

    /// True once `expires_at` has actually passed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => false,
            Some(exp) => now >= exp,
        }
    }
}

/// Lifecycle state of the credential record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// No record in storage
    Unauthenticated,
    /// Record with a live access token
    Authorized,
    /// Record whose access token is known or suspected invalid
    Expired,
}

/// Credential manager errors
///
/// `Clone` because a single refresh result is handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialError {
    /// Callback arrived without an authorization code
    #[error("Authorization code is missing")]
    MissingAuthorizationCode,

    /// Token endpoint rejected the exchange or refresh
    #[error("Token endpoint rejected the request: {status} - {body}")]
    UpstreamAuthError { status: u16, body: String },

    /// No usable credential and no way to mint one automatically
    #[error("Reauthorization required: complete the OAuth flow again")]
    ReauthorizationRequired,

    /// Persistent store read or write failed
    #[error("Credential storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Network failure or timeout talking to the token endpoint (retryable)
    #[error("Token endpoint unreachable: {0}")]
    Transport(String),

    /// Token endpoint answered 2xx with an unusable body
    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),
}

impl CredentialError {
    /// 4xx answers from the token endpoint are terminal for the grant used
    pub fn is_rejection(&self) -> bool {
        matches!(self, CredentialError::UpstreamAuthError { status, .. } if (400..500).contains(status))
    }

    /// Failures that say nothing about the stored grant; a token that has
    /// not expired yet may still be served
    pub fn is_transient(&self) -> bool {
        match self {
            CredentialError::Transport(_) | CredentialError::InvalidTokenResponse(_) => true,
            CredentialError::UpstreamAuthError { .. } => !self.is_rejection(),
            _ => false,
        }
    }
}

/// Token endpoint response for both grant types
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Build the record to persist, anchoring `expires_in` at `now`
    pub fn into_record(self, now: DateTime<Utc>) -> Result<CredentialRecord, CredentialError> {
        let expires_at = match self.expires_in {
            None => None,
            Some(secs) => Some(
                i64::try_from(secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .and_then(|ttl| now.checked_add_signed(ttl))
                    .ok_or_else(|| {
                        CredentialError::InvalidTokenResponse(format!(
                            "expires_in out of range: {}",
                            secs
                        ))
                    })?,
            ),
        };

        Ok(CredentialRecord {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        })
    }
}
