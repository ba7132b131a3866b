// Error handling module
// Defines error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::CredentialError;

/// Route the operator is sent to when the OAuth flow must be repeated
pub const AUTHORIZE_PATH: &str = "/auth/authorize";

/// API errors that can occur during request processing
#[derive(Error, Debug)]
pub enum ApiError {
    /// Caller failed the proxy API key check
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Credential lifecycle failure
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Error from the Webflow CMS API
    #[error("CMS API error: {status} - {message}")]
    CmsApiError { status: u16, message: String },

    /// Caller may not act on this resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource missing, or owned by someone else
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Short category used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::AuthError(_) => "auth_error",
            ApiError::Credential(CredentialError::MissingAuthorizationCode) => {
                "missing_authorization_code"
            }
            ApiError::Credential(CredentialError::UpstreamAuthError { .. }) => "upstream_auth_error",
            ApiError::Credential(CredentialError::ReauthorizationRequired) => {
                "reauthorization_required"
            }
            ApiError::Credential(CredentialError::StorageUnavailable(_)) => "storage_unavailable",
            ApiError::Credential(CredentialError::Transport(_)) => "upstream_unreachable",
            ApiError::Credential(CredentialError::InvalidTokenResponse(_)) => {
                "invalid_token_response"
            }
            ApiError::CmsApiError { .. } => "cms_api_error",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::ValidationError(_) => "validation_error",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_type = self.kind();
        let (status, message) = match self {
            ApiError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Credential(err) => {
                let status = match &err {
                    CredentialError::MissingAuthorizationCode => StatusCode::BAD_REQUEST,
                    CredentialError::UpstreamAuthError { .. } => StatusCode::BAD_GATEWAY,
                    CredentialError::ReauthorizationRequired => StatusCode::UNAUTHORIZED,
                    CredentialError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    CredentialError::Transport(_) => StatusCode::GATEWAY_TIMEOUT,
                    CredentialError::InvalidTokenResponse(_) => StatusCode::BAD_GATEWAY,
                };
                let message = match err {
                    CredentialError::ReauthorizationRequired => format!(
                        "Please (re)authorize the Webflow integration: visit {}",
                        AUTHORIZE_PATH
                    ),
                    CredentialError::StorageUnavailable(ref detail) => {
                        tracing::error!("Credential storage error: {}", detail);
                        "Credential storage unavailable".to_string()
                    }
                    other => other.to_string(),
                };
                (status, message)
            }
            ApiError::CmsApiError { status, message } => {
                let status_code =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status_code, message)
            }
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
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
