// Proxy API key and CORS middleware

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tower_http::cors::{Any, CorsLayer};

use crate::error::ApiError;
use crate::routes::AppState;

/// Authentication middleware for the proxy routes
///
/// When a proxy API key is configured, requires it as "Bearer {key}" in the
/// Authorization header or as the x-api-key header. Without a key every
/// request passes.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected_key) = state.proxy_api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    if let Some(auth_str) = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
    {
        if auth_str.strip_prefix("Bearer ") == Some(expected_key) {
            return Ok(next.run(request).await);
        }
    }

    if let Some(key_str) = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
    {
        if key_str == expected_key {
            return Ok(next.run(request).await);
        }
    }

    let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
    tracing::warn!(
        "[{}] Access attempt with invalid or missing API key: {} {}",
        request_id,
        request.method(),
        request.uri().path()
    );
    Err(ApiError::AuthError(
        "Invalid or missing API Key".to_string(),
    ))
}

/// Create CORS middleware layer
///
/// Configures CORS to allow all origins, methods, and headers.
/// Handles OPTIONS preflight requests automatically.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
