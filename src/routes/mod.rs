use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap, Method},
    middleware::{self as axum_middleware},
    response::{Redirect, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{CredentialError, CredentialManager};
use crate::error::ApiError;
use crate::http_client::CmsHttpClient;
use crate::middleware;
use crate::ownership::{
    filter_owned_items, is_owned_by, item_scope, stamp_owner, ItemScope, OWNER_HEADER,
};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub proxy_api_key: Option<String>,
    pub credentials: CredentialManager,
    pub cms_client: Arc<CmsHttpClient>,
}

/// Health check routes (no authentication required)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// OAuth consent, callback, and credential status
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/authorize", get(authorize_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/auth/status", get(status_handler))
        .with_state(state)
}

/// CMS pass-through routes (API key checked when configured)
pub fn cms_routes(state: AppState) -> Router {
    Router::new()
        .route("/cms/*path", any(cms_proxy_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Webflow proxy is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub state: Option<String>,
}

/// GET /auth/authorize - Redirect to the Webflow consent screen
async fn authorize_handler(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, ApiError> {
    let url = state.credentials.authorization_url(params.state.as_deref())?;
    tracing::info!("Redirecting to authorization endpoint");
    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /auth/callback - Exchange the one-time code for tokens
async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<Value>, ApiError> {
    if let Some(error) = params.error {
        tracing::warn!(
            "Authorization denied by upstream: {} ({})",
            error,
            params.error_description.as_deref().unwrap_or("-")
        );
        return Err(ApiError::ValidationError(format!(
            "Authorization was not granted: {}",
            params.error_description.unwrap_or(error)
        )));
    }

    let code = params
        .code
        .ok_or(CredentialError::MissingAuthorizationCode)?;
    state.credentials.complete_authorization(&code).await?;

    let record = state.credentials.record()?;
    Ok(Json(json!({
        "status": "authorized",
        "expires_at": record.and_then(|r| r.expires_at).map(|t| t.to_rfc3339()),
    })))
}

/// GET /auth/status - Current credential lifecycle state
async fn status_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let credential_state = state.credentials.state()?;
    let record = state.credentials.record()?;

    Ok(Json(json!({
        "state": credential_state,
        "expires_at": record.as_ref().and_then(|r| r.expires_at).map(|t| t.to_rfc3339()),
        "has_refresh_token": record.map(|r| r.refresh_token.is_some()).unwrap_or(false),
    })))
}

/// ANY /cms/*path - Forward to the CMS API with the managed bearer token
///
/// With a `firebase-uid` header the caller only sees and changes their own
/// items: lists are filtered, single items are checked against their owner,
/// and created or updated items are stamped with the caller as owner.
async fn cms_proxy_handler(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let owner = headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let scope = item_scope(&path);

    tracing::info!(
        "Request to /cms/{}: method={}, owner={}",
        path,
        method,
        owner.as_deref().unwrap_or("-")
    );

    if let Some(uid) = owner.as_deref() {
        match &scope {
            ItemScope::Item(item_path) if method != Method::GET => {
                ensure_owned(&state, item_path, uid).await?;
            }
            ItemScope::Collection if method == Method::GET || method == Method::POST => {}
            ItemScope::CollectionAction if method == Method::GET => {}
            ItemScope::Collection | ItemScope::CollectionAction => {
                tracing::warn!("Rejected {} /cms/{} for owner {}", method, path, uid);
                return Err(ApiError::Forbidden(format!(
                    "{} on item collections is not allowed for owner-scoped requests",
                    method
                )));
            }
            _ => {}
        }
    }

    let stamps_owner = method == Method::POST
        || (matches!(scope, ItemScope::Item(_))
            && (method == Method::PUT || method == Method::PATCH));

    let upstream_body = if body.is_empty() {
        None
    } else {
        match &owner {
            Some(uid) if stamps_owner => {
                let payload: Value = serde_json::from_slice(&body).map_err(|e| {
                    ApiError::ValidationError(format!("Request body is not valid JSON: {}", e))
                })?;
                let stamped = serde_json::to_vec(&stamp_owner(payload, uid))
                    .map_err(|e| ApiError::Internal(e.into()))?;
                Some(Bytes::from(stamped))
            }
            _ => Some(body),
        }
    };

    let response = state
        .cms_client
        .send(method.clone(), &path, query.as_deref(), upstream_body)
        .await?;

    let mut body = response.body;
    if let Some(uid) = owner.as_deref().filter(|_| method == Method::GET) {
        match &scope {
            ItemScope::Item(item_path) => {
                let owned = serde_json::from_slice::<Value>(&body)
                    .map(|item| is_owned_by(&item, uid))
                    .unwrap_or(false);
                if !owned {
                    return Err(not_owned(item_path, uid));
                }
            }
            _ => {
                if let Ok(payload) = serde_json::from_slice::<Value>(&body) {
                    let filtered = serde_json::to_vec(&filter_owned_items(payload, uid))
                        .map_err(|e| ApiError::Internal(e.into()))?;
                    body = Bytes::from(filtered);
                }
            }
        }
    }

    let mut builder = Response::builder().status(response.status);
    if let Some(content_type) = response.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }

    builder
        .body(Body::from(body))
        .map_err(|e| ApiError::Internal(e.into()))
}

/// Fetch the item and fail unless `uid` owns it
async fn ensure_owned(state: &AppState, item_path: &str, uid: &str) -> Result<(), ApiError> {
    let response = state
        .cms_client
        .send(Method::GET, item_path, None, None)
        .await?;

    let owned = serde_json::from_slice::<Value>(&response.body)
        .map(|item| is_owned_by(&item, uid))
        .unwrap_or(false);
    if owned {
        Ok(())
    } else {
        Err(not_owned(item_path, uid))
    }
}

/// Items owned by someone else are reported as missing
fn not_owned(item_path: &str, uid: &str) -> ApiError {
    tracing::warn!("Owner {} has no access to {}", uid, item_path);
    ApiError::NotFound(format!("Item not found: /cms/{}", item_path))
}
