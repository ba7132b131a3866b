use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;

use crate::auth::CredentialManager;
use crate::error::ApiError;

/// Raw CMS response handed back to the route layer
#[derive(Debug)]
pub struct CmsResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// HTTP client for the Webflow CMS API
///
/// Attaches the bearer token from the credential manager. A 401 is reported
/// back to the manager and the call is retried once with a fresh token.
pub struct CmsHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Source of access tokens
    credentials: CredentialManager,

    /// CMS API root, without trailing slash
    base_url: String,
}

impl CmsHttpClient {
    pub fn new(
        credentials: CredentialManager,
        base_url: &str,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the upstream URL for a CMS path and optional raw query string
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        url
    }

    /// Send one authorized request to the CMS
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: Option<Bytes>,
    ) -> Result<CmsResponse, ApiError> {
        let url = self.url_for(path, query);
        let mut retried = false;

        tracing::debug!(method = %method, url = %url, "Sending CMS request");

        loop {
            let token = self.credentials.get_valid_token().await?;

            let mut req = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .header(ACCEPT, "application/json");
            if let Some(ref body) = body {
                req = req.header(CONTENT_TYPE, "application/json").body(body.clone());
            }

            let response = req.send().await.map_err(|e| transport_error(&url, e))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !retried {
                tracing::warn!("CMS returned 401, refreshing token and retrying once...");
                self.credentials.handle_upstream_auth_failure()?;
                retried = true;
                continue;
            }

            let content_type = response.headers().get(CONTENT_TYPE).cloned();
            let body = response.bytes().await.map_err(|e| transport_error(&url, e))?;

            if status.is_success() {
                tracing::debug!(status = %status, "CMS request successful");
                return Ok(CmsResponse {
                    status,
                    content_type,
                    body,
                });
            }

            if status == StatusCode::UNAUTHORIZED {
                // Fresh token rejected as well; next call must refresh again
                self.credentials.handle_upstream_auth_failure()?;
            }

            let message = String::from_utf8_lossy(&body).to_string();
            tracing::error!(
                status = status.as_u16(),
                url = %url,
                response_body = %message,
                "CMS request failed with error response"
            );
            return Err(ApiError::CmsApiError {
                status: status.as_u16(),
                message,
            });
        }
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> ApiError {
    let error_kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_body() || e.is_decode() {
        "body_error"
    } else {
        "unknown"
    };

    tracing::warn!(
        error_kind = error_kind,
        error = %e,
        url = %url,
        "CMS request error"
    );

    let status = if e.is_timeout() {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::BAD_GATEWAY
    };

    ApiError::CmsApiError {
        status: status.as_u16(),
        message: format!("CMS request failed: {} (kind: {})", e, error_kind),
    }
}
