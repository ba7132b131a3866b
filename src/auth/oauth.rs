// Authorization and token endpoint calls

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use std::time::Duration;

use super::types::{CredentialError, TokenResponse};

/// OAuth application registration and endpoint locations
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub authorize_url: String,
    pub token_url: String,
}

/// Client for the upstream authorization server
#[derive(Clone)]
pub struct OAuthClient {
    client: Client,
    settings: OAuthSettings,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, settings })
    }

    /// Consent URL the user agent is redirected to
    pub fn authorization_url(&self, state: Option<&str>) -> Result<Url> {
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.settings.client_id.as_str()),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ];
        if !self.settings.scope.is_empty() {
            params.push(("scope", self.settings.scope.as_str()));
        }
        if let Some(state) = state {
            params.push(("state", state));
        }

        Url::parse_with_params(&self.settings.authorize_url, &params)
            .with_context(|| format!("Invalid authorize URL: {}", self.settings.authorize_url))
    }

    /// Trade a one-time authorization code for a token set
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, CredentialError> {
        tracing::info!("Exchanging authorization code at token endpoint...");

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];

        self.post_token_request(&form, "authorization_code").await
    }

    /// Mint a new token set from a refresh token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, CredentialError> {
        tracing::info!("Refreshing access token at token endpoint...");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];

        self.post_token_request(&form, "refresh_token").await
    }

    async fn post_token_request(
        &self,
        form: &[(&str, &str)],
        grant_type: &str,
    ) -> Result<TokenResponse, CredentialError> {
        let response = self
            .client
            .post(&self.settings.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(grant_type, error = %e, "Token request failed to send");
                CredentialError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                grant_type,
                status = status.as_u16(),
                body = %body,
                "Token endpoint rejected request"
            );

            if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(&body) {
                if let Some(error_code) = error_json.get("error").and_then(|v| v.as_str()) {
                    tracing::error!(
                        "Token endpoint error details: error={}, description={}",
                        error_code,
                        error_json
                            .get("error_description")
                            .and_then(|v| v.as_str())
                            .unwrap_or("-")
                    );
                }
            }

            return Err(CredentialError::UpstreamAuthError {
                status: status.as_u16(),
                body,
            });
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::InvalidTokenResponse(e.to_string()))?;

        if data.access_token.is_empty() {
            return Err(CredentialError::InvalidTokenResponse(
                "response does not contain access_token".to_string(),
            ));
        }

        tracing::info!(
            grant_type,
            has_refresh_token = data.refresh_token.is_some(),
            expires_in = ?data.expires_in,
            "Token endpoint issued access token"
        );

        Ok(data)
    }
}
