use anyhow::Result;
use chrono::{Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Url;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use super::oauth::OAuthClient;
use super::store::CredentialStore;
use super::types::{CredentialError, CredentialRecord, CredentialState};

type RefreshFuture = Shared<BoxFuture<'static, Result<String, CredentialError>>>;

/// Credential manager
/// Owns the persisted OAuth record and hands out valid access tokens,
/// refreshing at most once at a time
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

struct Inner {
    /// Persistent key-value store holding the record
    store: Arc<dyn CredentialStore>,

    /// Fixed key the record lives under
    storage_key: String,

    /// Token endpoint client
    oauth: OAuthClient,

    /// Refresh this long before `expires_at`
    skew: Duration,

    /// Access token the CMS reported as invalid
    rejected_token: Mutex<Option<String>>,

    /// Refresh currently in flight; concurrent callers await the same future
    in_flight: Mutex<Option<RefreshFuture>>,

    /// Serializes record writes (exchange and refresh)
    write_lock: tokio::sync::Mutex<()>,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        storage_key: impl Into<String>,
        oauth: OAuthClient,
        refresh_threshold: u64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                storage_key: storage_key.into(),
                oauth,
                skew: i64::try_from(refresh_threshold)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .unwrap_or(Duration::MAX),
                rejected_token: Mutex::new(None),
                in_flight: Mutex::new(None),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Consent URL for starting the authorization-code flow
    pub fn authorization_url(&self, state: Option<&str>) -> Result<Url> {
        self.inner.oauth.authorization_url(state)
    }

    /// Exchange a one-time code and persist the resulting record
    pub async fn complete_authorization(&self, code: &str) -> Result<(), CredentialError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CredentialError::MissingAuthorizationCode);
        }

        // A refresh racing this exchange must not overwrite the new grant
        let _write = self.inner.write_lock.lock().await;

        let grant = self.inner.oauth.exchange_code(code).await?;
        let record = grant.into_record(Utc::now())?;
        self.inner.save(&record)?;
        self.inner.clear_rejection();

        tracing::info!(
            expires_at = ?record.expires_at,
            has_refresh_token = record.refresh_token.is_some(),
            "Authorization completed"
        );
        Ok(())
    }

    /// Return a usable access token, refreshing synchronously when needed
    pub async fn get_valid_token(&self) -> Result<String, CredentialError> {
        let record = self
            .inner
            .load()?
            .ok_or(CredentialError::ReauthorizationRequired)?;

        if self.inner.is_usable(&record) {
            return Ok(record.access_token);
        }

        if record.refresh_token.is_none() {
            // Nominally valid token in the skew window is still worth using
            if !self.inner.is_rejected(&record.access_token)
                && !record.is_expired_at(Utc::now())
            {
                return Ok(record.access_token);
            }
            tracing::warn!("Access token expired and no refresh token is stored");
            return Err(CredentialError::ReauthorizationRequired);
        }

        match self.refresh_single_flight(record.clone()).await {
            Ok(token) => Ok(token),
            Err(e)
                if e.is_transient()
                    && !self.inner.is_rejected(&record.access_token)
                    && !record.is_expired_at(Utc::now()) =>
            {
                tracing::warn!(
                    "Refresh failed ({}), using existing token (not yet expired)",
                    e
                );
                Ok(record.access_token)
            }
            Err(e) => Err(e),
        }
    }

    /// Mark the current access token invalid after the CMS rejected it
    pub fn handle_upstream_auth_failure(&self) -> Result<(), CredentialError> {
        if let Some(record) = self.inner.load()? {
            tracing::warn!(
                "Upstream rejected access token {}..., forcing refresh",
                token_prefix(&record.access_token)
            );
            *self
                .inner
                .rejected_token
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(record.access_token);
        }
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> Result<CredentialState, CredentialError> {
        Ok(match self.inner.load()? {
            None => CredentialState::Unauthenticated,
            Some(record) if self.inner.is_usable(&record) => CredentialState::Authorized,
            Some(_) => CredentialState::Expired,
        })
    }

    /// Current record, if any
    pub fn record(&self) -> Result<Option<CredentialRecord>, CredentialError> {
        self.inner.load()
    }

    /// True when the stored token is inside the refresh window and a refresh
    /// token exists
    pub fn needs_refresh(&self) -> Result<bool, CredentialError> {
        Ok(match self.inner.load()? {
            Some(record) => record.refresh_token.is_some() && !self.inner.is_usable(&record),
            None => false,
        })
    }

    /// Join the in-flight refresh, or start one
    async fn refresh_single_flight(
        &self,
        observed: CredentialRecord,
    ) -> Result<String, CredentialError> {
        let fut = {
            let mut slot = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(fut) => {
                    tracing::debug!("Joining in-flight token refresh");
                    fut.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let fut = async move {
                        // The slot must be cleared even if the refresh panics
                        let result = AssertUnwindSafe(inner.refresh(observed))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                tracing::error!("Token refresh panicked");
                                Err(CredentialError::Transport(
                                    "token refresh aborted".to_string(),
                                ))
                            });
                        *inner.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        fut.await
    }
}

impl Inner {
    fn load(&self) -> Result<Option<CredentialRecord>, CredentialError> {
        let raw = self
            .store
            .get(&self.storage_key)
            .map_err(|e| CredentialError::StorageUnavailable(format!("{:#}", e)))?;

        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                CredentialError::StorageUnavailable(format!("Corrupt credential record: {}", e))
            }),
        }
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), CredentialError> {
        let json = serde_json::to_string(record)
            .map_err(|e| CredentialError::StorageUnavailable(e.to_string()))?;
        self.store
            .set(&self.storage_key, &json)
            .map_err(|e| CredentialError::StorageUnavailable(format!("{:#}", e)))
    }

    fn is_rejected(&self, access_token: &str) -> bool {
        self.rejected_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_deref()
            == Some(access_token)
    }

    fn clear_rejection(&self) {
        *self.rejected_token.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn is_usable(&self, record: &CredentialRecord) -> bool {
        !self.is_rejected(&record.access_token)
            && !record.is_expiring_within(Utc::now(), self.skew)
    }

    /// Exchange the stored refresh token; only ever runs inside the shared slot
    async fn refresh(&self, observed: CredentialRecord) -> Result<String, CredentialError> {
        let _write = self.write_lock.lock().await;

        let current = self
            .load()?
            .ok_or(CredentialError::ReauthorizationRequired)?;

        // Another refresh (or a new authorization) already replaced the record
        if current.access_token != observed.access_token && self.is_usable(&current) {
            tracing::debug!("Record already refreshed, skipping token endpoint");
            return Ok(current.access_token);
        }

        let refresh_token = match current.refresh_token.as_deref() {
            Some(rt) => rt,
            None => return Err(CredentialError::ReauthorizationRequired),
        };

        match self.oauth.refresh(refresh_token).await {
            Ok(grant) => {
                let record = grant.into_record(Utc::now())?;
                self.save(&record)?;
                self.clear_rejection();
                tracing::info!(
                    "Access token refreshed ({}...), expires: {:?}",
                    token_prefix(&record.access_token),
                    record.expires_at
                );
                Ok(record.access_token)
            }
            Err(e) if e.is_rejection() => {
                tracing::error!("Refresh token rejected: {}", e);

                // Keep the record but make sure it is never served again
                let dead = CredentialRecord {
                    access_token: current.access_token,
                    refresh_token: None,
                    expires_at: Some(Utc::now()),
                };
                self.save(&dead)?;
                Err(CredentialError::ReauthorizationRequired)
            }
            Err(e) => {
                tracing::error!("Token refresh failed: {}", e);
                Err(e)
            }
        }
    }
}

fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}
