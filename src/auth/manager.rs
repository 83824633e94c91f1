use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Request, Url};
use std::sync::Arc;

use super::refresh::{process_refresh_lock, RefreshCoordinator, RefreshLock};
use super::store::CredentialStore;
use crate::error::ApiError;
use crate::http_client::resolve_url;

/// Header carrying the tenant identifier
pub const TENANT_HEADER: &str = "tenant";

/// Authentication manager
/// Decides which requests carry credentials and drives refresh on auth failure
pub struct AuthManager {
    /// Shared credential store, read fresh on every attempt
    store: Arc<dyn CredentialStore>,

    /// Single-flight refresh
    refresher: RefreshCoordinator,
}

impl AuthManager {
    pub fn new(client: Client, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_refresh_lock(client, store, process_refresh_lock())
    }

    pub fn with_refresh_lock(
        client: Client,
        store: Arc<dyn CredentialStore>,
        lock: RefreshLock,
    ) -> Self {
        Self {
            refresher: RefreshCoordinator::with_lock(client, store.clone(), lock),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Whether `url` points at the login endpoint.
    ///
    /// The login path is resolved like any other target, so a path prefix in
    /// the server address is taken into account.
    pub fn is_login_target(&self, url: &Url) -> bool {
        let login_path = self.store.login_path();
        let login_path = login_path.trim();
        if login_path.is_empty() {
            return false;
        }
        resolve_url(self.store.as_ref(), login_path)
            .map(|login| login.path() == url.path())
            .unwrap_or(false)
    }

    /// Attach credential headers to `request`.
    ///
    /// The bearer header is added only for non-login targets with a non-empty
    /// token. Returns the token that was sent (empty when none was).
    pub fn authorize(&self, request: &mut Request, is_login: bool) -> Result<String, ApiError> {
        let token = self.store.token();
        let tenant = self.store.tenant();
        let headers = request.headers_mut();

        let sent = if !is_login && !token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::AuthFailure(format!("Invalid token header: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
            token
        } else {
            headers.remove(AUTHORIZATION);
            String::new()
        };

        if !tenant.is_empty() {
            let value = HeaderValue::from_str(&tenant)
                .map_err(|e| ApiError::Unknown(format!("Invalid tenant header: {}", e)))?;
            headers.insert(HeaderName::from_static(TENANT_HEADER), value);
        }

        Ok(sent)
    }

    /// Obtain a fresh token after `stale_token` was rejected
    pub async fn recover(&self, stale_token: &str) -> Result<String, ApiError> {
        self.refresher
            .refresh(stale_token)
            .await
            .ok_or_else(|| ApiError::AuthFailure("Session expired and re-login failed".to_string()))
    }

    /// Log in explicitly, always hitting the login endpoint unless another
    /// refresh completes first
    pub async fn login(&self) -> Result<String, ApiError> {
        let current = self.store.token();
        self.recover(&current).await
    }
}
