// Single-flight token refresh

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use once_cell::sync::Lazy;
use tokio::sync::Mutex;

use super::store::CredentialStore;
use crate::error::ApiError;
use crate::http_client::resolve_url;
use crate::models::{login_payload, Credential, ResultEnvelope};

/// Lock serializing refreshes; clones share the same lock
pub type RefreshLock = Arc<Mutex<()>>;

static PROCESS_REFRESH_LOCK: Lazy<RefreshLock> = Lazy::new(|| Arc::new(Mutex::new(())));

/// Lock shared by every coordinator that is not given one explicitly
pub fn process_refresh_lock() -> RefreshLock {
    PROCESS_REFRESH_LOCK.clone()
}

/// Serializes token refreshes so one expiration costs one login call.
///
/// All coordinators share [`process_refresh_lock`] by default, so clients
/// built over the same store never log in twice for one expiry. The lock
/// guards only the stale check, the login request and the store update.
/// Dropping the guard (including when the holder's future is cancelled)
/// returns the coordinator to idle.
pub struct RefreshCoordinator {
    lock: RefreshLock,
    client: Client,
    store: Arc<dyn CredentialStore>,
    network_calls: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(client: Client, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_lock(client, store, process_refresh_lock())
    }

    pub fn with_lock(client: Client, store: Arc<dyn CredentialStore>, lock: RefreshLock) -> Self {
        Self {
            lock,
            client,
            store,
            network_calls: AtomicU64::new(0),
        }
    }

    /// Obtain a token newer than `stale_token`.
    ///
    /// Returns `None` when no credential could be obtained.
    pub async fn refresh(&self, stale_token: &str) -> Option<String> {
        let _guard = self.lock.lock().await;

        let current = self.store.token();
        if current != stale_token {
            tracing::debug!("Token already refreshed by another request, reusing it");
            return Some(current);
        }

        tracing::info!("Refreshing session token via login endpoint...");
        match self.login_request().await {
            Ok(credential) => {
                self.store
                    .on_new_credential(&credential.token, credential.tenant.as_deref());
                tracing::info!("Session token refreshed");
                Some(credential.token)
            }
            Err(e) => {
                tracing::error!("Token refresh failed: {}", e);
                None
            }
        }
    }

    /// Number of login requests actually sent
    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::SeqCst)
    }

    async fn login_request(&self) -> Result<Credential, ApiError> {
        let url = resolve_url(self.store.as_ref(), &self.store.login_path())?;
        let username = self.store.username();
        let password = self.store.password();
        let payload = login_payload(self.store.login_key_style(), &username, &password);
        let body = serde_json::to_vec(&payload)?;

        self.network_calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(status = %status, response = %text, "Login response");

        let envelope: ResultEnvelope<serde_json::Value> = serde_json::from_str(&text)?;
        if !envelope.is_success() {
            return Err(ApiError::AuthFailure(
                envelope
                    .message
                    .unwrap_or_else(|| "Login failed".to_string()),
            ));
        }

        envelope
            .token
            .filter(|c| !c.token.is_empty())
            .ok_or_else(|| ApiError::AuthFailure("Login response does not contain a token".to_string()))
    }
}
