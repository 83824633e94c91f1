use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Request, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{process_refresh_lock, AuthManager, CredentialStore, RefreshLock};
use crate::error::ApiError;
use crate::models::ResultEnvelope;
use crate::reinterpret::{probe_message, InterceptedResponse, SessionExpiryDetector};

/// Refresh-and-retry happens at most this many times per request
const MAX_AUTH_RETRIES: u32 = 1;

/// Timeouts and pooling for [`ApiClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub max_idle_connections: usize,
    /// Business code that signals an expired session inside a 200 response
    pub session_expired_code: i64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(1200),
            max_idle_connections: 20,
            session_expired_code: 401,
        }
    }
}

/// A single API call: method, target, optional body and query parameters
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    target: String,
    body: Option<Bytes>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    content_type: Option<String>,
    timeout: Option<Duration>,
    error: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            body: None,
            query: Vec::new(),
            headers: Vec::new(),
            content_type: Some("application/json".to_string()),
            timeout: None,
            error: None,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn put(target: impl Into<String>) -> Self {
        Self::new(Method::PUT, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::DELETE, target)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `body` as the JSON request body.
    ///
    /// A serialization failure is reported when the request is executed.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => self.body = Some(Bytes::from(bytes)),
            Err(e) => self.error = Some(e.to_string()),
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Override the default `application/json` content type; `None` sends none
    pub fn content_type(mut self, content_type: Option<&str>) -> Self {
        self.content_type = content_type.map(str::to_string);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build a transport request; called once per attempt
    pub(crate) fn build(
        &self,
        client: &Client,
        store: &dyn CredentialStore,
    ) -> Result<Request, ApiError> {
        if let Some(err) = &self.error {
            return Err(ApiError::SerializationError(err.clone()));
        }

        let mut url = resolve_url(store, &self.target)?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }

        let mut builder = client.request(self.method.clone(), url);
        if let Some(content_type) = &self.content_type {
            builder = builder.header(CONTENT_TYPE, content_type.as_str());
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(builder.build()?)
    }
}

/// Resolve `target` against the configured server.
///
/// Targets containing a scheme are used as-is. Anything else is appended to
/// the server address, keeping any path prefix it carries
/// (`http://h/api` + `/items` is `http://h/api/items`), with the configured
/// port applied. Scheme-relative targets (`//host/x`) are rejected.
pub fn resolve_url(store: &dyn CredentialStore, target: &str) -> Result<Url, ApiError> {
    if target.contains("://") {
        return Url::parse(target)
            .map_err(|e| ApiError::Unknown(format!("Invalid URL {}: {}", target, e)));
    }
    if target.starts_with("//") {
        return Err(ApiError::Unknown(format!(
            "Scheme-relative target not allowed: {}",
            target
        )));
    }

    let address = store.server_address();
    let address = address.trim().trim_end_matches('/');
    let base = if address.contains("://") {
        format!("{}/", address)
    } else {
        format!("http://{}/", address)
    };

    let mut base = Url::parse(&base)
        .map_err(|e| ApiError::Unknown(format!("Invalid server address {}: {}", base, e)))?;
    if let Some(port) = store.server_port() {
        base.set_port(Some(port))
            .map_err(|_| ApiError::Unknown(format!("Cannot set port {} on {}", port, base)))?;
    }

    // Base path ends in '/', so a relative join appends instead of replacing
    base.join(target.trim_start_matches('/'))
        .map_err(|e| ApiError::Unknown(format!("Invalid target {}: {}", target, e)))
}

/// HTTP client with envelope decoding and transparent session refresh
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Header eligibility and refresh
    auth: AuthManager,

    /// Rewrites sentinel-coded responses to 401
    detector: SessionExpiryDetector,

    options: ClientOptions,
}

impl ApiClient {
    /// Create a new API client sharing the process-wide refresh lock
    pub fn new(store: Arc<dyn CredentialStore>, options: ClientOptions) -> Result<Self> {
        Self::with_refresh_lock(store, options, process_refresh_lock())
    }

    /// Create a new API client whose refreshes serialize on `lock`
    pub fn with_refresh_lock(
        store: Arc<dyn CredentialStore>,
        options: ClientOptions,
        lock: RefreshLock,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(options.max_idle_connections)
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            auth: AuthManager::with_refresh_lock(client.clone(), store, lock),
            detector: SessionExpiryDetector::new(options.session_expired_code),
            client,
            options,
        })
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        self.auth.store()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Execute a request and decode the envelope.
    ///
    /// Never fails: every error comes back as a failed envelope.
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> ResultEnvelope<T> {
        let request_id = new_request_id();
        match self.try_execute(&request, &request_id).await {
            Ok(envelope) => {
                tracing::debug!(
                    request_id = %request_id,
                    method = %request.method,
                    target = %request.target,
                    code = envelope.code,
                    "Request completed"
                );
                envelope
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    method = %request.method,
                    target = %request.target,
                    error = %e,
                    "Request failed"
                );
                ResultEnvelope::from_error(&e)
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        target: &str,
        query: &[(&str, &str)],
    ) -> ResultEnvelope<T> {
        self.execute(with_query(ApiRequest::get(target), query)).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        target: &str,
        query: &[(&str, &str)],
    ) -> ResultEnvelope<T> {
        self.execute(with_query(ApiRequest::delete(target), query)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &B,
        query: &[(&str, &str)],
    ) -> ResultEnvelope<T> {
        self.execute(with_query(ApiRequest::post(target).json(body), query))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &B,
        query: &[(&str, &str)],
    ) -> ResultEnvelope<T> {
        self.execute(with_query(ApiRequest::put(target).json(body), query))
            .await
    }

    /// Log in with the stored username/password and return the new token
    pub async fn login(&self) -> ResultEnvelope<String> {
        match self.auth.login().await {
            Ok(token) => ResultEnvelope::success(token),
            Err(e) => ResultEnvelope::from_error(&e),
        }
    }

    async fn try_execute<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        request_id: &str,
    ) -> Result<ResultEnvelope<T>, ApiError> {
        let store = self.auth.store().clone();
        let response = self
            .send_authorized(request_id, || request.build(&self.client, store.as_ref()))
            .await?;
        decode_envelope(response).await
    }

    /// Send a request with credentials, refreshing and retrying once on 401.
    ///
    /// `build` is called for every attempt so the retry carries a fresh body,
    /// fresh headers and a fresh timeout window.
    pub(crate) async fn send_authorized<F>(
        &self,
        request_id: &str,
        build: F,
    ) -> Result<InterceptedResponse, ApiError>
    where
        F: Fn() -> Result<Request, ApiError>,
    {
        let mut auth_retries = 0;

        loop {
            let mut request = build()?;
            let is_login = self.auth.is_login_target(request.url());
            let sent_token = self.auth.authorize(&mut request, is_login)?;

            tracing::debug!(
                request_id = %request_id,
                method = %request.method(),
                url = %request.url(),
                attempt = auth_retries + 1,
                with_token = !sent_token.is_empty(),
                "Sending HTTP request"
            );

            let response = self.client.execute(request).await?;
            let response = self.detector.inspect(response).await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if is_login {
                let message = response
                    .bytes()
                    .await
                    .ok()
                    .and_then(|body| probe_message(&body))
                    .unwrap_or_else(|| "Login rejected".to_string());
                return Err(ApiError::AuthFailure(message));
            }

            if auth_retries >= MAX_AUTH_RETRIES {
                tracing::warn!(
                    request_id = %request_id,
                    "Still unauthorized after credential refresh, giving up"
                );
                return Err(ApiError::AuthFailure(
                    "Session expired after credential refresh".to_string(),
                ));
            }

            tracing::warn!(
                request_id = %request_id,
                "Received 401, refreshing token and retrying..."
            );
            self.auth.recover(&sent_token).await?;
            auth_retries += 1;
        }
    }
}

/// Decode a full envelope from a non-401 response
pub(crate) async fn decode_envelope<T: DeserializeOwned>(
    response: InterceptedResponse,
) -> Result<ResultEnvelope<T>, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let url = response.url().clone();
        let body = response.bytes().await.unwrap_or_default();
        tracing::warn!(
            status = status.as_u16(),
            url = %url,
            response_body = %String::from_utf8_lossy(&body),
            "Received error response"
        );
        return Err(ApiError::ServerError {
            status: status.as_u16(),
            description: status.canonical_reason().unwrap_or("Unknown").to_string(),
        });
    }

    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn with_query(mut request: ApiRequest, query: &[(&str, &str)]) -> ApiRequest {
    for (key, value) in query {
        request = request.query(*key, *value);
    }
    request
}

/// Short id used to correlate log lines of one call
pub(crate) fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
