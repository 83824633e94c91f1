// Shared helpers for integration tests: an in-process mock API server

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use envelope_client::MemoryCredentialStore;

/// Token handed out by the mock login endpoint
pub const FRESH_TOKEN: &str = "fresh-token";

/// Mock API behaviour and hit counters
pub struct MockApi {
    login_calls: AtomicUsize,
    data_calls: AtomicUsize,
    hang_first_login: bool,
    file: Bytes,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            login_calls: AtomicUsize::new(0),
            data_calls: AtomicUsize::new(0),
            hang_first_login: false,
            file: Bytes::new(),
        }
    }

    /// The first login request never completes
    pub fn hang_first_login(mut self) -> Self {
        self.hang_first_login = true;
        self
    }

    /// Content served by `/file`
    pub fn with_file(mut self, file: impl Into<Bytes>) -> Self {
        self.file = file.into();
        self
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    /// Start serving on an ephemeral port; returns the base URL
    pub async fn start(self) -> (String, Arc<MockApi>) {
        let api = Arc::new(self);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let app = Router::new()
            .route("/user/login", post(handle_login))
            .route("/data", get(handle_data))
            .route("/slow", get(handle_slow))
            .route("/file", get(handle_file))
            .route("/broken", get(handle_broken))
            .with_state(api.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (format!("http://127.0.0.1:{}", port), api)
    }
}

fn is_fresh(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", FRESH_TOKEN))
        .unwrap_or(false)
}

fn session_expired() -> Response {
    Json(json!({"code": 401, "msg": "token expired"})).into_response()
}

async fn handle_login(State(api): State<Arc<MockApi>>) -> Response {
    let call = api.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if api.hang_first_login && call == 1 {
        std::future::pending::<()>().await;
    }
    // Keep the login slow enough for concurrent callers to pile up on the lock
    tokio::time::sleep(Duration::from_millis(50)).await;
    Json(json!({"code": 200, "msg": "ok", "token": {"token": FRESH_TOKEN, "deptId": 3}}))
        .into_response()
}

async fn handle_data(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Response {
    api.data_calls.fetch_add(1, Ordering::SeqCst);
    if !is_fresh(&headers) {
        return session_expired();
    }
    Json(json!({"code": 200, "msg": "ok", "data": {"value": 42}})).into_response()
}

async fn handle_slow() -> Response {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({"code": 200, "data": "late"})).into_response()
}

async fn handle_file(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Response {
    if !is_fresh(&headers) {
        return session_expired();
    }
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        api.file.clone(),
    )
        .into_response()
}

async fn handle_broken() -> Response {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"0123456789")),
        Err(std::io::Error::new(std::io::ErrorKind::Other, "connection dropped")),
    ];
    let mut response = Body::from_stream(futures::stream::iter(chunks)).into_response();
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/octet-stream"),
    );
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, header::HeaderValue::from_static("100000"));
    response
}

/// Store pointing at `base_url` with demo credentials and a stale token
pub fn stale_store(base_url: &str) -> MemoryCredentialStore {
    MemoryCredentialStore::new(base_url)
        .with_login("demo", "secret")
        .with_session("stale-token", "")
}

/// Poll `condition` until it holds, panicking after five seconds
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
