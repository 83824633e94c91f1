// Session-expiry detection on successful JSON responses
//
// Some servers signal an expired session with HTTP 200 and a business code in
// the body. Such responses are rewritten to 401 so the auth retry path sees a
// normal authorization failure.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde_json::Value;

use crate::models::result_code;

/// Body of an intercepted response
pub enum ResponseBody {
    /// Already read for inspection; can be handed out again without I/O
    Buffered(Bytes),

    /// Untouched network body
    Streaming(reqwest::Response),
}

/// Response after passing through the detector
pub struct InterceptedResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    body: ResponseBody,
}

impl InterceptedResponse {
    /// Construct a buffered response from parts
    pub fn from_parts(status: StatusCode, headers: HeaderMap, url: Url, body: Bytes) -> Self {
        Self {
            status,
            headers,
            url,
            body: ResponseBody::Buffered(body),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Declared body length, if any
    pub fn content_length(&self) -> Option<u64> {
        match &self.body {
            ResponseBody::Buffered(bytes) => self
                .headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .or(Some(bytes.len() as u64)),
            ResponseBody::Streaming(response) => response.content_length(),
        }
    }

    /// Read the whole body
    pub async fn bytes(self) -> Result<Bytes, reqwest::Error> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(response) => response.bytes().await,
        }
    }

    /// Body as a stream of chunks
    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes, reqwest::Error>> {
        match self.body {
            ResponseBody::Buffered(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            ResponseBody::Streaming(response) => response.bytes_stream().boxed(),
        }
    }
}

/// Promotes sentinel-coded JSON responses to `401 Unauthorized`
#[derive(Debug, Clone, Copy)]
pub struct SessionExpiryDetector {
    sentinel: i64,
}

impl Default for SessionExpiryDetector {
    fn default() -> Self {
        Self::new(result_code::NO_LOGIN as i64)
    }
}

impl SessionExpiryDetector {
    pub fn new(sentinel: i64) -> Self {
        Self { sentinel }
    }

    /// Inspect a network response.
    ///
    /// Only successful JSON responses have their body read; everything else
    /// is passed through without touching the body.
    pub async fn inspect(
        &self,
        response: reqwest::Response,
    ) -> Result<InterceptedResponse, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();

        if !status.is_success() || !is_json(&headers) {
            return Ok(InterceptedResponse {
                status,
                headers,
                url,
                body: ResponseBody::Streaming(response),
            });
        }

        let body = response.bytes().await?;
        Ok(self.reinterpret(status, headers, url, body))
    }

    /// Apply the sentinel rule to an already-buffered response
    pub fn reinterpret(
        &self,
        status: StatusCode,
        headers: HeaderMap,
        url: Url,
        body: Bytes,
    ) -> InterceptedResponse {
        let status = if status.is_success()
            && is_json(&headers)
            && probe_code(&body) == Some(self.sentinel)
        {
            tracing::warn!(
                code = self.sentinel,
                path = url.path(),
                "Session expired code in response body, treating as 401"
            );
            StatusCode::UNAUTHORIZED
        } else {
            status
        };

        InterceptedResponse::from_parts(status, headers, url, body)
    }
}

/// Extract just the integer `code` field from a JSON body.
///
/// Numbers and numeric strings are accepted; anything else yields `None`.
pub fn probe_code(body: &[u8]) -> Option<i64> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("code")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extract the `msg` field from a JSON body, if present
pub fn probe_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("msg")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}
