// Streaming file transfer
// Downloads stream to disk with throttled progress; uploads go out as multipart

mod progress;

pub use progress::{format_eta, format_throughput, ProgressTracker, TransferProgress, PROGRESS_INTERVAL};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::CONNECTION;
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::Instant;

use crate::error::ApiError;
use crate::http_client::{decode_envelope, new_request_id, resolve_url, ApiClient, ApiRequest};
use crate::models::ResultEnvelope;

/// Read/write granularity of a download
pub const CHUNK_SIZE: usize = 8192;

/// Content type of the uploaded part unless overridden
pub const DEFAULT_UPLOAD_CONTENT_TYPE: &str = "image/png";

/// Multipart field name the upload endpoint expects
const UPLOAD_FIELD: &str = "file";

const BUCKET_QUERY: &str = "bucketName";

impl ApiClient {
    /// Download `url` into `destination`, reporting progress as
    /// `(fraction, throughput, eta)`.
    ///
    /// Parent directories are created as needed. A transfer that fails midway
    /// leaves whatever was written in place.
    pub async fn download_file<F>(
        &self,
        url: &str,
        destination: impl AsRef<Path>,
        timeout: Option<Duration>,
        on_progress: F,
    ) -> ResultEnvelope<PathBuf>
    where
        F: FnMut(f32, &str, &str),
    {
        let destination = destination.as_ref().to_path_buf();
        let request_id = new_request_id();

        match self
            .try_download(&request_id, url, &destination, timeout, on_progress)
            .await
        {
            Ok(bytes) => {
                tracing::info!(
                    request_id = %request_id,
                    path = %destination.display(),
                    bytes,
                    "Download complete"
                );
                ResultEnvelope::success(destination)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    url = %url,
                    path = %destination.display(),
                    error = %e,
                    "Download failed"
                );
                ResultEnvelope::from_error(&e)
            }
        }
    }

    /// Upload a file as multipart part `file` with the default content type
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> ResultEnvelope<serde_json::Value> {
        self.upload_file_as(path, DEFAULT_UPLOAD_CONTENT_TYPE).await
    }

    /// Upload a file to the configured upload endpoint and bucket
    pub async fn upload_file_as(
        &self,
        path: impl AsRef<Path>,
        content_type: &str,
    ) -> ResultEnvelope<serde_json::Value> {
        let path = path.as_ref();
        let request_id = new_request_id();

        match self.try_upload(&request_id, path, content_type).await {
            Ok(envelope) => {
                tracing::info!(
                    request_id = %request_id,
                    path = %path.display(),
                    code = envelope.code,
                    "Upload finished"
                );
                envelope
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    path = %path.display(),
                    error = %e,
                    "Upload failed"
                );
                ResultEnvelope::from_error(&e)
            }
        }
    }

    async fn try_download<F>(
        &self,
        request_id: &str,
        url: &str,
        destination: &Path,
        timeout: Option<Duration>,
        on_progress: F,
    ) -> Result<u64, ApiError>
    where
        F: FnMut(f32, &str, &str),
    {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = File::create(destination).await?;

        let request = ApiRequest::get(url)
            .content_type(None)
            .timeout(timeout.unwrap_or(self.options().download_timeout));
        let store = self.store().clone();
        let response = self
            .send_authorized(request_id, || request.build(self.client(), store.as_ref()))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::ServerError {
                status: status.as_u16(),
                description: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        tracing::debug!(request_id = %request_id, total, "Streaming download body");

        let mut writer = BufWriter::new(file);
        stream_to_sink(response.into_stream(), &mut writer, total, CHUNK_SIZE, on_progress).await
    }

    async fn try_upload(
        &self,
        request_id: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<ResultEnvelope<serde_json::Value>, ApiError> {
        let contents = Bytes::from(tokio::fs::read(path).await?);
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(UPLOAD_FIELD)
            .to_string();

        let store = self.store().clone();
        let target = store.upload_file_path();
        let bucket = store.bucket_name();

        let build = || -> Result<reqwest::Request, ApiError> {
            let mut url = resolve_url(store.as_ref(), &target)?;
            if !bucket.is_empty() {
                url.query_pairs_mut().append_pair(BUCKET_QUERY, &bucket);
            }

            // Body is rebuilt per attempt; the bytes are shared, not copied
            let part = Part::stream_with_length(contents.clone(), contents.len() as u64)
                .file_name(file_name.clone())
                .mime_str(content_type)?;
            let form = Form::new().part(UPLOAD_FIELD, part);

            Ok(self
                .client()
                .post(url)
                .header(CONNECTION, "close")
                .multipart(form)
                .build()?)
        };

        let response = self.send_authorized(request_id, build).await?;
        decode_envelope(response).await
    }
}

/// Copy `stream` into `sink` in `chunk_size` slices, reporting progress.
///
/// `total` is the declared length, or 0 when unknown. Returns the number of
/// bytes written. The sink is flushed before returning successfully.
pub async fn stream_to_sink<S, E, W, F>(
    mut stream: S,
    sink: &mut W,
    total: u64,
    chunk_size: usize,
    mut on_progress: F,
) -> Result<u64, ApiError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<ApiError>,
    W: AsyncWrite + Unpin,
    F: FnMut(f32, &str, &str),
{
    let chunk_size = chunk_size.max(1);
    let mut tracker = ProgressTracker::new(total, chunk_size, Instant::now());
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let mut chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return Err(e.into()),
        };

        while !chunk.is_empty() {
            let piece = chunk.split_to(chunk_size.min(chunk.len()));
            sink.write_all(&piece).await?;
            bytes_written += piece.len() as u64;

            if let Some(progress) = tracker.observe(bytes_written, Instant::now()) {
                on_progress(progress.fraction, &progress.throughput, &progress.eta);
            }
        }
    }

    sink.flush().await?;

    if let Some(progress) = tracker.finish(bytes_written, Instant::now()) {
        on_progress(progress.fraction, &progress.throughput, &progress.eta);
    }

    Ok(bytes_written)
}
