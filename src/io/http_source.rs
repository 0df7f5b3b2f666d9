//! HTTP(S) origin implementation.
//!
//! Archives live as plain objects behind a base URL (a public bucket, a CDN,
//! any static file server that understands `Range`). Each read is one GET.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use reqwest::header::{
    HeaderMap, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, EXPIRES,
    IF_MATCH, LAST_MODIFIED, RANGE,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::range_source::{
    range_header, slice_window, ArchiveSource, CacheMetadata, RangeResponse, RangeSource,
    RawResponse,
};
use crate::error::IoError;

/// Default per-request timeout against the origin.
pub const DEFAULT_ORIGIN_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("pmtiles-edge/", env!("CARGO_PKG_VERSION"));

/// Origin that serves archives from a base URL.
#[derive(Clone)]
pub struct HttpArchiveSource {
    client: Client,
    base_url: Url,
    prefix: Option<String>,
    retry: bool,
}

impl HttpArchiveSource {
    /// Create an origin rooted at `base_url`.
    ///
    /// # Arguments
    /// * `base_url` - Bucket or CDN URL, e.g. `https://tiles.example.com/archives`
    /// * `prefix` - Optional key prefix inserted before every archive path
    /// * `timeout` - Per-request timeout
    /// * `retry` - Retry once on connect/timeout failures
    pub fn new(
        base_url: &str,
        prefix: Option<String>,
        timeout: Duration,
        retry: bool,
    ) -> Result<Self, IoError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| IoError::Connection(format!("invalid origin URL {}: {}", base_url, e)))?;

        // Url::join replaces the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IoError::Connection(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            prefix,
            retry,
        })
    }

    /// Get the normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl ArchiveSource for HttpArchiveSource {
    type Source = HttpRangeSource;

    fn open(&self, path: &str) -> Result<Self::Source, IoError> {
        let key = archive_key(self.prefix.as_deref(), path);
        let url = self
            .base_url
            .join(&key)
            .map_err(|e| IoError::Connection(format!("invalid archive path {}: {}", key, e)))?;

        Ok(HttpRangeSource {
            client: self.client.clone(),
            identifier: url.to_string(),
            url,
            retry: self.retry,
        })
    }
}

/// Join an optional prefix and an archive path into an object key.
pub fn archive_key(prefix: Option<&str>, path: &str) -> String {
    let path = path.trim_start_matches('/');
    match prefix.map(|p| p.trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{}/{}", p, path),
        _ => path.to_string(),
    }
}

/// HTTP-backed implementation of [`RangeSource`] for a single archive URL.
#[derive(Clone)]
pub struct HttpRangeSource {
    client: Client,
    url: Url,
    identifier: String,
    retry: bool,
}

impl HttpRangeSource {
    /// Get the archive URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send a request, retrying once on connect or timeout failures.
    async fn send<F>(&self, build: F) -> Result<Response, IoError>
    where
        F: Fn() -> RequestBuilder,
    {
        match build().send().await {
            Ok(response) => Ok(response),
            Err(e) if self.retry && (e.is_connect() || e.is_timeout()) => {
                warn!(url = %self.url, error = %e, "Origin request failed, retrying once");
                build()
                    .send()
                    .await
                    .map_err(|e| IoError::Connection(e.to_string()))
            }
            Err(e) => Err(IoError::Connection(e.to_string())),
        }
    }

    fn status_error(&self, status: StatusCode) -> IoError {
        match status {
            StatusCode::NOT_FOUND => IoError::NotFound(self.identifier.clone()),
            StatusCode::PRECONDITION_FAILED => {
                IoError::PreconditionFailed(self.identifier.clone())
            }
            _ => IoError::Status {
                status: status.as_u16(),
                identifier: self.identifier.clone(),
            },
        }
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    async fn get_bytes(
        &self,
        offset: u64,
        len: usize,
        if_match: Option<&str>,
    ) -> Result<RangeResponse, IoError> {
        // Handle zero-length reads
        if len == 0 {
            return Ok(RangeResponse {
                data: Bytes::new(),
                cache: CacheMetadata::default(),
            });
        }

        let range = range_header(offset, len);
        let response = self
            .send(|| {
                let request = self.client.get(self.url.clone()).header(RANGE, &range);
                match if_match {
                    Some(etag) => request.header(IF_MATCH, etag),
                    None => request,
                }
            })
            .await?;

        let status = response.status();
        let cache = cache_metadata(response.headers());

        match status {
            StatusCode::PARTIAL_CONTENT => {
                let mut data = response
                    .bytes()
                    .await
                    .map_err(|e| IoError::Connection(e.to_string()))?;
                data.truncate(len);
                Ok(RangeResponse { data, cache })
            }
            StatusCode::OK => {
                debug!(url = %self.url, "Origin ignored Range header, slicing locally");
                let full = response
                    .bytes()
                    .await
                    .map_err(|e| IoError::Connection(e.to_string()))?;
                Ok(RangeResponse {
                    data: slice_window(full, offset, len),
                    cache,
                })
            }
            // Window starts past the end of the object
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(RangeResponse {
                data: Bytes::new(),
                cache,
            }),
            other => Err(self.status_error(other)),
        }
    }

    async fn open_raw(&self, range: Option<&str>) -> Result<RawResponse, IoError> {
        let response = self
            .send(|| {
                let request = self.client.get(self.url.clone());
                match range {
                    Some(range) => request.header(RANGE, range),
                    None => request,
                }
            })
            .await?;

        let status = response.status();
        match status {
            StatusCode::OK
            | StatusCode::PARTIAL_CONTENT
            | StatusCode::NOT_MODIFIED
            | StatusCode::RANGE_NOT_SATISFIABLE => {
                let headers = response.headers();
                let cache = cache_metadata(headers);
                let content_type = header_string(headers, CONTENT_TYPE);
                let content_length =
                    header_string(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok());
                let content_range = header_string(headers, CONTENT_RANGE);
                let last_modified = header_string(headers, LAST_MODIFIED);

                Ok(RawResponse {
                    status: status.as_u16(),
                    cache,
                    content_type,
                    content_length,
                    content_range,
                    last_modified,
                    body: Body::from_stream(response.bytes_stream()),
                })
            }
            other => Err(self.status_error(other)),
        }
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn cache_metadata(headers: &HeaderMap) -> CacheMetadata {
    CacheMetadata {
        etag: header_string(headers, ETAG),
        expires: header_string(headers, EXPIRES),
        cache_control: header_string(headers, CACHE_CONTROL),
    }
}
