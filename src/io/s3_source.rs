use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::{GetObjectError, GetObjectOutput};
use aws_sdk_s3::primitives::DateTimeFormat;
use aws_sdk_s3::Client;
use axum::body::Body;
use bytes::Bytes;

use super::http_source::archive_key;
use super::range_source::{
    range_header, ArchiveSource, CacheMetadata, RangeResponse, RangeSource, RawResponse,
};
use crate::error::IoError;

/// S3-backed origin.
///
/// Archive paths become object keys within the bucket, optionally under a
/// prefix.
#[derive(Clone)]
pub struct S3ArchiveSource {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3ArchiveSource {
    /// Create a new S3ArchiveSource for the given bucket.
    ///
    /// # Arguments
    /// * `client` - AWS S3 client to use for requests
    /// * `bucket` - S3 bucket name containing the archives
    /// * `prefix` - Optional key prefix for archive objects
    pub fn new(client: Client, bucket: String, prefix: Option<String>) -> Self {
        Self {
            client,
            bucket,
            prefix,
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ArchiveSource for S3ArchiveSource {
    type Source = S3RangeSource;

    fn open(&self, path: &str) -> Result<Self::Source, IoError> {
        let key = archive_key(self.prefix.as_deref(), path);
        Ok(S3RangeSource::new(
            self.client.clone(),
            self.bucket.clone(),
            key,
        ))
    }
}

/// S3-backed implementation of RangeSource.
///
/// Reads byte ranges from objects in S3 or S3-compatible storage (MinIO, R2,
/// etc.) using ranged GetObject calls. No HEAD request is made up front; the
/// object size is never needed.
#[derive(Clone)]
pub struct S3RangeSource {
    client: Client,
    bucket: String,
    key: String,
    identifier: String,
}

impl S3RangeSource {
    /// Create a new S3RangeSource for the given bucket and key.
    pub fn new(client: Client, bucket: String, key: String) -> Self {
        let identifier = format!("s3://{}/{}", bucket, key);
        Self {
            client,
            bucket,
            key,
            identifier,
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the object key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Map an SDK error onto the origin error taxonomy.
    ///
    /// Returns `None` for 416, which callers treat as an empty window.
    fn map_error(&self, e: SdkError<GetObjectError>) -> Option<IoError> {
        let status = e.raw_response().map(|r| r.status().as_u16());
        match status {
            Some(404) => Some(IoError::NotFound(self.identifier.clone())),
            Some(412) => Some(IoError::PreconditionFailed(self.identifier.clone())),
            Some(416) => None,
            _ => {
                let is_no_such_key = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if is_no_such_key {
                    Some(IoError::NotFound(self.identifier.clone()))
                } else {
                    Some(IoError::S3(e.to_string()))
                }
            }
        }
    }
}

fn cache_metadata(output: &GetObjectOutput) -> CacheMetadata {
    CacheMetadata {
        etag: output.e_tag().map(|s| s.to_string()),
        expires: output.expires_string().map(|s| s.to_string()),
        cache_control: output.cache_control().map(|s| s.to_string()),
    }
}

#[async_trait]
impl RangeSource for S3RangeSource {
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

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .range(range_header(offset, len))
            .set_if_match(if_match.map(|s| s.to_string()))
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                return match self.map_error(e) {
                    Some(err) => Err(err),
                    None => Ok(RangeResponse {
                        data: Bytes::new(),
                        cache: CacheMetadata::default(),
                    }),
                }
            }
        };

        let cache = cache_metadata(&resp);
        let mut data = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();
        data.truncate(len);

        Ok(RangeResponse { data, cache })
    }

    async fn open_raw(&self, range: Option<&str>) -> Result<RawResponse, IoError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .set_range(range.map(|s| s.to_string()))
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                return match self.map_error(e) {
                    Some(err) => Err(err),
                    None => Ok(RawResponse {
                        status: 416,
                        cache: CacheMetadata::default(),
                        content_type: None,
                        content_length: None,
                        content_range: None,
                        last_modified: None,
                        body: Body::empty(),
                    }),
                }
            }
        };

        let status = if resp.content_range().is_some() {
            206
        } else {
            200
        };
        let cache = cache_metadata(&resp);
        let content_type = resp.content_type().map(|s| s.to_string());
        let content_length = resp.content_length().and_then(|n| u64::try_from(n).ok());
        let content_range = resp.content_range().map(|s| s.to_string());
        let last_modified = resp
            .last_modified()
            .and_then(|t| t.fmt(DateTimeFormat::HttpDate).ok());

        // The SDK stream is collected before handing it to axum
        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        Ok(RawResponse {
            status,
            cache,
            content_type,
            content_length,
            content_range,
            last_modified,
            body: Body::from(data),
        })
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint:
/// ```ignore
/// let client = create_s3_client(None, "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // For S3-compatible services, we often need to use path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
