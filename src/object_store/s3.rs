//! Amazon S3 object store.
//!
//! Objects map one-to-one onto S3 objects:
//! ```text
//! s3://{bucket}/{key}
//! ```

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use super::{ObjectMeta, ObjectStore, ObjectStoreError, Result, StoreStatus};

/// S3-based object store.
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Create a new S3 object store.
    ///
    /// Uses default credentials from the environment (AWS_ACCESS_KEY_ID,
    /// AWS_SECRET_ACCESS_KEY, or IAM role).
    pub async fn new(region: Option<&str>) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            config_loader = config_loader.region(aws_config::Region::new(region.to_string()));
        }
        let config = config_loader.load().await;
        Self {
            client: Client::new(&config),
        }
    }

    /// Create with custom endpoint (for S3-compatible services like MinIO).
    pub async fn with_endpoint(endpoint: &str, region: Option<&str>) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = region {
            config_loader = config_loader.region(aws_config::Region::new(region.to_string()));
        }

        let config = config_loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .endpoint_url(endpoint)
            .force_path_style(true) // Required for MinIO and most S3-compatible services
            .build();

        Self {
            client: Client::from_conf(s3_config),
        }
    }

    /// Create with explicit client (for testing).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// HTTP status of the last response seen by one request.
#[derive(Clone, Default)]
struct StatusCapture(Arc<AtomicU16>);

impl StatusCapture {
    fn record(&self, status: u16) {
        self.0.store(status, Ordering::Release);
    }

    /// Recorded status, or `fallback` when no response was seen.
    fn status_or(&self, fallback: StoreStatus) -> StoreStatus {
        match self.0.load(Ordering::Acquire) {
            0 => fallback,
            status => StoreStatus(status),
        }
    }

    /// Response hook for `customize().mutate_response(..)`.
    fn hook(&self) -> impl Fn(&mut HttpResponse) + Send + Sync + 'static {
        let capture = self.clone();
        move |response: &mut HttpResponse| capture.record(response.status().as_u16())
    }
}

/// Translate an SDK failure, keeping the HTTP status S3 reported.
fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> ObjectStoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    match status {
        Some(404) => ObjectStoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        Some(status) => ObjectStoreError::Rejected {
            status,
            message: DisplayErrorContext(&err).to_string(),
        },
        None => ObjectStoreError::Backend(DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, bucket: &str, key: &str, payload: Bytes) -> Result<StoreStatus> {
        let size = payload.len();
        let capture = StatusCapture::default();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(payload))
            .customize()
            .mutate_response(capture.hook())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;

        let status = capture.status_or(StoreStatus::OK);
        debug!(bucket = %bucket, key = %key, size, status = status.0, "Stored object in S3");
        Ok(status)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("S3 body read failed: {}", e)))?;
        Ok(body.into_bytes())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;

        Ok(ObjectMeta {
            key: key.to_string(),
            size: response.content_length().unwrap_or_default().max(0) as u64,
            etag: response.e_tag().map(|t| t.trim_matches('"').to_string()),
        })
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pages = 0;
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);

            if let Some(prefix) = prefix {
                request = request.prefix(prefix);
            }

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| map_sdk_error(e, bucket, prefix.unwrap_or_default()))?;
            pages += 1;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            continuation_token = response.next_continuation_token().map(|s| s.to_string());
            if continuation_token.is_none() {
                break;
            }
        }

        debug!(bucket = %bucket, pages, objects = keys.len(), "Listed S3 objects");
        Ok(keys)
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<StoreStatus> {
        let capture = StatusCapture::default();
        self.client
            .copy_object()
            .copy_source(format!("{}/{}", src_bucket, src_key))
            .bucket(dst_bucket)
            .key(dst_key)
            .customize()
            .mutate_response(capture.hook())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, src_bucket, src_key))?;
        Ok(capture.status_or(StoreStatus::OK))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<StoreStatus> {
        let capture = StatusCapture::default();
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .customize()
            .mutate_response(capture.hook())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;
        Ok(capture.status_or(StoreStatus(204)))
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
