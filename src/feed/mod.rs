//! Remote feed retrieval.
//!
//! One GET per call, body returned untouched. The feed authenticates with a
//! static shared-secret token carried as a query parameter, so the request
//! needs no headers beyond reqwest's defaults.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::FeedConfig;

/// Failure retrieving the feed. Timeouts, transport errors and non-2xx
/// responses all land here.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Feed request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Feed returned HTTP {status}")]
    Status { status: StatusCode },

    #[error("Feed client misconfigured: {0}")]
    Config(String),
}

impl FetchError {
    /// Whether another attempt within the same tick could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(e) => e.is_timeout() || e.is_connect(),
            FetchError::Status { status } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            FetchError::Config(_) => false,
        }
    }
}

/// The request URL carries the shared secret in its query string.
fn redacted(err: reqwest::Error) -> FetchError {
    FetchError::Request(err.without_url())
}

/// Source of feed payloads.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Perform exactly one retrieval.
    async fn fetch(&self) -> Result<Bytes, FetchError>;

    /// Endpoint description for logging.
    fn describe(&self) -> String;
}

/// HTTP feed backed by reqwest.
pub struct HttpFeed {
    client: Client,
    url: String,
    params: BTreeMap<String, String>,
}

impl HttpFeed {
    /// Build a feed client with the configured timeout.
    pub fn new(config: &FeedConfig) -> Result<Self, FetchError> {
        if config.url.is_empty() {
            return Err(FetchError::Config("feed URL not configured".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(FetchError::Request)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            params: config.params.clone(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .query(&self.params)
            .send()
            .await
            .map_err(redacted)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let body = response.bytes().await.map_err(redacted)?;
        debug!(url = %self.url, status = %status, size = body.len(), "Feed fetched");
        Ok(body)
    }

    fn describe(&self) -> String {
        // Query parameters carry the shared secret; never log them
        self.url.clone()
    }
}

/// Feed that replays a fixed script of responses, for tests and dry runs.
///
/// Once the script runs out the last response repeats.
pub struct ScriptedFeed {
    script: Mutex<VecDeque<ScriptedResponse>>,
    last: Mutex<Option<ScriptedResponse>>,
    calls: AtomicUsize,
}

/// One scripted feed response.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Body(Bytes),
    Status(u16),
}

impl ScriptedFeed {
    pub fn new(script: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Feed that always answers with `body`.
    pub fn always(body: impl Into<Bytes>) -> Self {
        Self::new([ScriptedResponse::Body(body.into())])
    }

    /// Feed that always answers with HTTP `status`.
    pub fn failing(status: u16) -> Self {
        Self::new([ScriptedResponse::Status(status)])
    }

    /// Number of fetches performed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch(&self) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().await.pop_front();
        let response = {
            let mut last = self.last.lock().await;
            if let Some(next) = next {
                *last = Some(next);
            }
            last.clone()
        };

        match response {
            Some(ScriptedResponse::Body(body)) => Ok(body),
            Some(ScriptedResponse::Status(code)) => Err(FetchError::Status {
                status: StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            }),
            None => Err(FetchError::Config("empty feed script".to_string())),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the request head.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
        delay: Duration,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{}/cgi-bin/parking_sign_data.cgi", addr), handle)
    }

    fn feed_config(url: String, timeout_secs: u64) -> FeedConfig {
        FeedConfig {
            url,
            params: BTreeMap::from([("hash".to_string(), "s3cr3t".to_string())]),
            timeout_secs,
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_sends_params() {
        let (url, server) = serve_once("200 OK", "<signs><sign/></signs>", Duration::ZERO).await;
        let feed = HttpFeed::new(&feed_config(url, 5)).unwrap();

        let body = feed.fetch().await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(body.as_ref(), b"<signs><sign/></signs>");
        assert!(request.starts_with("GET /cgi-bin/parking_sign_data.cgi?hash=s3cr3t "));
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_error() {
        let (url, _server) = serve_once("503 Service Unavailable", "", Duration::ZERO).await;
        let feed = HttpFeed::new(&feed_config(url, 5)).unwrap();

        let err = feed.fetch().await.unwrap_err();

        assert!(matches!(err, FetchError::Status { status } if status.as_u16() == 503));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_client_error_not_transient() {
        let (url, _server) = serve_once("403 Forbidden", "", Duration::ZERO).await;
        let feed = HttpFeed::new(&feed_config(url, 5)).unwrap();

        let err = feed.fetch().await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_error() {
        let (url, _server) = serve_once("200 OK", "late", Duration::from_secs(3)).await;
        let feed = HttpFeed::new(&feed_config(url, 1)).unwrap();

        let err = feed.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Request(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_connect_error_omits_secret() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("http://{}/cgi-bin/parking_sign_data.cgi", addr);
        let feed = HttpFeed::new(&feed_config(url, 5)).unwrap();

        let err = feed.fetch().await.unwrap_err();

        assert!(err.is_transient());
        assert!(!err.to_string().contains("s3cr3t"), "{err}");
        assert!(!format!("{err:?}").contains("s3cr3t"), "{err:?}");
    }

    #[tokio::test]
    async fn test_truncated_body_omits_secret() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            // Promise more than is sent, then hang up
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
                .await;
        });
        let url = format!("http://{}/cgi-bin/parking_sign_data.cgi", addr);
        let feed = HttpFeed::new(&feed_config(url, 5)).unwrap();

        let err = feed.fetch().await.unwrap_err();

        assert!(matches!(err, FetchError::Request(_)));
        assert!(!format!("{err:?}").contains("s3cr3t"), "{err:?}");
    }

    #[test]
    fn test_empty_url_rejected() {
        let result = HttpFeed::new(&feed_config(String::new(), 5));
        assert!(matches!(result, Err(FetchError::Config(_))));
    }

    #[tokio::test]
    async fn test_scripted_feed_repeats_last() {
        let feed = ScriptedFeed::new([
            ScriptedResponse::Status(502),
            ScriptedResponse::Body(Bytes::from_static(b"ok")),
        ]);

        assert!(feed.fetch().await.is_err());
        assert_eq!(feed.fetch().await.unwrap().as_ref(), b"ok");
        assert_eq!(feed.fetch().await.unwrap().as_ref(), b"ok");
        assert_eq!(feed.calls(), 3);
    }

    #[test]
    fn test_describe_hides_params() {
        let feed = HttpFeed::new(&feed_config("http://feed.test/data".to_string(), 5)).unwrap();
        assert!(!feed.describe().contains("s3cr3t"));
    }
}
