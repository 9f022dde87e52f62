// SPDX-License-Identifier: Apache-2.0

use crate::config::FeedSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError(pub String);

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone)]
pub struct RawFeed {
    pub source: String,
    pub bytes: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

/// Source of the raw XMLTV document for one update run.
#[async_trait]
pub trait FeedFetcher: Send + Sync + 'static {
    async fn fetch(&self) -> Result<RawFeed, FetchError>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
        }
    }
}

pub struct HttpFeedFetcher {
    url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFeedFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self, FetchError> {
        let url = url.into();
        reqwest::Url::parse(&url).map_err(|e| FetchError(format!("invalid feed url {url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError(format!("http client: {e}")))?;
        Ok(Self { url, client, retry })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    #[instrument(name = "feed_http_fetch", skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<RawFeed, FetchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = match self.client.get(&self.url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body = resp
                        .bytes()
                        .await
                        .map_err(|e| FetchError(format!("read body failed url={}: {e}", self.url)))?;
                    if body.is_empty() {
                        return Err(FetchError(format!("empty feed body url={}", self.url)));
                    }
                    return Ok(RawFeed {
                        source: self.url.clone(),
                        bytes: body.to_vec(),
                        fetched_at: Utc::now(),
                    });
                }
                Ok(resp) => format!("download failed status={} url={}", resp.status(), self.url),
                Err(e) => format!("download failed url={}: {e}", self.url),
            };
            if attempt >= max_attempts {
                return Err(FetchError(failure));
            }
            warn!(attempt, max_attempts, error = %failure, "feed fetch failed, retrying");
            tokio::time::sleep(Duration::from_millis(
                self.retry.base_backoff_ms.saturating_mul(attempt as u64),
            ))
            .await;
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

pub struct FileFeedFetcher {
    path: PathBuf,
}

impl FileFeedFetcher {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FeedFetcher for FileFeedFetcher {
    async fn fetch(&self) -> Result<RawFeed, FetchError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| FetchError(format!("read {}: {e}", self.path.display())))?;
        if bytes.is_empty() {
            return Err(FetchError(format!("empty feed file {}", self.path.display())));
        }
        Ok(RawFeed {
            source: format!("file:{}", self.path.display()),
            bytes,
            fetched_at: Utc::now(),
        })
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

pub fn fetcher_for(
    source: &FeedSource,
    timeout: Duration,
    retry: RetryPolicy,
) -> Result<Arc<dyn FeedFetcher>, FetchError> {
    let fetcher: Arc<dyn FeedFetcher> = match source {
        FeedSource::Http(url) => Arc::new(HttpFeedFetcher::new(url.clone(), timeout, retry)?),
        FeedSource::File(path) => Arc::new(FileFeedFetcher::new(path.clone())),
    };
    Ok(fetcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(listener: &TcpListener, response: &str) {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0_u8; 1024];
        let _ = socket.read(&mut buf).await.expect("read request");
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write response");
    }

    #[tokio::test]
    async fn http_fetcher_retries_server_errors_then_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            serve_once(
                &listener,
                "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            )
            .await;
            serve_once(
                &listener,
                "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\n<tv/>",
            )
            .await;
        });

        let fetcher = HttpFeedFetcher::new(
            format!("http://{addr}/brazil.xml"),
            Duration::from_secs(5),
            RetryPolicy {
                max_attempts: 2,
                base_backoff_ms: 1,
            },
        )
        .expect("fetcher");
        let feed = fetcher.fetch().await.expect("fetch");
        assert_eq!(feed.bytes, b"<tv/>");
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn http_fetcher_reports_final_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            serve_once(
                &listener,
                "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            )
            .await;
        });
        let fetcher = HttpFeedFetcher::new(
            format!("http://{addr}/missing.xml"),
            Duration::from_secs(5),
            RetryPolicy {
                max_attempts: 1,
                base_backoff_ms: 1,
            },
        )
        .expect("fetcher");
        let err = fetcher.fetch().await.expect_err("404 must fail");
        assert!(err.0.contains("404"), "{err}");
    }

    #[tokio::test]
    async fn empty_feed_file_is_a_fetch_error() {
        let dir = tempdir().expect("tmp");
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, b"").expect("write");
        let err = FileFeedFetcher::new(&path).fetch().await.expect_err("empty");
        assert!(err.0.contains("empty"), "{err}");
    }

    #[test]
    fn feed_source_selects_fetcher() {
        assert!(fetcher_for(
            &FeedSource::Http("not a url".to_string()),
            Duration::from_secs(1),
            RetryPolicy::default()
        )
        .is_err());
        let fetcher = fetcher_for(
            &FeedSource::File(PathBuf::from("/tmp/feed.xml")),
            Duration::from_secs(1),
            RetryPolicy::default(),
        )
        .expect("file fetcher");
        assert_eq!(fetcher.describe(), "file:/tmp/feed.xml");
    }
}
