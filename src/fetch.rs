//! Resource fetching: the network collaborator of the resource inliner.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{Error, Result};

/// Fetches the bytes behind a URL.
///
/// Any non-success response must be reported as an error; the inliner treats
/// every error the same way it treats a timeout.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Configuration for [`HttpFetcher`]
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// User agent string to send with requests
    pub user_agent: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Custom HTTP headers
    pub headers: HashMap<String, String>,
}

#[cfg(feature = "http")]
impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) RFOX-capture/0.1".to_string(),
            timeout_ms: 30000,
            headers: HashMap::new(),
        }
    }
}

/// HTTP(S) fetcher backed by reqwest
#[cfg(feature = "http")]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: HttpFetcherConfig,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut request = self.client.get(url);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.config.timeout_ms)
            } else {
                Error::NetworkError(format!("cannot fetch resource: {}: {}", url, e))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::NetworkError(format!(
                "cannot fetch resource: {}, status: {}",
                url,
                status.as_u16()
            )));
        }

        let body = resp.bytes().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.config.timeout_ms)
            } else {
                Error::NetworkError(format!("Failed to read response body of {}: {}", url, e))
            }
        })?;
        Ok(body.to_vec())
    }
}

/// Serves resources from memory, keyed by exact URL.
///
/// Counts requests so callers can verify which paths touched the network.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    resources: HashMap<String, Vec<u8>>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.resources.insert(url.into(), bytes.into());
    }

    /// Number of fetches issued so far, hits and misses alike
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.resources.get(url).cloned().ok_or_else(|| {
            Error::NetworkError(format!("cannot fetch resource: {}, status: 404", url))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_fetcher_counts_hits_and_misses() {
        let fetcher = StaticFetcher::new().with("http://x/a.png", vec![1, 2, 3]);
        assert_eq!(fetcher.fetch("http://x/a.png").await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            fetcher.fetch("http://x/b.png").await,
            Err(Error::NetworkError(_))
        ));
        assert_eq!(fetcher.request_count(), 2);
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn http_fetcher_reports_non_success_status() {
        // Skip on CI where network may not be available
        if std::env::var("CI").is_ok() {
            return;
        }

        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr();
        std::thread::spawn(move || {
            for request in server.incoming_requests().take(2) {
                let response = if request.url() == "/ok.png" {
                    tiny_http::Response::from_data(vec![9u8, 8, 7])
                } else {
                    tiny_http::Response::from_data(Vec::new()).with_status_code(404)
                };
                let _ = request.respond(response);
            }
        });

        let fetcher = HttpFetcher::new(HttpFetcherConfig::default()).unwrap();
        let ok = fetcher.fetch(&format!("http://{}/ok.png", addr)).await.unwrap();
        assert_eq!(ok, vec![9, 8, 7]);
        let err = fetcher
            .fetch(&format!("http://{}/missing.png", addr))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("status: 404"), "{}", err);
    }
}
