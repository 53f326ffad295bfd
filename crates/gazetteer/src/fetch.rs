//! Resource fetching for search bundles.
//!
//! All remote resources (the index manifest, serialized index payloads, and
//! the results-data table) are fetched through the [`Fetcher`] trait so the
//! transport can be swapped out. [`HttpFetcher`] is the production
//! implementation; [`StaticFetcher`] serves resources from memory and is used
//! throughout the test suite.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("resource not found: {url}")]
    NotFound { url: String },
    #[error("request for {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Fetches a resource by URL.
///
/// Implementations must be cheap to call repeatedly; callers are responsible
/// for caching the fetched payloads.
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, FetchError>>;
}

/// Resolve a bundle-relative resource location against the manifest URL.
///
/// Absolute URLs pass through untouched. Relative locations replace the last
/// path segment of the base, so a manifest at
/// `https://example.com/bundle/indexRoot.json` resolves `resultsData.csv` to
/// `https://example.com/bundle/resultsData.csv`.
pub fn join_url(base: &str, relative: &str) -> String {
    if relative.starts_with("http://")
        || relative.starts_with("https://")
        || relative.starts_with("//")
    {
        return relative.to_string();
    }
    let path_start = base.find("://").map_or(0, |scheme| scheme + 3);
    match base.rfind('/') {
        Some(slash) if slash >= path_start => format!("{}/{relative}", &base[..slash]),
        _ => format!("{base}/{relative}"),
    }
}

/// HTTP fetcher backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (custom timeouts, proxies, headers).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        Box::pin(async move {
            debug!(url, "fetching resource");
            let response = self.client.get(url).send().await.map_err(|source| {
                FetchError::Http {
                    url: url.to_string(),
                    source,
                }
            })?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound {
                    url: url.to_string(),
                });
            }
            let response = response
                .error_for_status()
                .map_err(|source| FetchError::Http {
                    url: url.to_string(),
                    source,
                })?;
            response.bytes().await.map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })
        })
    }
}

/// Deterministic in-memory fetcher.
///
/// Serves preloaded byte payloads keyed by URL, counts how often each URL is
/// requested, and can delay individual responses to simulate slow networks.
/// Exists for tests and for embedding small bundles directly in a binary.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    resources: HashMap<String, Bytes>,
    delays: HashMap<String, Duration>,
    counts: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.resources.insert(url.into(), body.into());
    }

    #[must_use]
    pub fn with_resource(mut self, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.insert(url, body);
        self
    }

    /// Delay responses for `url`, simulating a slow fetch.
    #[must_use]
    pub fn with_delay(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(url.into(), delay);
        self
    }

    /// Number of times `url` has been requested.
    pub fn fetch_count(&self, url: &str) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

impl Fetcher for StaticFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        Box::pin(async move {
            *self
                .counts
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .entry(url.to_string())
                .or_insert(0) += 1;
            if let Some(delay) = self.delays.get(url) {
                tokio::time::sleep(*delay).await;
            }
            self.resources
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::NotFound {
                    url: url.to_string(),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_resolves_relative_to_manifest_directory() {
        assert_eq!(
            join_url("https://example.com/bundle/indexRoot.json", "resultsData.csv"),
            "https://example.com/bundle/resultsData.csv"
        );
        assert_eq!(
            join_url("https://example.com/bundle/indexRoot.json", "indexes/0.json"),
            "https://example.com/bundle/indexes/0.json"
        );
    }

    #[test]
    fn join_url_keeps_absolute_urls() {
        assert_eq!(
            join_url("https://example.com/a/root.json", "https://cdn.example.com/data.csv"),
            "https://cdn.example.com/data.csv"
        );
    }

    #[test]
    fn join_url_handles_bare_host() {
        assert_eq!(
            join_url("https://example.com", "data.csv"),
            "https://example.com/data.csv"
        );
    }

    #[test]
    fn join_url_handles_trailing_slash() {
        assert_eq!(
            join_url("https://example.com/bundle/", "data.csv"),
            "https://example.com/bundle/data.csv"
        );
    }

    #[tokio::test]
    async fn static_fetcher_counts_and_serves() {
        let fetcher = StaticFetcher::new().with_resource("u", &b"body"[..]);
        assert_eq!(fetcher.fetch_count("u"), 0);

        let body = fetcher.fetch("u").await.expect("resource exists");
        assert_eq!(&body[..], b"body");
        assert_eq!(fetcher.fetch_count("u"), 1);

        let missing = fetcher.fetch("other").await;
        assert!(matches!(missing, Err(FetchError::NotFound { .. })));
    }
}
