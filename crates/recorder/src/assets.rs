//! Asset registry and fetching.
//!
//! The tracker deduplicates by absolute URL and hands out monotonic
//! asset ids; registered assets queue until the fetch phase drains them.
//! Fetching sits behind the [`AssetFetcher`] trait so recorders can run
//! against HTTP, local files, or canned test data.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Error;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use protocol::FetchError;
use tokio::sync::Mutex;
use url::Url;

/// A registered asset awaiting emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAsset {
    pub id: u32,
    /// Absolute URL, the dedup key.
    pub url: String,
    pub mime: Option<String>,
    /// Pre-supplied bytes; when present no fetch is performed.
    pub data: Option<Bytes>,
}

/// Ordered, url-deduplicated registry of assets.
#[derive(Debug, Default)]
pub struct AssetTracker {
    counter: u32,
    by_url: HashMap<String, u32>,
    pending: Vec<PendingAsset>,
}

impl AssetTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a URL, returning its asset id. A URL seen before keeps
    /// its id and is not re-queued.
    pub fn assign(&mut self, url: &str, data: Option<Bytes>, mime: Option<String>) -> u32 {
        if let Some(existing) = self.by_url.get(url) {
            return *existing;
        }
        self.counter += 1;
        let id = self.counter;
        self.by_url.insert(url.to_owned(), id);
        self.pending.push(PendingAsset {
            id,
            url: url.to_owned(),
            mime,
            data,
        });
        id
    }

    /// The id previously assigned to a URL.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<u32> {
        self.by_url.get(url).copied()
    }

    /// Total number of ids handed out so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.by_url.len()
    }

    /// Drain the pending queue in registration order. A second call
    /// without intervening registrations yields nothing.
    pub fn take(&mut self) -> Vec<PendingAsset> {
        std::mem::take(&mut self.pending)
    }
}

/// Bytes and media type of a successfully fetched asset.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub mime: Option<String>,
    pub data: Bytes,
}

/// Pluggable asset fetch backend.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch one asset. Failures come back as the enumerated in-band
    /// error, never as a panic or an opaque error type.
    async fn fetch(&self, url: &Url) -> Result<FetchedAsset, FetchError>;
}

/// Fetches over HTTP(S) and the local filesystem.
///
/// Requests are cache-first against a process-local map, carry
/// credentials, and stay same-origin unless cross-origin fetching is
/// enabled.
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Option<Url>,
    allow_cross_origin: bool,
    cache: Mutex<HashMap<String, FetchedAsset>>,
}

impl HttpFetcher {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(origin: Option<Url>, allow_cross_origin: bool) -> Result<Self, Error> {
        // Credentials always ride along: cookies set by earlier
        // responses are retained and sent on every subsequent fetch.
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            origin,
            allow_cross_origin,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn same_origin(&self, url: &Url) -> bool {
        self.origin
            .as_ref()
            .is_none_or(|origin| origin.origin() == url.origin())
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedAsset, FetchError> {
        if let Some(hit) = self.cache.lock().await.get(url.as_str()) {
            return Ok(hit.clone());
        }

        let fetched = match url.scheme() {
            "http" | "https" => {
                if !self.allow_cross_origin && !self.same_origin(url) {
                    return Err(FetchError::Cors);
                }
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|_| FetchError::Network)?;
                if !response.status().is_success() {
                    return Err(FetchError::Http);
                }
                let mime = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                let data = response.bytes().await.map_err(|_| FetchError::Network)?;
                FetchedAsset { mime, data }
            }
            "file" => {
                let path = url.to_file_path().map_err(|()| FetchError::Unknown {
                    message: format!("invalid file path for {url}"),
                })?;
                let data = tokio::fs::read(path)
                    .await
                    .map(Bytes::from)
                    .map_err(|_| FetchError::Network)?;
                FetchedAsset { mime: None, data }
            }
            scheme => {
                return Err(FetchError::Unknown {
                    message: format!("unsupported url scheme {scheme}"),
                });
            }
        };

        self.cache
            .lock()
            .await
            .insert(url.as_str().to_owned(), fetched.clone());
        Ok(fetched)
    }
}

/// Canned fetcher for tests and offline runs. Entries can carry an
/// artificial delay to exercise completion-order behavior.
#[derive(Default)]
pub struct StaticFetcher {
    entries: HashMap<String, (FetchedAsset, u64)>,
}

impl StaticFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, url: &str, mime: Option<&str>, data: &[u8]) -> Self {
        self.insert(url, mime, data, 0);
        self
    }

    #[must_use]
    pub fn with_delayed(mut self, url: &str, mime: Option<&str>, data: &[u8], delay_ms: u64) -> Self {
        self.insert(url, mime, data, delay_ms);
        self
    }

    fn insert(&mut self, url: &str, mime: Option<&str>, data: &[u8], delay_ms: u64) {
        self.entries.insert(
            url.to_owned(),
            (
                FetchedAsset {
                    mime: mime.map(str::to_owned),
                    data: Bytes::copy_from_slice(data),
                },
                delay_ms,
            ),
        );
    }

    /// Wrap in the shared handle recorders expect.
    #[must_use]
    pub fn shared(self) -> Arc<dyn AssetFetcher> {
        Arc::new(self)
    }
}

#[async_trait]
impl AssetFetcher for StaticFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedAsset, FetchError> {
        match self.entries.get(url.as_str()) {
            Some((fetched, delay_ms)) => {
                if *delay_ms > 0 {
                    tokio::time::sleep(core::time::Duration::from_millis(*delay_ms)).await;
                }
                Ok(fetched.clone())
            }
            None => {
                debug!("static fetcher miss for {url}");
                Err(FetchError::Network)
            }
        }
    }
}
