//! The network seam.
//!
//! Every stage that touches the network does so through [`Fetcher`], so the
//! whole pipeline runs against [`MemoryFetcher`] in tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;

/// Transport-level failure of a single fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Retrieves the raw bytes behind a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// In-memory [`Fetcher`]: unknown URLs answer HTTP 404.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    routes: HashMap<String, Bytes>,
    failing: Vec<String>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` for `url`.
    pub fn with(mut self, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.routes.insert(url.into(), body.into());
        self
    }

    /// Makes `url` fail at the transport level.
    pub fn failing(mut self, url: impl Into<String>) -> Self {
        self.failing.push(url.into());
        self
    }

    /// URLs requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        match self.requests.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(url.to_string());
        }
        if self.failing.iter().any(|u| u == url) {
            return Err(FetchError::Transport {
                url: url.to_string(),
                reason: "connection reset".into(),
            });
        }
        self.routes
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}
