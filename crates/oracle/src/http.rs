//! `reqwest`-backed [`Fetcher`].

use async_trait::async_trait;
use bytes::Bytes;
use common::{FetchError, Fetcher};

const USER_AGENT: &str = concat!("warden/", env!("CARGO_PKG_VERSION"));

pub struct HttpFetcher {
    client: reqwest::Client,
    bearer: Option<String>,
}

impl HttpFetcher {
    /// A fetcher that sends `Authorization: Bearer <token>` when `bearer` is set.
    ///
    /// Redirects are followed; the credential is not forwarded to other hosts.
    pub fn new(bearer: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client, bearer })
    }

    /// A fetcher without credentials, for deployed content and store packages.
    pub fn anonymous() -> Result<Self, reqwest::Error> {
        Self::new(None)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.bytes().await.map_err(transport)
    }
}
