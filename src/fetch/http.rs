//! `http://` / `https://` adapter.
//!
//! The whole transfer (connect, headers, body) runs inside a [`BoundedFetch`].
//! Redirects are not followed: a 3xx with a `Location` header is reported as
//! [`Loaded::Redirect`] so the crawl frontier schedules the target itself.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, LOCATION};
use reqwest::redirect::Policy;
use tracing::{debug, info, instrument};
use url::Url;

use super::bounded::{BoundedFetch, FetchOutcome, Transfer};
use super::{AdapterKind, Content, FetchContext, Loaded, ProtocolAdapter, initial_capacity};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::user_agent;

/// Adapter for HTTP origins.
///
/// Create once and share; the inner client pools connections.
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    client: Client,
    default_timeout: Duration,
}

impl HttpAdapter {
    /// Builds the adapter from the connect timeout and default budget in `config`.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error when the client cannot be constructed.
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.http_connect_timeout)
            .redirect(Policy::none())
            .gzip(true)
            .user_agent(user_agent::default_crawl_user_agent())
            .build()?;
        Ok(Self {
            client,
            default_timeout: config.http_timeout,
        })
    }

    /// Returns the budget used when a document carries no override.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Performs one bounded GET of `url`.
    pub async fn fetch(&self, url: &str, budget: Duration) -> FetchOutcome {
        let client = self.client.clone();
        let target = url.to_string();
        BoundedFetch::new(budget)
            .run(url, async move { transfer(client, target).await })
            .await
    }
}

async fn transfer(client: Client, url: String) -> Result<Transfer, FetchError> {
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| FetchError::network(&url, e))?;
    let status = response.status();

    if status.is_redirection() {
        if let Some(location) = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
        {
            return Ok(Transfer::Moved(resolve_location(&url, location)));
        }
        return Err(FetchError::http_status(&url, status.as_u16()));
    }
    if !status.is_success() {
        return Err(FetchError::http_status(&url, status.as_u16()));
    }

    let expected = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let mut body = BytesMut::with_capacity(initial_capacity(expected));
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::network(&url, e))?;
        body.extend_from_slice(&chunk);
    }
    Ok(Transfer::Body(body.freeze()))
}

/// Resolves a `Location` header against the request URL.
///
/// Unparseable bases or locations are returned as sent by the server.
fn resolve_location(base: &str, location: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(location))
        .map_or_else(|_| location.to_string(), String::from)
}

#[async_trait]
impl ProtocolAdapter for HttpAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Http
    }

    fn loads_eagerly(&self) -> bool {
        true
    }

    #[instrument(skip(self, ctx), fields(adapter = "http"))]
    async fn load(&self, url: &str, ctx: &FetchContext) -> Result<Loaded, FetchError> {
        let budget = ctx.http_timeout.unwrap_or(self.default_timeout);
        match self.fetch(url, budget).await {
            FetchOutcome::Success(bytes) => {
                debug!(bytes = bytes.len(), "http body received");
                // Http never knows an authoritative modification time.
                Ok(Loaded::Content(Content::new(bytes)))
            }
            FetchOutcome::Redirect(target) => {
                info!(target = %target, "resource moved");
                Ok(Loaded::Redirect { target })
            }
            FetchOutcome::Failure(error) => Err(error),
            FetchOutcome::Timeout => Err(FetchError::timeout(url, budget)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_location() {
        assert_eq!(
            resolve_location("https://example.com/a/b.html", "/moved/c.html"),
            "https://example.com/moved/c.html"
        );
        assert_eq!(
            resolve_location("https://example.com/a/b.html", "c.html"),
            "https://example.com/a/c.html"
        );
    }

    #[test]
    fn test_resolve_absolute_location() {
        assert_eq!(
            resolve_location("http://example.com/", "https://other.example.org/x"),
            "https://other.example.org/x"
        );
    }

    #[test]
    fn test_adapter_uses_configured_budget() {
        let config = FetchConfig {
            http_timeout: Duration::from_secs(42),
            ..FetchConfig::default()
        };
        let adapter = HttpAdapter::new(&config).unwrap();
        assert_eq!(adapter.default_timeout(), Duration::from_secs(42));
        assert_eq!(adapter.kind(), AdapterKind::Http);
        assert!(adapter.loads_eagerly());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_failure_not_timeout() {
        let adapter = HttpAdapter::new(&FetchConfig::default()).unwrap();
        // Port 9 on localhost is closed in test environments; connection is refused fast.
        let outcome = adapter
            .fetch("http://127.0.0.1:9/", Duration::from_secs(10))
            .await;
        assert!(
            matches!(outcome, FetchOutcome::Failure(FetchError::Network { .. })),
            "unexpected outcome: {}",
            outcome.label()
        );
    }
}
