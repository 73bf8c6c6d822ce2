use futures::StreamExt;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::time::Duration;
use thiserror::Error;

use super::decoder::Decoder;
use super::parser::RawItem;
use super::source::FeedSource;

pub const DEFAULT_USER_AGENT: &str =
    concat!("newsrelay/", env!("CARGO_PKG_VERSION"), " (feed aggregator)");
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

const FEED_ACCEPT: &str = concat!(
    "application/rss+xml, application/atom+xml, ",
    "application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5",
);

/// Errors that can occur while retrieving a feed.
///
/// None of these escape [`FeedFetcher::fetch_source`]; they are logged and
/// the source contributes zero items.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request plus body exceeded the fetch timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Fetch knobs, usually taken from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_bytes: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_bytes: DEFAULT_MAX_FEED_SIZE,
        }
    }
}

/// Retrieves feeds over HTTP and turns their bytes into [`RawItem`]s.
///
/// Cheap to share behind an `Arc`; the inner `reqwest::Client` pools
/// connections across requests.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
    decoder: Decoder,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client, settings: FetchSettings, decoder: Decoder) -> Self {
        Self {
            client,
            settings,
            decoder,
        }
    }

    /// Items for a source: the primary URL first, then each mirror until
    /// one of them yields items.
    ///
    /// Failures are absorbed; a source that is down everywhere returns an
    /// empty list.
    pub async fn fetch_source(&self, source: &FeedSource) -> Vec<RawItem> {
        for (attempt, url) in source.urls().enumerate() {
            let items = self.fetch_url(url).await;
            if !items.is_empty() {
                tracing::debug!(
                    source = %source.name,
                    url = %url,
                    mirror = attempt > 0,
                    count = items.len(),
                    "Fetched feed"
                );
                return items;
            }
        }
        tracing::warn!(source = %source.name, "No items from source or any mirror");
        Vec::new()
    }

    /// Items from a single URL, or an empty list on any failure.
    pub async fn fetch_url(&self, url: &str) -> Vec<RawItem> {
        match self.fetch_bytes(url).await {
            Ok(bytes) => {
                let items = self.decoder.decode_items(&bytes);
                if items.is_empty() {
                    tracing::warn!(url = %url, bytes = bytes.len(), "Feed body yielded no items");
                }
                items
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Feed fetch failed");
                Vec::new()
            }
        }
    }

    /// Raw response body. The timeout covers the whole exchange, body included.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tokio::time::timeout(self.settings.timeout, self.download(url))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.settings.user_agent)
            .header(ACCEPT, FEED_ACCEPT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.settings.max_bytes).await
    }
}

/// Reads a response body, refusing anything over `limit` bytes and
/// detecting truncated transfers.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
