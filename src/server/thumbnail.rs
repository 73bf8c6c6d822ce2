//! Resized-thumbnail proxy behind `/news-proxy?thumb=1`.
//!
//! Client images are resized by an external service and cached here for an
//! hour, so feeds can be rendered without hot-linking full-size originals.
use axum::body::Bytes;
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use url::Url;

use super::ApiError;
use crate::config::ThumbnailConfig;
use crate::feed::fetcher::read_limited_bytes;
use crate::feed::FetchError;
use crate::news::TtlCache;
use crate::util::validate_url;

const MAX_DIMENSION: u32 = 640;
const MAX_THUMBNAIL_BYTES: usize = 5 * 1024 * 1024;
const PROXY_PATH: &str = "/functions/v1/news-proxy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Webp,
    Avif,
    Jpeg,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Webp => "image/webp",
            ImageFormat::Avif => "image/avif",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    /// Best format the client's `Accept` header admits.
    pub fn negotiate(accept: Option<&str>) -> Self {
        let accept = accept.unwrap_or_default().to_ascii_lowercase();
        if accept.contains("image/avif") {
            ImageFormat::Avif
        } else if accept.contains("image/webp") {
            ImageFormat::Webp
        } else {
            ImageFormat::Jpeg
        }
    }

    /// `None` for `auto` and unknown values.
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "webp" => Some(ImageFormat::Webp),
            "avif" => Some(ImageFormat::Avif),
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

/// A validated thumbnail request.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRequest {
    pub source: Url,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub quality: u8,
}

impl ThumbnailRequest {
    /// Reads `u`, `w`, `h`, `fmt` and `q`. Missing, zero or unparsable
    /// numbers fall back to the configured defaults before clamping.
    pub fn from_query(
        params: &HashMap<String, String>,
        accept: Option<&str>,
        defaults: &ThumbnailConfig,
    ) -> Result<Self, ApiError> {
        let source = validate_url(params.get("u").map(String::as_str).unwrap_or_default())?;

        let width = number_or(params.get("w"), defaults.width).clamp(1, MAX_DIMENSION);
        let height = number_or(params.get("h"), defaults.height).clamp(1, MAX_DIMENSION);
        let quality = number_or(params.get("q"), u32::from(defaults.quality)).clamp(1, 100) as u8;

        let requested = params
            .get("fmt")
            .map(String::as_str)
            .unwrap_or(defaults.fmt.as_str());
        let format = if requested.eq_ignore_ascii_case("auto") {
            ImageFormat::negotiate(accept)
        } else {
            ImageFormat::parse(requested)
                .or_else(|| ImageFormat::parse(&defaults.fmt))
                .unwrap_or(ImageFormat::Webp)
        };

        Ok(Self {
            source,
            width,
            height,
            format,
            quality,
        })
    }

    /// SHA-256 hex digest identifying this rendition.
    pub fn cache_key(&self) -> String {
        let plain = format!(
            "t:{}x{}:{}:{}",
            self.width,
            self.height,
            self.format.as_str(),
            self.source
        );
        format!("{:x}", Sha256::digest(plain.as_bytes()))
    }
}

fn number_or(value: Option<&String>, default: u32) -> u32 {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub content_type: String,
    pub body: Bytes,
}

/// Fetches resized images from the upstream service, with an LRU cache.
#[derive(Debug)]
pub struct ThumbnailProxy {
    client: reqwest::Client,
    config: ThumbnailConfig,
    cache: TtlCache<Thumbnail>,
}

impl ThumbnailProxy {
    pub fn new(client: reqwest::Client, config: ThumbnailConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        let cache = TtlCache::bounded(Duration::from_secs(config.cache_ttl_secs), capacity);
        Self {
            client,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    pub async fn get(&self, request: &ThumbnailRequest) -> Result<Thumbnail, ApiError> {
        let key = request.cache_key();
        self.cache
            .get_or_try_insert_with(&key, || self.fetch(request))
            .await
    }

    async fn fetch(&self, request: &ThumbnailRequest) -> Result<Thumbnail, ApiError> {
        let upstream = self.upstream_url(request)?;
        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));

        let response = tokio::time::timeout(timeout, self.client.get(upstream).send())
            .await
            .map_err(|_| ApiError::ThumbUpstreamUnavailable(FetchError::Timeout.to_string()))?
            .map_err(|e| ApiError::ThumbUpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::ThumbUpstreamStatus(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(request.format.mime())
            .to_string();

        let body = tokio::time::timeout(timeout, read_limited_bytes(response, MAX_THUMBNAIL_BYTES))
            .await
            .map_err(|_| FetchError::Timeout)
            .and_then(|r| r)
            .map_err(|e| ApiError::ThumbUpstreamUnavailable(e.to_string()))?;

        tracing::debug!(source = %request.source, bytes = body.len(), "Fetched thumbnail");
        Ok(Thumbnail {
            content_type,
            body: Bytes::from(body),
        })
    }

    fn upstream_url(&self, request: &ThumbnailRequest) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.config.upstream)
            .map_err(|e| ApiError::ThumbUpstreamUnavailable(format!("bad upstream url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("url", request.source.as_str())
            .append_pair("w", &request.width.to_string())
            .append_pair("h", &request.height.to_string())
            .append_pair("fit", "cover")
            .append_pair("we", "1")
            .append_key_only("il")
            .append_pair("output", request.format.as_str())
            .append_pair("q", &request.quality.to_string());
        Ok(url)
    }

    /// Link to this relay's thumbnail endpoint for `image`, using the
    /// configured size, format and quality.
    pub fn proxied_image_url(&self, image: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("thumb", "1")
            .append_pair("u", image)
            .append_pair("w", &self.config.width.to_string())
            .append_pair("h", &self.config.height.to_string())
            .append_pair("fmt", &self.config.fmt)
            .append_pair("q", &self.config.quality.clamp(1, 100).to_string())
            .finish();
        format!(
            "{}{}?{}",
            self.config.public_base.trim_end_matches('/'),
            PROXY_PATH,
            query
        )
    }
}
