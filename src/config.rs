//! Configuration file parser for ~/.config/newsrelay/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which reproduces the stock deployment (three crypto feeds behind
//! `/news-proxy`, two behind `/news-stream`). Unknown keys are accepted but
//! logged as warnings since they are usually typos.
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::decoder::DEFAULT_ENCODINGS;
use crate::feed::fetcher::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FEED_SIZE, DEFAULT_USER_AGENT};
use crate::feed::{Decoder, FeedSource, FetchSettings};
use crate::news::FeedProfile;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

pub const ENV_BIND: &str = "NEWSRELAY_BIND";
pub const ENV_CACHE_TTL_MS: &str = "NEWSRELAY_CACHE_TTL_MS";

/// Top-level relay configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: SocketAddr,
    pub user_agent: String,
    pub fetch_timeout_secs: u64,
    pub max_feed_bytes: usize,
    /// Charset labels tried in order when decoding feed bodies.
    pub encodings: Vec<String>,
    pub proxy: ProfileConfig,
    pub stream: ProfileConfig,
    pub thumbnails: ThumbnailConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8787)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            max_feed_bytes: DEFAULT_MAX_FEED_SIZE,
            encodings: DEFAULT_ENCODINGS.iter().map(|s| s.to_string()).collect(),
            proxy: ProfileConfig::default(),
            stream: ProfileConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Overrides for one [`FeedProfile`]. Unset fields keep the built-in value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub sources: Option<Vec<FeedSource>>,
    pub cache_ttl_ms: Option<u64>,
    pub summary_max_chars: Option<usize>,
    pub page_size: Option<usize>,
    pub default_limit: Option<usize>,
    pub max_limit: Option<usize>,
}

impl ProfileConfig {
    /// Layers these overrides on top of `base`.
    pub fn resolve(&self, base: FeedProfile) -> FeedProfile {
        FeedProfile {
            name: base.name,
            sources: self.sources.clone().unwrap_or(base.sources),
            cache_ttl: self.cache_ttl_ms.map(Duration::from_millis).unwrap_or(base.cache_ttl),
            summary_max_chars: self.summary_max_chars.unwrap_or(base.summary_max_chars),
            page_size: self.page_size.unwrap_or(base.page_size).max(1),
            default_limit: self.default_limit.unwrap_or(base.default_limit),
            max_limit: self.max_limit.unwrap_or(base.max_limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Base URL of the image-resizing service.
    pub upstream: String,
    pub width: u32,
    pub height: u32,
    pub fmt: String,
    pub quality: u8,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub timeout_secs: u64,
    /// Point `/news-proxy` item images at the thumbnail endpoint.
    pub rewrite_images: bool,
    /// Public origin used when rewriting images, e.g. `https://relay.example`.
    /// Empty means a path-relative URL.
    pub public_base: String,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            upstream: "https://images.weserv.nl".to_string(),
            width: 160,
            height: 90,
            fmt: "webp".to_string(),
            quality: 75,
            cache_ttl_secs: 3600,
            cache_capacity: 512,
            timeout_secs: 5,
            rewrite_images: false,
            public_base: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per client per minute. 0 disables limiting.
    pub max_per_minute: u32,
}

impl Config {
    /// Maximum config file size (1 MiB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "bind",
        "user_agent",
        "fetch_timeout_secs",
        "max_feed_bytes",
        "encodings",
        "proxy",
        "stream",
        "thumbnails",
        "rate_limit",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(path = %path.display(), bind = %config.bind, "Loaded configuration");
        Ok(config)
    }

    /// Parses TOML text, warning about unrecognised top-level keys.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    /// Applies `NEWSRELAY_*` overrides. `lookup` is usually `std::env::var`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BIND) {
            self.bind = value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                key: ENV_BIND,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_CACHE_TTL_MS) {
            let ms = value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                key: ENV_CACHE_TTL_MS,
                value: value.clone(),
            })?;
            self.proxy.cache_ttl_ms = Some(ms);
        }
        Ok(())
    }

    pub fn proxy_profile(&self) -> FeedProfile {
        self.proxy.resolve(FeedProfile::proxy())
    }

    pub fn stream_profile(&self) -> FeedProfile {
        self.stream.resolve(FeedProfile::stream())
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            max_bytes: self.max_feed_bytes,
        }
    }

    pub fn decoder(&self) -> Decoder {
        Decoder::from_labels(self.encodings.as_slice())
    }
}

// ============================================================================
// Tests
// ============================================================================
