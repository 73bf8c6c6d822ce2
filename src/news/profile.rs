use std::time::Duration;

use crate::feed::{FeedSource, NormalizeOptions};
use crate::news::Topic;

/// Source set and freshness policy for one endpoint.
///
/// Both endpoints share the aggregation core; they differ only in which
/// feeds they merge and how long a merged result stays fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedProfile {
    pub name: String,
    pub sources: Vec<FeedSource>,
    /// Zero disables in-process caching.
    pub cache_ttl: Duration,
    pub summary_max_chars: usize,
    /// Items per page on cursor-paginated endpoints.
    pub page_size: usize,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl FeedProfile {
    /// Topic-filterable feed behind `/news-proxy`.
    pub fn proxy() -> Self {
        Self {
            name: "proxy".to_string(),
            sources: vec![
                FeedSource::new("TokenPost", "https://www.tokenpost.kr/rss", Topic::Crypto)
                    .with_mirrors(["https://m.tokenpost.kr/rss", "http://www.tokenpost.kr/rss"]),
                FeedSource::new("BlockMedia", "https://www.blockmedia.co.kr/feed", Topic::Crypto)
                    .with_mirrors(["https://www.blockmedia.co.kr/rss"]),
                FeedSource::new(
                    "CoinReaders",
                    "https://www.coinreaders.com/rss/rss_news.php",
                    Topic::Crypto,
                )
                .with_mirrors(["https://m.coinreaders.com/plugin/rss"]),
            ],
            cache_ttl: Duration::from_secs(10),
            summary_max_chars: 240,
            page_size: 30,
            default_limit: 30,
            max_limit: 100,
        }
    }

    /// Merged timeline behind `/news-stream`.
    pub fn stream() -> Self {
        Self {
            name: "stream".to_string(),
            sources: vec![
                FeedSource::new("TOKENPOST", "https://m.tokenpost.kr/rss", Topic::Crypto),
                FeedSource::new("BLOCKMEDIA", "https://www.blockmedia.co.kr/rss", Topic::Crypto),
            ],
            cache_ttl: Duration::from_secs(10),
            summary_max_chars: 150,
            page_size: 20,
            default_limit: 20,
            max_limit: 100,
        }
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            summary_max_chars: self.summary_max_chars,
        }
    }

    /// Parses a client `limit`, falling back to the default and clamping to
    /// `1..=max_limit`.
    pub fn clamp_limit(&self, requested: Option<&str>) -> usize {
        requested
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}
