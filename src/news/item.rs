use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Editorial bucket a news item is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    #[default]
    Crypto,
    Stocks,
    Fx,
    /// Query-only value: no topic filtering.
    All,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Crypto => "crypto",
            Topic::Stocks => "stocks",
            Topic::Fx => "fx",
            Topic::All => "all",
        }
    }

    /// Lenient parse for query strings: unknown values fall back to the default topic.
    pub fn parse_or_default(value: Option<&str>) -> Topic {
        value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crypto" => Ok(Topic::Crypto),
            "stocks" => Ok(Topic::Stocks),
            "fx" => Ok(Topic::Fx),
            "all" => Ok(Topic::All),
            other => Err(format!("unknown topic: {other}")),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized, deduplicatable news item as served to clients.
///
/// `id` and `url` are both the canonical URL (tracking parameters and
/// fragment removed), so they are unique within any merged result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub topic: Topic,
}

/// ISO-8601 UTC with millisecond precision and a `Z` suffix,
/// e.g. `2024-01-02T00:00:00.000Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_timestamp<S: Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_topic_parse_is_lenient() {
        assert_eq!(Topic::parse_or_default(Some("STOCKS")), Topic::Stocks);
        assert_eq!(Topic::parse_or_default(Some(" fx ")), Topic::Fx);
        assert_eq!(Topic::parse_or_default(Some("bonds")), Topic::Crypto);
        assert_eq!(Topic::parse_or_default(None), Topic::Crypto);
    }

    #[test]
    fn test_news_item_json_shape() {
        let item = NewsItem {
            id: "http://a.example/1".to_string(),
            title: "BTC surges".to_string(),
            summary: None,
            url: "http://a.example/1".to_string(),
            image: Some("https://a.example/1.png".to_string()),
            published_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            source: "A".to_string(),
            topic: Topic::Crypto,
        };

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "http://a.example/1",
                "title": "BTC surges",
                "url": "http://a.example/1",
                "image": "https://a.example/1.png",
                "publishedAt": "2024-01-02T00:00:00.000Z",
                "source": "A",
                "topic": "crypto"
            })
        );
    }
}
