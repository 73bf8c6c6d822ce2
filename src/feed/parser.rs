//! Feed XML to [`RawItem`] extraction.
//!
//! Parsing is an ordered list of strategies: the `feed-rs` document parser
//! (RSS 0.9x/1.0/2.0 and Atom) first, then a regex block extractor for
//! malformed or truncated XML. The first strategy that yields items wins;
//! a strategy that fails reports zero items instead of an error.
use regex::Regex;
use std::sync::LazyLock;

use super::normalize::parse_timestamp;

/// An item as found in the feed, before any cleaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub published_at_raw: Option<String>,
    pub image_url: Option<String>,
}

type Strategy = fn(&str) -> Vec<RawItem>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("document", parse_document),
    ("fallback", parse_fallback),
];

/// Extracts items from feed text, trying each strategy in order.
///
/// Never fails: text that no strategy understands yields an empty list.
pub fn parse_items(xml: &str) -> Vec<RawItem> {
    for (name, strategy) in STRATEGIES {
        let items = strategy(xml);
        if !items.is_empty() {
            tracing::trace!(strategy = *name, count = items.len(), "Parsed feed items");
            return items;
        }
    }
    Vec::new()
}

/// Structured parse via `feed-rs`.
///
/// Entries without a title or link are dropped. Dates are read with the
/// same layouts the normalizer accepts, so offset-less and epoch
/// timestamps survive the document path.
pub fn parse_document(xml: &str) -> Vec<RawItem> {
    let parser = feed_rs::parser::Builder::new()
        .timestamp_parser(parse_timestamp)
        .build();

    let feed = match parser.parse(xml.as_bytes()) {
        Ok(feed) => feed,
        Err(e) => {
            tracing::debug!(error = %e, "Document parse failed");
            return Vec::new();
        }
    };

    feed.entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let link = entry
                .links
                .iter()
                .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                .or_else(|| entry.links.first())
                .map(|l| l.href.clone())
                .unwrap_or_default();

            if title.trim().is_empty() || link.trim().is_empty() {
                return None;
            }

            let description = entry
                .summary
                .map(|s| s.content)
                .filter(|s| !s.trim().is_empty())
                .or_else(|| entry.content.and_then(|c| c.body));

            let published_at_raw = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.to_rfc3339());

            let image_url = entry.media.iter().find_map(|m| {
                m.content
                    .iter()
                    .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
                    .or_else(|| m.thumbnails.first().map(|t| t.image.uri.clone()))
            });

            Some(RawItem {
                title,
                link,
                description,
                published_at_raw,
                image_url,
            })
        })
        .collect()
}

static ITEM_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<item\b[^>]*>.*?</item\s*>").expect("valid regex"));
static TITLE: LazyLock<Regex> = LazyLock::new(|| tag_regex("title"));
static LINK: LazyLock<Regex> = LazyLock::new(|| tag_regex("link"));
static DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| tag_regex("description"));
static CONTENT_ENCODED: LazyLock<Regex> = LazyLock::new(|| tag_regex("content:encoded"));
static PUB_DATE: LazyLock<Regex> = LazyLock::new(|| tag_regex("pubDate"));
static PUBLISHED: LazyLock<Regex> = LazyLock::new(|| tag_regex("published"));
static DC_DATE: LazyLock<Regex> = LazyLock::new(|| tag_regex("dc:date"));
static MEDIA_URL: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = concat!(
        r"(?is)<(?:media:content|media:thumbnail|enclosure)\b",
        r#"[^>]*?\burl\s*=\s*["']([^"']+)["']"#,
    );
    Regex::new(pattern).expect("valid regex")
});

fn tag_regex(tag: &str) -> Regex {
    let pattern = format!(r"(?is)<{0}\b[^>]*>(.*?)</{0}\s*>", regex::escape(tag));
    Regex::new(&pattern).expect("valid regex")
}

fn pick(re: &Regex, block: &str) -> Option<String> {
    re.captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Positional extraction from `<item>...</item>` spans.
///
/// Used when the document parser rejects the input. Only blocks with both
/// a title and a link are kept.
pub fn parse_fallback(xml: &str) -> Vec<RawItem> {
    ITEM_BLOCK
        .find_iter(xml)
        .filter_map(|block| {
            let block = block.as_str();
            let title = pick(&TITLE, block)?;
            let link = pick(&LINK, block)?;
            Some(RawItem {
                title,
                link,
                description: pick(&DESCRIPTION, block).or_else(|| pick(&CONTENT_ENCODED, block)),
                published_at_raw: pick(&PUB_DATE, block)
                    .or_else(|| pick(&PUBLISHED, block))
                    .or_else(|| pick(&DC_DATE, block)),
                image_url: pick(&MEDIA_URL, block),
            })
        })
        .collect()
}
