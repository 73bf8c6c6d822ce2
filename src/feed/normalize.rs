//! Cleaning and canonicalization of raw feed items.
//!
//! Every function here is total: malformed dates, URLs and markup are
//! replaced by safe defaults (current time, absent image, raw string)
//! rather than reported as errors.
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use super::parser::RawItem;
use super::source::FeedSource;
use crate::news::{NewsItem, Topic};
use crate::util::{strip_control_chars, truncate_chars};

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,7});")
        .expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\u{00A0}]+").expect("valid regex"));
static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]*\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

const CRYPTO_KEYWORDS: &[&str] = &[
    "비트코인", "코인", "암호화폐", "가상자산", "블록체인", "업비트", "바이낸스",
    "bitcoin", "btc", "ethereum", "crypto", "blockchain",
];
const STOCK_KEYWORDS: &[&str] = &[
    "주식", "증시", "나스닥", "s&p", "코스피", "코스닥", "다우", "기업",
    "stock", "nasdaq", "dow jones", "earnings",
];
const FX_KEYWORDS: &[&str] = &[
    "환율", "금리", "달러", "usd", "환전", "외환", "fed", "연준",
    "forex", "exchange rate", "interest rate",
];

/// Settings that vary between feed profiles.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub summary_max_chars: usize,
}

/// Turns a [`RawItem`] into a [`NewsItem`].
///
/// Returns `None` when the cleaned title or link is empty.
pub fn normalize_item(
    raw: RawItem,
    source: &FeedSource,
    options: NormalizeOptions,
    now: DateTime<Utc>,
) -> Option<NewsItem> {
    let title = clean_text(&raw.title);
    let link = clean_text(&raw.link);
    if title.is_empty() || link.is_empty() {
        return None;
    }

    let description = raw.description.as_deref().map(clean_text).unwrap_or_default();

    let image = raw
        .image_url
        .as_deref()
        .and_then(sanitize_image)
        .or_else(|| extract_image_from_description(&description).and_then(sanitize_image));

    let plain = strip_html(&description);
    let topic = classify_topic(&title, &plain, source.default_topic);
    let summary = (!plain.is_empty())
        .then(|| truncate_chars(&plain, options.summary_max_chars).into_owned());

    let url = canonical_url(&link);

    Some(NewsItem {
        id: url.clone(),
        title,
        summary,
        url,
        image,
        published_at: parse_date(raw.published_at_raw.as_deref(), now),
        source: source.name.clone(),
        topic,
    })
}

/// Removes CDATA markers, decodes HTML entities and strips control characters.
pub fn clean_text(s: &str) -> String {
    let without_cdata = s.replace("<![CDATA[", "").replace("]]>", "");
    let decoded = decode_entities(without_cdata.trim());
    strip_control_chars(decoded.trim()).into_owned()
}

fn decode_entities(s: &str) -> String {
    ENTITY
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            let hex = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X"));
            let decoded = if let Some(hex) = hex {
                u32::from_str_radix(hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32).map(String::from)
            } else {
                named_entity(&body.to_ascii_lowercase()).map(String::from)
            };
            decoded.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some(" "),
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        "middot" => Some("·"),
        "hellip" => Some("…"),
        "lsquo" => Some("‘"),
        "rsquo" => Some("’"),
        "ldquo" => Some("“"),
        "rdquo" => Some("”"),
        _ => None,
    }
}

/// Plain text from HTML: tags become spaces and whitespace runs collapse.
pub fn strip_html(html: &str) -> String {
    let cleaned = clean_text(html);
    let untagged = TAG.replace_all(&cleaned, " ");
    let text = clean_text(&untagged);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// First `<img src>` in a chunk of markup.
pub fn extract_image_from_description(html: &str) -> Option<&str> {
    IMG_SRC
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Accepts absolute http(s) URLs; protocol-relative URLs are upgraded to https.
pub fn sanitize_image(u: &str) -> Option<String> {
    let v = clean_text(u);
    if v.is_empty() {
        return None;
    }
    if v.starts_with("//") {
        return Some(format!("https:{v}"));
    }
    let lower = v.get(..8).unwrap_or(&v).to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(v);
    }
    None
}

/// Parses a feed date, defaulting to `now`.
pub fn parse_date(input: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(s) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return now;
    };

    parse_timestamp(s).unwrap_or_else(|| {
        tracing::trace!(input = %s, "Unparseable feed date, using fetch time");
        now
    })
}

/// Parses a feed timestamp.
///
/// Tries RFC 3339, RFC 2822, common offset-less layouts (read as UTC),
/// then a bare integer as epoch milliseconds.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Some(midnight.and_utc());
    }
    s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
}

/// Keyword classification over title and summary.
///
/// Crypto terms win over stock terms, which win over FX terms. Text matching
/// none of them keeps the source's default topic.
pub fn classify_topic(title: &str, summary: &str, fallback: Topic) -> Topic {
    let text = format!("{title} {summary}").to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| text.contains(w));

    if has(CRYPTO_KEYWORDS) {
        Topic::Crypto
    } else if has(STOCK_KEYWORDS) {
        Topic::Stocks
    } else if has(FX_KEYWORDS) {
        Topic::Fx
    } else {
        fallback
    }
}

/// Dedup key for a link: `utm_*` query parameters and the fragment removed.
///
/// Links that do not parse as absolute URLs are returned trimmed.
pub fn canonical_url(link: &str) -> String {
    let Ok(mut url) = Url::parse(link.trim()) else {
        return link.trim().to_string();
    };

    url.set_fragment(None);

    let has_tracking = url.query_pairs().any(|(k, _)| k.starts_with("utm_"));
    if has_tracking {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !k.starts_with("utm_"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    url.to_string()
}

/// Mojibake detector: more than 5% U+FFFD, or any run of three.
pub fn is_garbled(s: &str) -> bool {
    if s.contains("\u{FFFD}\u{FFFD}\u{FFFD}") {
        return true;
    }
    let total = s.chars().count().max(1);
    let bad = s.chars().filter(|&c| c == '\u{FFFD}').count();
    bad * 20 > total
}
