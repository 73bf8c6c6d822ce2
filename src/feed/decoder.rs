//! Charset detection by trial.
//!
//! Korean publishers routinely serve EUC-KR/CP949 while declaring UTF-8 (or
//! nothing), so the declared charset is ignored. Each candidate encoding is
//! tried strictly, in order, and the first one whose text parses into at
//! least one item wins.
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

use super::parser::{parse_items, RawItem};

/// Charset labels tried when none are configured.
pub const DEFAULT_ENCODINGS: &[&str] = &["utf-8", "euc-kr", "ks_c_5601-1987", "cp949"];

static XML_DECL_ENCODING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^(\s*<\?xml[^>]*?\bencoding\s*=\s*["'])[^"']*(["'])"#).expect("valid regex")
});

/// Ordered list of candidate encodings.
#[derive(Debug, Clone)]
pub struct Decoder {
    encodings: Vec<&'static Encoding>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::from_labels(DEFAULT_ENCODINGS)
    }
}

impl Decoder {
    /// Resolves WHATWG charset labels. Unknown labels are skipped with a
    /// warning; aliases of an encoding already listed are dropped. An empty
    /// result falls back to UTF-8.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut encodings: Vec<&'static Encoding> = Vec::new();
        for label in labels {
            let label = label.as_ref();
            match Encoding::for_label(label.trim().as_bytes()) {
                Some(enc) if !encodings.contains(&enc) => encodings.push(enc),
                Some(_) => {}
                None => tracing::warn!(label = %label, "Unknown charset label, skipping"),
            }
        }
        if encodings.is_empty() {
            encodings.push(UTF_8);
        }
        Self { encodings }
    }

    pub fn encodings(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.encodings.iter().map(|e| e.name())
    }

    /// Decodes `bytes` and extracts items.
    ///
    /// Strict decoding under each candidate comes first. If no candidate
    /// decodes cleanly into items, the first encoding is applied lossily as
    /// a last resort. Returns an empty list when nothing parses.
    pub fn decode_items(&self, bytes: &[u8]) -> Vec<RawItem> {
        for &encoding in &self.encodings {
            let Some(text) = decode_strict(encoding, bytes) else {
                continue;
            };
            let items = parse_items(&normalize_declaration(&text));
            if !items.is_empty() {
                tracing::trace!(encoding = encoding.name(), count = items.len(), "Decoded feed");
                return items;
            }
        }

        let (text, _, _) = self.encodings[0].decode(bytes);
        parse_items(&normalize_declaration(&text))
    }
}

fn decode_strict<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    let body = match Encoding::for_bom(bytes) {
        Some((bom_encoding, bom_len)) if bom_encoding == encoding => &bytes[bom_len..],
        _ => bytes,
    };
    encoding.decode_without_bom_handling_and_without_replacement(body)
}

/// Rewrites the XML declaration's `encoding` to utf-8 so the XML parser
/// does not second-guess text we have already decoded.
fn normalize_declaration(text: &str) -> Cow<'_, str> {
    XML_DECL_ENCODING.replace(text, "${1}utf-8${2}")
}
