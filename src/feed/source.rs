use serde::Deserialize;

use crate::news::Topic;

/// A configured RSS/Atom endpoint.
///
/// `default_topic` classifies items whose text matches no topic keywords.
/// `mirrors` are alternate URLs for the same feed, tried in order when the
/// primary yields nothing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub default_topic: Topic,
    #[serde(default)]
    pub mirrors: Vec<String>,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, default_topic: Topic) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            default_topic,
            mirrors: Vec::new(),
        }
    }

    pub fn with_mirrors<I, S>(mut self, mirrors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mirrors = mirrors.into_iter().map(Into::into).collect();
        self
    }

    /// Primary URL followed by mirrors, in fetch order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.url.as_str()).chain(self.mirrors.iter().map(String::as_str))
    }
}
