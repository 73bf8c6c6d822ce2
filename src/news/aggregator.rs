//! Concurrent fan-out over feed sources and the merge that follows.
//!
//! Merge order is fixed: deduplicate by canonical URL, filter by topic,
//! then stable-sort newest first. Sources are fetched concurrently but
//! their results are consumed in configuration order, so response latency
//! never affects which duplicate survives or how ties are ordered.
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use crate::feed::normalize::canonical_url;
use crate::feed::{normalize_item, FeedFetcher, FeedSource, NormalizeOptions};
use crate::news::{NewsItem, Topic};

#[derive(Debug, Clone)]
pub struct Aggregator {
    fetcher: Arc<FeedFetcher>,
}

impl Aggregator {
    pub fn new(fetcher: FeedFetcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }

    /// Fetches every source and returns the merged, filtered, sorted list.
    ///
    /// Dropping the returned future abandons all in-flight fetches.
    pub async fn aggregate(
        &self,
        sources: &[FeedSource],
        topic: Topic,
        options: NormalizeOptions,
    ) -> Vec<NewsItem> {
        let items = self.collect(sources, options).await;
        let merged = merge(items, topic, sources);
        tracing::debug!(
            sources = sources.len(),
            topic = %topic,
            items = merged.len(),
            "Aggregated feeds"
        );
        merged
    }

    /// Normalized items from all sources, concatenated in source order.
    pub async fn collect(
        &self,
        sources: &[FeedSource],
        options: NormalizeOptions,
    ) -> Vec<NewsItem> {
        let now = Utc::now();

        let fetches = sources.iter().map(|source| self.fetcher.fetch_source(source));
        let per_source = join_all(fetches).await;

        sources
            .iter()
            .zip(per_source)
            .flat_map(|(source, raw_items)| {
                raw_items
                    .into_iter()
                    .filter_map(move |raw| normalize_item(raw, source, options, now))
            })
            .collect()
    }
}

/// Dedup, topic filter and newest-first sort over already normalized items.
pub fn merge(items: Vec<NewsItem>, topic: Topic, sources: &[FeedSource]) -> Vec<NewsItem> {
    let mut selected = select_topic(dedup(items), topic, sources);
    sort_latest(&mut selected);
    selected
}

/// Keeps the first item per canonical URL.
pub fn dedup(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(canonical_url(&item.url)))
        .collect()
}

/// Items classified under `topic`.
///
/// When nothing was classified under it, falls back to every item from
/// sources whose default topic is `topic`. [`Topic::All`] keeps everything.
pub fn select_topic(items: Vec<NewsItem>, topic: Topic, sources: &[FeedSource]) -> Vec<NewsItem> {
    if topic == Topic::All {
        return items;
    }

    if items.iter().any(|item| item.topic == topic) {
        return items.into_iter().filter(|item| item.topic == topic).collect();
    }

    let defaulting: HashSet<&str> = sources
        .iter()
        .filter(|s| s.default_topic == topic)
        .map(|s| s.name.as_str())
        .collect();
    items
        .into_iter()
        .filter(|item| defaulting.contains(item.source.as_str()))
        .collect()
}

/// Stable sort, newest first.
pub fn sort_latest(items: &mut [NewsItem]) {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}
