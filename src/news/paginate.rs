//! Cursor and offset pagination over a newest-first item list.
//!
//! A cursor is the `publishedAt` of the last item a client received,
//! e.g. `2024-01-02T00:00:00.000Z`, meaning "continue with items strictly
//! older than this". When a page ends in the middle of a run of items that
//! share one timestamp, the cursor carries a `~n` suffix counting how many
//! of that run were already delivered, so ties are neither skipped nor
//! repeated.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::item::{format_timestamp, NewsItem};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("Cursor is not an ISO-8601 timestamp: {0}")]
    Timestamp(String),
    #[error("Cursor tie-break count is invalid: {0}")]
    TieBreak(String),
}

/// Resume point in a newest-first scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub at: DateTime<Utc>,
    /// Items published exactly at `at` that were already returned.
    /// `None` means all of them were.
    pub delivered_at_same_instant: Option<usize>,
}

impl Cursor {
    pub fn after(at: DateTime<Utc>) -> Self {
        Self {
            at,
            delivered_at_same_instant: None,
        }
    }
}

impl FromStr for Cursor {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (ts, tie) = match s.rsplit_once('~') {
            Some((ts, tie)) => (ts, Some(tie)),
            None => (s, None),
        };

        let at = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| CursorError::Timestamp(ts.to_string()))?
            .with_timezone(&Utc);

        let delivered_at_same_instant = tie
            .map(|n| n.parse::<usize>().map_err(|_| CursorError::TieBreak(n.to_string())))
            .transpose()?;

        Ok(Self {
            at,
            delivered_at_same_instant,
        })
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.delivered_at_same_instant {
            Some(n) => write!(f, "{}~{}", format_timestamp(&self.at), n),
            None => f.write_str(&format_timestamp(&self.at)),
        }
    }
}

/// One page of a cursor scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage {
    pub items: Vec<NewsItem>,
    pub next_cursor: Option<String>,
}

/// Up to `page_size` items following `cursor` (or from the newest item when
/// absent). `next_cursor` is `None` once a page comes back short.
pub fn cursor_page(sorted: &[NewsItem], cursor: Option<&Cursor>, page_size: usize) -> CursorPage {
    let start = cursor.map_or(0, |c| resume_index(sorted, c));
    let end = start.saturating_add(page_size).min(sorted.len());
    let items = sorted[start..end].to_vec();

    let next_cursor = match items.last() {
        Some(last) if items.len() == page_size => {
            Some(next_cursor(sorted, end, last.published_at).to_string())
        }
        _ => None,
    };

    CursorPage { items, next_cursor }
}

fn resume_index(sorted: &[NewsItem], cursor: &Cursor) -> usize {
    match cursor.delivered_at_same_instant {
        None => sorted.partition_point(|item| item.published_at >= cursor.at),
        Some(delivered) => {
            let first_at = sorted.partition_point(|item| item.published_at > cursor.at);
            let past_run = sorted.partition_point(|item| item.published_at >= cursor.at);
            (first_at + delivered).min(past_run)
        }
    }
}

fn next_cursor(sorted: &[NewsItem], end: usize, last_at: DateTime<Utc>) -> Cursor {
    let continues_run = sorted.get(end).is_some_and(|next| next.published_at == last_at);
    if !continues_run {
        return Cursor::after(last_at);
    }
    let run_start = sorted[..end].partition_point(|item| item.published_at > last_at);
    Cursor {
        at: last_at,
        delivered_at_same_instant: Some(end - run_start),
    }
}

/// One page of 1-based offset pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetPage {
    pub items: Vec<NewsItem>,
    pub next_page: Option<usize>,
}

pub fn offset_page(items: Vec<NewsItem>, page: usize, limit: usize) -> OffsetPage {
    let page = page.max(1);
    let offset = (page - 1).saturating_mul(limit);
    let total = items.len();
    let paged: Vec<_> = items.into_iter().skip(offset).take(limit).collect();
    let has_more = total > offset.saturating_add(paged.len());

    OffsetPage {
        items: paged,
        next_page: has_more.then_some(page + 1),
    }
}
