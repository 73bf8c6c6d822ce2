//! News items and the aggregation pipeline built on top of the feed layer.
//!
//! [`Aggregator`] fetches a [`FeedProfile`]'s sources concurrently, then
//! merges the normalized items: deduplicated by canonical URL, filtered to
//! the requested topic, and sorted newest first. The HTTP layer pages the
//! result with [`paginate`] and keeps it warm in a [`TtlCache`].

pub mod aggregator;
pub mod cache;
mod item;
pub mod paginate;
mod profile;

pub use aggregator::Aggregator;
pub use cache::{cache_key, TtlCache};
pub use item::{format_timestamp, NewsItem, Topic};
pub use paginate::{cursor_page, offset_page, Cursor, CursorError, CursorPage, OffsetPage};
pub use profile::FeedProfile;
