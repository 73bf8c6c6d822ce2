//! Feed retrieval and item extraction.
//!
//! The pipeline for one source, leaf first:
//!
//! - [`fetcher`] - HTTP GET with timeout, size limit and mirror fallback
//! - [`decoder`] - charset trial (UTF-8, then legacy Korean encodings)
//! - [`parser`] - `feed-rs` document parse with a regex block fallback
//! - [`normalize`] - entity/markup cleaning, thumbnails, dates, topics,
//!   canonical URLs
//!
//! Every stage degrades to "no items" instead of failing, so a broken
//! source can never take down an aggregation.
//!
//! # Example
//!
//! ```ignore
//! use newsrelay::feed::{Decoder, FeedFetcher, FeedSource, FetchSettings};
//! use newsrelay::news::Topic;
//!
//! let fetcher = FeedFetcher::new(
//!     reqwest::Client::new(),
//!     FetchSettings::default(),
//!     Decoder::default(),
//! );
//! let source = FeedSource::new("TokenPost", "https://www.tokenpost.kr/rss", Topic::Crypto);
//! let raw = fetcher.fetch_source(&source).await;
//! ```

pub mod decoder;
pub mod fetcher;
pub mod normalize;
pub mod parser;
mod source;

pub use decoder::Decoder;
pub use fetcher::{FeedFetcher, FetchError, FetchSettings};
pub use normalize::{normalize_item, NormalizeOptions};
pub use parser::{parse_items, RawItem};
pub use source::FeedSource;
