//! RSS/Atom news relay.
//!
//! Fetches a configured set of feeds, tolerates broken XML and legacy
//! Korean encodings, normalizes entries into [`news::NewsItem`]s and serves
//! the merged, deduplicated timeline over HTTP.

pub mod config;
pub mod feed;
pub mod news;
pub mod server;
pub mod util;
