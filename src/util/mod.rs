//! Utility functions shared by the feed pipeline and the HTTP layer.
//!
//! - **URL validation**: SSRF guard for user-supplied upstream URLs
//! - **Text processing**: control-character stripping and char-budget truncation
//!
//! # Examples
//!
//! ```
//! use newsrelay::util::{truncate_chars, validate_url};
//!
//! let url = validate_url("https://example.com/thumb.jpg").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! assert_eq!(truncate_chars("Bitcoin rallies", 7), "Bitcoin...");
//! ```

mod text;
mod url_validator;

pub use text::{strip_control_chars, truncate_chars};
pub use url_validator::{validate_url, UrlValidationError};
