//! Bounded web crawler for importing an existing business website.
//!
//! This crate provides:
//! - [`engine`]: Concurrent, same-origin crawler producing a [`CrawlResult`]
//! - [`page`]: Reduction of an HTML page to title, visible text, links and images
//! - [`contacts`]: E-mail and phone scanning across pages
//!
//! [`CrawlResult`]: ecospray_shared::CrawlResult

pub mod contacts;
pub mod engine;
pub mod page;

pub use contacts::ContactSet;
pub use engine::{CrawlProgress, Crawler, SilentProgress, is_ssrf_target, normalize_url};
pub use page::{ParsedPage, parse_page};
