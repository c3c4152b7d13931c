//! Decoders for the three shapes Reddit answers with.
//!
//! Each parser returns posts already normalized to [`trending_core::Post`];
//! truncation to the configured top-N happens in the fetch driver.

pub mod feed;
pub mod html;
pub mod json;

pub use feed::parse_feed;
pub use html::{detect_gating, extract_canonical_name, parse_listing_page};
pub use json::{parse_about, parse_listing, AboutInfo};

use url::Url;

pub const REDDIT_WEB_BASE: &str = "https://www.reddit.com";

/// Turns a site-relative Reddit path into a fully-qualified URL.
pub fn absolutize(link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    if link.starts_with("http://") || link.starts_with("https://") {
        return Some(link.to_string());
    }
    let base = Url::parse(REDDIT_WEB_BASE).ok()?;
    base.join(link).ok().map(String::from)
}
