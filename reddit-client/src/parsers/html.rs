//! Narrow pattern extraction over Reddit's HTML.
//!
//! This is not an HTML parser: each pattern targets one known page layout
//! and fails closed (returns `None` or nothing) when the layout changes.

use super::absolutize;
use html_escape::decode_html_entities;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use trending_core::{Post, Provenance};

const NAME: &str = r"([A-Za-z0-9_]{2,21})";

/// Canonical-name patterns in priority order; the first match wins.
static CANONICAL_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let reddit_url = format!(r#"https?://(?:[a-z0-9-]+\.)?reddit\.com/r/{}"#, NAME);
    vec![
        (
            Regex::new(&format!(
                r#"(?i)<meta\s[^>]*property=["']og:url["'][^>]*content=["']{}"#,
                reddit_url
            ))
            .unwrap(),
            "og:url",
        ),
        (
            Regex::new(&format!(
                r#"(?i)<meta\s[^>]*content=["']{}[^"']*["'][^>]*property=["']og:url["']"#,
                reddit_url
            ))
            .unwrap(),
            "og:url",
        ),
        (
            Regex::new(&format!(
                r#"(?i)<link\s[^>]*rel=["']canonical["'][^>]*href=["']{}"#,
                reddit_url
            ))
            .unwrap(),
            "canonical",
        ),
        (
            Regex::new(&format!(
                r#"(?i)<link\s[^>]*href=["']{}[^"']*["'][^>]*rel=["']canonical["']"#,
                reddit_url
            ))
            .unwrap(),
            "canonical",
        ),
        (
            Regex::new(&format!(
                r#"(?i)(?:data-subreddit-prefixed|subreddit-prefixed-name|prefixed-name)=["']r/{}["']"#,
                NAME
            ))
            .unwrap(),
            "prefixed-attribute",
        ),
        (
            Regex::new(&format!(r#"(?i)<title[^>]*>\s*r/{}"#, NAME)).unwrap(),
            "title",
        ),
    ]
});

const GATING_MARKERS: [&str; 3] = [
    "protected-community-modal",
    "this community is private",
    "must be invited",
];

static THING_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div\s[^>]*class="[^"]*\bthing\b[^"]*"[^>]*>"#).unwrap()
});

static DATA_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bdata-([a-z-]+)="([^"]*)""#).unwrap());

static TITLE_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a\s[^>]*class="[^"]*\btitle\b[^"]*"[^>]*>(.*?)</a>"#).unwrap()
});

static INNER_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Finds the canonical subreddit name in a page, or `None` when no known
/// marker is present.
pub fn extract_canonical_name(html: &str) -> Option<String> {
    CANONICAL_PATTERNS.iter().find_map(|(pattern, label)| {
        pattern.captures(html).map(|caps| {
            tracing::debug!("Canonical name found via {}", label);
            caps[1].to_string()
        })
    })
}

/// True when the page carries a private/protected community marker.
pub fn detect_gating(html: &str) -> bool {
    let lowered = html.to_lowercase();
    GATING_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Extracts posts from a legacy-host listing page. Promoted entries are
/// skipped; entries without a title or link are dropped.
pub fn parse_listing_page(html: &str) -> Vec<Post> {
    let tags: Vec<_> = THING_TAG.find_iter(html).collect();

    tags.iter()
        .enumerate()
        .filter_map(|(index, tag)| {
            let attributes: HashMap<&str, String> = DATA_ATTRIBUTE
                .captures_iter(tag.as_str())
                .filter_map(|caps| {
                    let name = caps.get(1)?.as_str();
                    let value = caps.get(2)?.as_str();
                    Some((name, decode_html_entities(value).to_string()))
                })
                .collect();

            if attributes.get("promoted").is_some_and(|v| v == "true") {
                return None;
            }

            let body_end = tags.get(index + 1).map_or(html.len(), |next| next.start());
            let body = &html[tag.end()..body_end];
            let raw_title = TITLE_ANCHOR.captures(body)?.get(1)?.as_str();
            let title = decode_html_entities(&INNER_TAG.replace_all(raw_title, "")).to_string();

            let permalink = attributes.get("permalink").and_then(|p| absolutize(p));
            let url = attributes.get("url").and_then(|u| absolutize(u));

            let mut post = Post::new(title, url, permalink, Provenance::Html)?;
            post.score = attributes.get("score").and_then(|s| s.parse().ok());
            post.num_comments = attributes
                .get("comments-count")
                .and_then(|c| c.parse().ok());
            Some(post)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD_LISTING: &str = r#"
<div class="sitetable linklisting" id="siteTable">
<div class=" thing id-t3_promo odd link promoted" data-fullname="t3_promo" data-promoted="true" data-url="https://ads.example.com/" data-permalink="/r/ads/comments/promo/" data-score="1">
  <a class="title may-blank " href="https://ads.example.com/">Buy things</a>
</div>
<div class=" thing id-t3_abc even link " id="thing_t3_abc" data-fullname="t3_abc" data-author="ferris" data-subreddit-prefixed="r/rust" data-url="https://blog.rust-lang.org/" data-permalink="/r/rust/comments/abc/rust_20/" data-comments-count="321" data-score="4200" data-promoted="false">
  <p class="title"><a class="title may-blank outbound" data-event-action="title" href="https://blog.rust-lang.org/" tabindex="1">Rust 2.0 &amp; <em>friends</em></a></p>
</div>
<div class=" thing id-t3_def odd link self" data-fullname="t3_def" data-url="/r/rust/comments/def/question/" data-permalink="/r/rust/comments/def/question/" data-comments-count="12" data-promoted="false">
  <a class="title may-blank " href="/r/rust/comments/def/question/">A question</a>
</div>
<div class=" thing id-t3_ghi even link" data-fullname="t3_ghi" data-permalink="/r/rust/comments/ghi/x/">
  <span>no anchor at all</span>
</div>
</div>"#;

    #[test]
    fn test_parse_listing_page() {
        let posts = parse_listing_page(OLD_LISTING);
        assert_eq!(posts.len(), 2);

        assert_eq!(posts[0].title, "Rust 2.0 & friends");
        assert_eq!(posts[0].url.as_deref(), Some("https://blog.rust-lang.org/"));
        assert_eq!(
            posts[0].permalink.as_deref(),
            Some("https://www.reddit.com/r/rust/comments/abc/rust_20/")
        );
        assert_eq!(posts[0].score, Some(4200));
        assert_eq!(posts[0].num_comments, Some(321));
        assert_eq!(posts[0].provenance, Provenance::Html);

        // hidden score stays unknown, relative url made absolute
        assert_eq!(posts[1].score, None);
        assert_eq!(
            posts[1].url.as_deref(),
            Some("https://www.reddit.com/r/rust/comments/def/question/")
        );
    }

    #[test]
    fn test_parse_listing_page_without_things() {
        assert!(parse_listing_page("<html><body>nothing</body></html>").is_empty());
    }

    #[test]
    fn test_canonical_from_og_url() {
        let html = r#"<head><meta property="og:url" content="https://www.reddit.com/r/Cooking/"><title>r/cooking</title></head>"#;
        assert_eq!(extract_canonical_name(html).as_deref(), Some("Cooking"));
    }

    #[test]
    fn test_canonical_from_og_url_reversed_attributes() {
        let html = r#"<meta content="https://reddit.com/r/AskHistorians/" property="og:url"/>"#;
        assert_eq!(extract_canonical_name(html).as_deref(), Some("AskHistorians"));
    }

    #[test]
    fn test_canonical_link_beats_prefixed_attribute() {
        let html = r#"<div data-subreddit-prefixed="r/wrong"></div>
<link rel="canonical" href="https://www.reddit.com/r/RightOne/"/>"#;
        assert_eq!(extract_canonical_name(html).as_deref(), Some("RightOne"));
    }

    #[test]
    fn test_canonical_from_prefixed_attribute() {
        let html = r#"<shreddit-subreddit-header prefixed-name="r/NoSleep"></shreddit-subreddit-header>"#;
        assert_eq!(extract_canonical_name(html).as_deref(), Some("NoSleep"));
    }

    #[test]
    fn test_canonical_from_title() {
        let html = "<html><title> r/LearnRust - a place to learn</title></html>";
        assert_eq!(extract_canonical_name(html).as_deref(), Some("LearnRust"));
    }

    #[test]
    fn test_canonical_not_found() {
        assert_eq!(extract_canonical_name("<html><title>reddit</title></html>"), None);
        assert_eq!(extract_canonical_name(""), None);
    }

    #[test]
    fn test_detect_gating() {
        assert!(detect_gating("<p>This community is private</p>"));
        assert!(detect_gating("only approved users, you must be invited"));
        assert!(detect_gating(r#"<div id="protected-community-modal">"#));
        assert!(!detect_gating("<p>welcome to r/rust</p>"));
    }
}
