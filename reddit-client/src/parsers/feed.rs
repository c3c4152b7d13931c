use feed_rs::parser;
use html_escape::decode_html_entities;
use trending_core::{Post, Provenance, RedditApiError};

/// Decodes an Atom or RSS document. Only title and link survive; score,
/// author and comment counts are not exposed by the feed.
pub fn parse_feed(body: &[u8]) -> Result<Vec<Post>, RedditApiError> {
    let feed = parser::parse(body).map_err(|e| RedditApiError::InvalidResponse {
        details: format!("feed did not parse: {}", e),
    })?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.map(|t| decode_html_entities(&t.content).to_string())?;
            let link = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
                .or_else(|| entry.links.first())
                .map(|l| l.href.clone());
            Post::new(title, link, None, Provenance::Rss)
        })
        .collect())
}
