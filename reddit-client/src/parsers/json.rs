use super::absolutize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trending_core::{Post, Provenance, RedditApiError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub subreddit: String,
    pub url: Option<String>,
    pub permalink: Option<String>,
    pub created_utc: Option<f64>,
    pub score: Option<i64>,
    pub num_comments: Option<u64>,
    pub stickied: bool,
    pub over_18: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditSubredditData {
    pub display_name: Option<String>,
    pub subreddit_type: Option<String>,
    pub title: Option<String>,
    pub subscribers: Option<u64>,
    pub over18: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct AboutResponse {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    data: RedditSubredditData,
}

/// What the "about" endpoints told us about a subreddit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AboutInfo {
    pub display_name: String,
    pub subreddit_type: Option<String>,
}

impl RedditPostData {
    fn into_post(self, provenance: Provenance) -> Option<Post> {
        let permalink = self.permalink.as_deref().and_then(absolutize);
        let url = self.url.as_deref().and_then(absolutize);
        let mut post = Post::new(self.title, url, permalink, provenance)?;
        post.score = self.score;
        post.author = self.author.filter(|a| !a.is_empty());
        post.num_comments = self.num_comments;
        post.created_at = self
            .created_utc
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0));
        Some(post)
    }
}

/// Decodes a `/top` listing. Children that are not posts, or have no title
/// or link, are dropped.
pub fn parse_listing(body: &[u8], provenance: Provenance) -> Result<Vec<Post>, RedditApiError> {
    let listing: RedditListing<RedditPostData> =
        serde_json::from_slice(body).map_err(|e| RedditApiError::InvalidResponse {
            details: format!("listing did not decode: {}", e),
        })?;

    Ok(listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t3")
        .filter_map(|child| child.data.into_post(provenance))
        .collect())
}

/// Decodes an `about.json` payload; `None` when it is not a subreddit
/// description (Reddit answers unknown names with a search listing).
pub fn parse_about(body: &[u8]) -> Option<AboutInfo> {
    let about: AboutResponse = serde_json::from_slice(body).ok()?;
    if about.kind.as_deref().is_some_and(|kind| kind != "t5") {
        return None;
    }
    let display_name = about
        .data
        .display_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())?;

    Some(AboutInfo {
        display_name,
        subreddit_type: about.data.subreddit_type,
    })
}
