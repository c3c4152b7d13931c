//! Retrieval stages for top posts, one per Reddit surface.

use crate::api::RedditApiClient;
use crate::auth::TokenManager;
use crate::parsers::{parse_feed, parse_listing, parse_listing_page};
use crate::transport::{UpstreamRequest, UpstreamResponse};
use async_trait::async_trait;
use std::sync::Arc;
use trending_core::{Post, Provenance, RedditApiError, Timeframe};
use url::Url;

/// One stage of the fallback chain.
///
/// Implementations report stage-local problems as errors; the driver decides
/// which of them end the chain (see [`RedditApiError::aborts_chain`]).
#[async_trait]
pub trait PostSource: Send + Sync {
    fn name(&self) -> &str;

    fn provenance(&self) -> Provenance;

    /// Whether an empty, well-formed answer counts as a result.
    fn accepts_empty(&self) -> bool {
        false
    }

    async fn fetch(&self, subreddit: &str, timeframe: &Timeframe)
        -> Result<Vec<Post>, RedditApiError>;
}

fn build_url(base: &str, path: &str, params: &[(&str, &str)]) -> Result<String, RedditApiError> {
    Url::parse_with_params(&format!("{}{}", base, path), params)
        .map(String::from)
        .map_err(|e| RedditApiError::InvalidResponse {
            details: format!("could not build url for {}: {}", path, e),
        })
}

fn ensure_success(response: &UpstreamResponse, resource: &str) -> Result<(), RedditApiError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(RedditApiError::from_status(response.status, resource))
    }
}

/// Authenticated listing on the OAuth host.
pub struct OAuthJsonSource {
    api: Arc<RedditApiClient>,
    tokens: Arc<TokenManager>,
    limit: u32,
}

impl OAuthJsonSource {
    pub fn new(api: Arc<RedditApiClient>, tokens: Arc<TokenManager>, limit: u32) -> Self {
        Self { api, tokens, limit }
    }
}

#[async_trait]
impl PostSource for OAuthJsonSource {
    fn name(&self) -> &str {
        "oauth.top"
    }

    fn provenance(&self) -> Provenance {
        Provenance::OauthJson
    }

    async fn fetch(
        &self,
        subreddit: &str,
        timeframe: &Timeframe,
    ) -> Result<Vec<Post>, RedditApiError> {
        let token = self.tokens.get_token().await?;
        let limit = self.limit.to_string();
        let path = format!("/r/{}/top", subreddit);
        let url = build_url(
            &self.api.hosts().oauth,
            &path,
            &[("t", timeframe.as_str()), ("limit", &limit), ("raw_json", "1")],
        )?;

        let request =
            UpstreamRequest::get(url).with_header("Authorization", format!("Bearer {}", token));
        let response = self.api.send(self.name(), request).await?;
        ensure_success(&response, &path)?;
        parse_listing(&response.body, self.provenance())
    }
}

/// Unauthenticated `top.json` on one host.
pub struct JsonSource {
    api: Arc<RedditApiClient>,
    name: String,
    base: String,
    limit: u32,
}

impl JsonSource {
    pub fn new(api: Arc<RedditApiClient>, name: &str, base: &str, limit: u32) -> Self {
        Self {
            api,
            name: name.to_string(),
            base: base.to_string(),
            limit,
        }
    }
}

#[async_trait]
impl PostSource for JsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn provenance(&self) -> Provenance {
        Provenance::Json
    }

    async fn fetch(
        &self,
        subreddit: &str,
        timeframe: &Timeframe,
    ) -> Result<Vec<Post>, RedditApiError> {
        let limit = self.limit.to_string();
        let path = format!("/r/{}/top.json", subreddit);
        let url = build_url(
            &self.base,
            &path,
            &[("t", timeframe.as_str()), ("limit", &limit), ("raw_json", "1")],
        )?;

        let response = self.api.get(&self.name, &url).await?;
        ensure_success(&response, &path)?;
        parse_listing(&response.body, self.provenance())
    }
}

/// Atom feed of the same listing. A feed with no entries is a valid answer.
pub struct FeedSource {
    api: Arc<RedditApiClient>,
}

impl FeedSource {
    pub fn new(api: Arc<RedditApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PostSource for FeedSource {
    fn name(&self) -> &str {
        "www.top.rss"
    }

    fn provenance(&self) -> Provenance {
        Provenance::Rss
    }

    fn accepts_empty(&self) -> bool {
        true
    }

    async fn fetch(
        &self,
        subreddit: &str,
        timeframe: &Timeframe,
    ) -> Result<Vec<Post>, RedditApiError> {
        let path = format!("/r/{}/top/.rss", subreddit);
        let url = build_url(&self.api.hosts().www, &path, &[("t", timeframe.as_str())])?;

        let response = self.api.get(self.name(), &url).await?;
        ensure_success(&response, &path)?;
        parse_feed(&response.body)
    }
}

/// Scrapes the legacy host's listing page. Last resort.
pub struct HtmlSource {
    api: Arc<RedditApiClient>,
}

impl HtmlSource {
    pub fn new(api: Arc<RedditApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PostSource for HtmlSource {
    fn name(&self) -> &str {
        "old.top.html"
    }

    fn provenance(&self) -> Provenance {
        Provenance::Html
    }

    async fn fetch(
        &self,
        subreddit: &str,
        timeframe: &Timeframe,
    ) -> Result<Vec<Post>, RedditApiError> {
        let path = format!("/r/{}/top/", subreddit);
        let url = build_url(&self.api.hosts().old, &path, &[("t", timeframe.as_str())])?;

        let response = self.api.get(self.name(), &url).await?;
        ensure_success(&response, &path)?;

        let posts = parse_listing_page(&response.text());
        if posts.is_empty() {
            return Err(RedditApiError::InvalidResponse {
                details: format!("no posts could be extracted from {}", path),
            });
        }
        Ok(posts)
    }
}
