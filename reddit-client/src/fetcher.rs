use crate::api::RedditApiClient;
use crate::auth::TokenManager;
use crate::metrics::MetricsCollector;
use crate::sources::{FeedSource, HtmlSource, JsonSource, OAuthJsonSource, PostSource};
use std::sync::Arc;
use tracing::{debug, info, warn};
use trending_core::{Post, RedditApiError, Timeframe};

/// Runs the fallback chain: stages are tried strictly in order until one
/// yields posts, a rate limit or timeout stops everything, or all stages
/// are exhausted.
pub struct PostFetcher {
    stages: Vec<Box<dyn PostSource>>,
    top_n: usize,
    metrics: Arc<MetricsCollector>,
}

impl PostFetcher {
    pub fn new(
        stages: Vec<Box<dyn PostSource>>,
        top_n: usize,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            stages,
            top_n,
            metrics,
        }
    }

    /// OAuth JSON, then `top.json` on the API, web and legacy hosts, then the
    /// feed, then the legacy listing page.
    pub fn standard(
        api: Arc<RedditApiClient>,
        tokens: Arc<TokenManager>,
        top_n: usize,
        oauth_limit: u32,
    ) -> Self {
        let hosts = api.hosts().clone();
        let json_limit = top_n as u32;
        let stages: Vec<Box<dyn PostSource>> = vec![
            Box::new(OAuthJsonSource::new(api.clone(), tokens, oauth_limit)),
            Box::new(JsonSource::new(api.clone(), "api.top.json", &hosts.api, json_limit)),
            Box::new(JsonSource::new(api.clone(), "www.top.json", &hosts.www, json_limit)),
            Box::new(JsonSource::new(api.clone(), "old.top.json", &hosts.old, json_limit)),
            Box::new(FeedSource::new(api.clone())),
            Box::new(HtmlSource::new(api.clone())),
        ];
        Self::new(stages, top_n, api.metrics().clone())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub async fn fetch_top(
        &self,
        subreddit: &str,
        timeframe: &Timeframe,
    ) -> Result<Vec<Post>, RedditApiError> {
        for stage in &self.stages {
            match stage.fetch(subreddit, timeframe).await {
                Ok(mut posts) if !posts.is_empty() || stage.accepts_empty() => {
                    posts.truncate(self.top_n);
                    info!(
                        "Fetched {} top posts for r/{} ({}) via {}",
                        posts.len(),
                        subreddit,
                        timeframe,
                        stage.name()
                    );
                    self.metrics.record_fetch(stage.provenance()).await;
                    return Ok(posts);
                }
                Ok(_) => debug!("{} returned no posts for r/{}", stage.name(), subreddit),
                Err(e) if e.aborts_chain() => {
                    warn!(
                        "{} stopped the fallback chain for r/{}: {}",
                        stage.name(),
                        subreddit,
                        e
                    );
                    return Err(e);
                }
                Err(RedditApiError::CredentialsMissing) => {
                    debug!("{} skipped: no credentials configured", stage.name())
                }
                Err(e) => debug!("{} failed for r/{}: {}", stage.name(), subreddit, e),
            }
        }

        warn!("Every retrieval stage failed for r/{}", subreddit);
        Err(RedditApiError::Unavailable {
            subreddit: subreddit.to_string(),
        })
    }
}
