use crate::api::{RedditApiClient, RedditHosts};
use crate::auth::{RedditCredentials, TokenManager};
use crate::cache::{CacheKey, ResultCache};
use crate::fetcher::PostFetcher;
use crate::metrics::ApiMetrics;
use crate::rate_limiter::RateLimitConfig;
use crate::resolver::Resolver;
use crate::transport::{HttpTransport, ReqwestTransport};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use trending_core::{
    CoreError, Post, RedditApiError, ResolutionResult, Timeframe, TrendingConfig,
};

/// A resolved subreddit together with its current top posts.
#[derive(Debug, Clone, Serialize)]
pub struct TrendingReport {
    pub subreddit: ResolutionResult,
    pub timeframe: Timeframe,
    pub posts: Vec<Post>,
}

/// Entry point for callers: resolution plus cached, coalesced top-post
/// retrieval over one shared request gate.
pub struct TrendingService {
    api: Arc<RedditApiClient>,
    resolver: Resolver,
    fetcher: Arc<PostFetcher>,
    cache: ResultCache,
}

impl TrendingService {
    pub fn from_config(config: &TrendingConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config.user_agent, config.request_timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: &TrendingConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, CoreError> {
        Self::with_hosts(config, transport, RedditHosts::default())
    }

    pub fn with_hosts(
        config: &TrendingConfig,
        transport: Arc<dyn HttpTransport>,
        hosts: RedditHosts,
    ) -> Result<Self, CoreError> {
        let rate_config = RateLimitConfig {
            min_interval: config.min_request_interval(),
        };
        let api = Arc::new(
            RedditApiClient::new(transport, rate_config)
                .with_request_timeout(config.request_timeout())
                .with_hosts(hosts),
        );

        let credentials = config
            .credentials()
            .map(|(client_id, client_secret)| RedditCredentials {
                client_id,
                client_secret,
            });
        let tokens = Arc::new(TokenManager::new(api.clone(), credentials)?);
        info!(
            "Trending service ready (oauth {}, top {})",
            if tokens.is_configured() { "enabled" } else { "disabled" },
            config.top_n
        );

        let fetcher = Arc::new(PostFetcher::standard(
            api.clone(),
            tokens,
            config.top_n,
            config.oauth_fetch_limit,
        ));
        let cache = ResultCache::new().with_metrics(api.metrics().clone());

        Ok(Self {
            resolver: Resolver::new(api.clone()),
            api,
            fetcher,
            cache,
        })
    }

    pub async fn resolve(&self, name: &str) -> Result<ResolutionResult, RedditApiError> {
        self.resolver.resolve(name).await
    }

    /// Top posts for an already canonical name, served from cache when fresh.
    pub async fn fetch_top(
        &self,
        canonical: &str,
        timeframe: &Timeframe,
    ) -> Result<Vec<Post>, RedditApiError> {
        let key = CacheKey::new(canonical, timeframe);
        let fetcher = self.fetcher.clone();
        let subreddit = canonical.to_string();
        let timeframe = timeframe.clone();

        let posts = self
            .cache
            .get_or_fetch(key, move || async move {
                fetcher.fetch_top(&subreddit, &timeframe).await
            })
            .await?;
        Ok(posts.to_vec())
    }

    /// Resolves `name` and, if it exists, fetches its top posts under the
    /// canonical spelling.
    pub async fn trending(
        &self,
        name: &str,
        timeframe: &Timeframe,
    ) -> Result<TrendingReport, RedditApiError> {
        let subreddit = self.resolve(name).await?;
        if !subreddit.exists {
            return Err(RedditApiError::SubredditNotFound {
                subreddit: subreddit.canonical,
            });
        }

        let posts = self.fetch_top(&subreddit.canonical, timeframe).await?;
        Ok(TrendingReport {
            subreddit,
            timeframe: timeframe.clone(),
            posts,
        })
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.fetcher.stage_names()
    }

    pub async fn metrics(&self) -> ApiMetrics {
        self.api.metrics().get_metrics().await
    }
}
