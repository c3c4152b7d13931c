//! Reddit access for the trending service: subreddit resolution and a
//! multi-stage top-post fetcher behind one rate-limited request gate.

pub mod api;
pub mod auth;
pub mod cache;
pub mod fetcher;
pub mod metrics;
pub mod parsers;
pub mod rate_limiter;
pub mod resolver;
pub mod service;
pub mod sources;
pub mod transport;

pub use api::{RedditApiClient, RedditHosts};
pub use auth::{RedditCredentials, TokenManager};
pub use cache::{CacheKey, ResultCache};
pub use fetcher::PostFetcher;
pub use metrics::{ApiMetrics, MetricsCollector};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use resolver::Resolver;
pub use service::{TrendingReport, TrendingService};
pub use sources::PostSource;
pub use transport::{HttpTransport, ReqwestTransport, UpstreamRequest, UpstreamResponse};

#[cfg(test)]
mod tests;
