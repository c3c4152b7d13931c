use crate::metrics::{MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::transport::{HttpTransport, UpstreamRequest, UpstreamResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use trending_core::{RedditApiError, DEFAULT_RETRY_AFTER_SECS};

/// Base URLs for every Reddit surface the pipeline touches.
#[derive(Debug, Clone)]
pub struct RedditHosts {
    pub oauth: String,
    pub api: String,
    pub www: String,
    pub old: String,
    pub token_url: String,
}

impl Default for RedditHosts {
    fn default() -> Self {
        Self {
            oauth: "https://oauth.reddit.com".to_string(),
            api: "https://api.reddit.com".to_string(),
            www: "https://www.reddit.com".to_string(),
            old: "https://old.reddit.com".to_string(),
            token_url: "https://www.reddit.com/api/v1/access_token".to_string(),
        }
    }
}

/// Shared Reddit client: every call passes the request gate, is bounded by
/// the fetch timeout, and has 429s turned into `RateLimitExceeded`.
pub struct RedditApiClient {
    transport: Arc<dyn HttpTransport>,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    request_timeout: Duration,
    hosts: RedditHosts,
}

impl RedditApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, rate_config: RateLimitConfig) -> Self {
        Self {
            transport,
            rate_limiter: Arc::new(RateLimiter::new(rate_config)),
            metrics: Arc::new(MetricsCollector::new()),
            request_timeout: Duration::from_secs(10),
            hosts: RedditHosts::default(),
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_hosts(mut self, hosts: RedditHosts) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn hosts(&self) -> &RedditHosts {
        &self.hosts
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Sends one request and returns the response whatever its status,
    /// except for 429 and timeouts, which come back as errors.
    pub async fn send(
        &self,
        endpoint: &str,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse, RedditApiError> {
        let permit = self.rate_limiter.acquire_permit().await;
        debug!(
            "Acquired request gate for {} after {:?}",
            endpoint, permit.queue_wait_time
        );

        let start_time = Instant::now();
        debug!("Reddit request: {} {}", request.method, request.url);
        let outcome = tokio::time::timeout(self.request_timeout, self.transport.execute(request))
            .await
            .unwrap_or(Err(RedditApiError::RequestTimeout));

        let mut metrics = RequestMetrics {
            endpoint: endpoint.to_string(),
            status_code: None,
            response_time: start_time.elapsed(),
            success: false,
            rate_limited: false,
            timed_out: false,
        };

        let result = match outcome {
            Ok(response) if response.status == 429 => {
                let retry_after = parse_retry_after(response.header("retry-after"));
                warn!(
                    "Rate limited on {}, retry after {} seconds",
                    endpoint, retry_after
                );
                metrics.status_code = Some(429);
                metrics.rate_limited = true;
                Err(RedditApiError::RateLimitExceeded { retry_after })
            }
            Ok(response) => {
                metrics.status_code = Some(response.status);
                metrics.success = response.is_success();
                debug!("{} answered {}", endpoint, response.status);
                Ok(response)
            }
            Err(RedditApiError::RequestTimeout) => {
                warn!(
                    "Request to {} timed out after {:?}",
                    endpoint, self.request_timeout
                );
                metrics.timed_out = true;
                Err(RedditApiError::RequestTimeout)
            }
            Err(e) => {
                debug!("Transport failure for {}: {}", endpoint, e);
                Err(e)
            }
        };

        self.metrics.record_request(metrics).await;
        result
    }

    pub async fn get(&self, endpoint: &str, url: &str) -> Result<UpstreamResponse, RedditApiError> {
        self.send(endpoint, UpstreamRequest::get(url)).await
    }
}

fn parse_retry_after(value: Option<&str>) -> u64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.ceil() as u64)
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticTransport {
        response: UpstreamResponse,
        delay: Duration,
    }

    #[async_trait]
    impl HttpTransport for StaticTransport {
        async fn execute(
            &self,
            _request: UpstreamRequest,
        ) -> Result<UpstreamResponse, RedditApiError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.response.clone())
        }
    }

    fn client(response: UpstreamResponse, delay: Duration) -> RedditApiClient {
        RedditApiClient::new(
            Arc::new(StaticTransport { response, delay }),
            RateLimitConfig::reddit_public(),
        )
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("45")), 45);
        assert_eq!(parse_retry_after(Some(" 2.5 ")), 3);
        assert_eq!(parse_retry_after(Some("soon")), 30);
        assert_eq!(parse_retry_after(None), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_response_becomes_error() {
        let api = client(
            UpstreamResponse::new(429, "").with_header("Retry-After", "45"),
            Duration::ZERO,
        );

        let result = api.get("www.top.json", "https://www.reddit.com/r/rust/top.json").await;
        assert_eq!(
            result.unwrap_err(),
            RedditApiError::RateLimitExceeded { retry_after: 45 }
        );

        let metrics = api.metrics().get_metrics().await;
        assert_eq!(metrics.rate_limited_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_times_out() {
        let api = client(UpstreamResponse::new(200, "{}"), Duration::from_secs(11));

        let result = api.get("www.about", "https://www.reddit.com/r/rust/about.json").await;
        assert_eq!(result.unwrap_err(), RedditApiError::RequestTimeout);

        let metrics = api.metrics().get_metrics().await;
        assert_eq!(metrics.timed_out_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_success_status_is_returned() {
        let api = client(UpstreamResponse::new(404, "nope"), Duration::ZERO);

        let response = api
            .get("www.page", "https://www.reddit.com/r/nope/")
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.text(), "nope");
    }
}
