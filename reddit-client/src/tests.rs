#[cfg(test)]
mod tests {
    use crate::transport::{HttpTransport, UpstreamRequest, UpstreamResponse};
    use crate::TrendingService;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;
    use trending_core::{
        Accessibility, Provenance, RedditApiError, SourceProbe, Timeframe, TrendingConfig,
    };

    #[derive(Clone)]
    struct Route {
        response: UpstreamResponse,
        delay: Duration,
    }

    #[derive(Debug, Clone)]
    struct RecordedCall {
        path: String,
        url: String,
        headers: Vec<(String, String)>,
        at: Instant,
    }

    /// Routes on the URL without its query string; anything unrouted is a 404.
    #[derive(Default)]
    struct FakeTransport {
        routes: Mutex<HashMap<String, Route>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl FakeTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn route(&self, url: &str, response: UpstreamResponse) {
            self.route_delayed(url, response, Duration::ZERO);
        }

        fn route_delayed(&self, url: &str, response: UpstreamResponse, delay: Duration) {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Route { response, delay });
        }

        fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        fn paths(&self) -> Vec<String> {
            self.calls().into_iter().map(|call| call.path).collect()
        }

        fn count(&self, url: &str) -> usize {
            self.paths().iter().filter(|path| path.as_str() == url).count()
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn execute(
            &self,
            request: UpstreamRequest,
        ) -> Result<UpstreamResponse, RedditApiError> {
            let path = request
                .url
                .split('?')
                .next()
                .unwrap_or_default()
                .to_string();
            self.calls.lock().unwrap().push(RecordedCall {
                path: path.clone(),
                url: request.url.clone(),
                headers: request.headers.clone(),
                at: Instant::now(),
            });

            let route = self.routes.lock().unwrap().get(&path).cloned();
            match route {
                Some(route) => {
                    tokio::time::sleep(route.delay).await;
                    Ok(route.response)
                }
                None => Ok(UpstreamResponse::new(404, "")),
            }
        }
    }

    fn service(transport: &Arc<FakeTransport>) -> TrendingService {
        TrendingService::with_transport(&TrendingConfig::default(), transport.clone()).unwrap()
    }

    fn listing(count: usize) -> UpstreamResponse {
        listing_of((0..count).map(|i| format!("Post number {}", i)).collect())
    }

    fn listing_of(titles: Vec<String>) -> UpstreamResponse {
        let children: Vec<_> = titles
            .into_iter()
            .enumerate()
            .map(|(i, title)| {
                json!({
                    "kind": "t3",
                    "data": {
                        "id": format!("p{}", i),
                        "title": title,
                        "author": "ferris",
                        "url": format!("https://example.com/{}", i),
                        "permalink": format!("/r/rust/comments/p{}/post/", i),
                        "score": 1000 - i as i64,
                        "num_comments": i,
                        "created_utc": 1_700_000_000.0
                    }
                })
            })
            .collect();
        let body = json!({ "kind": "Listing", "data": { "children": children } });
        UpstreamResponse::new(200, body.to_string())
            .with_header("Content-Type", "application/json")
    }

    fn about(name: &str, subreddit_type: &str) -> UpstreamResponse {
        let body = json!({
            "kind": "t5",
            "data": { "display_name": name, "subreddit_type": subreddit_type }
        });
        UpstreamResponse::new(200, body.to_string())
    }

    const API_TOP: &str = "https://api.reddit.com/r/rust/top.json";
    const WWW_TOP: &str = "https://www.reddit.com/r/rust/top.json";
    const OLD_TOP: &str = "https://old.reddit.com/r/rust/top.json";
    const FEED_TOP: &str = "https://www.reddit.com/r/rust/top/.rss";
    const HTML_TOP: &str = "https://old.reddit.com/r/rust/top/";
    const OAUTH_TOP: &str = "https://oauth.reddit.com/r/rust/top";
    const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

    fn token_response(token: &str) -> UpstreamResponse {
        let body = json!({
            "access_token": token,
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "read"
        });
        UpstreamResponse::new(200, body.to_string())
            .with_header("Content-Type", "application/json")
    }

    fn oauth_service(transport: &Arc<FakeTransport>, client_secret: &str) -> TrendingService {
        let config = TrendingConfig {
            client_id: Some("id".to_string()),
            client_secret: Some(client_secret.to_string()),
            ..TrendingConfig::default()
        };
        TrendingService::with_transport(&config, transport.clone()).unwrap()
    }

    fn bearer(call: &RecordedCall) -> Option<&str> {
        call.headers
            .iter()
            .find(|(name, _)| name == "Authorization")
            .map(|(_, value)| value.as_str())
    }

    #[tokio::test(start_paused = true)]
    async fn test_public_subreddit_resolves_from_api_about() {
        let transport = FakeTransport::new();
        transport.route(
            "https://api.reddit.com/r/cooking/about.json",
            UpstreamResponse::new(
                200,
                r#"{"data":{"display_name":"Cooking","subreddit_type":"public"}}"#,
            ),
        );

        let result = service(&transport).resolve("cooking").await.unwrap();
        assert!(result.exists);
        assert_eq!(result.canonical, "Cooking");
        assert_eq!(result.accessibility, Accessibility::Public);
        assert_eq!(result.source_probe, SourceProbe::ApiAbout);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_www_about_used_when_api_host_fails() {
        let transport = FakeTransport::new();
        transport.route(
            "https://api.reddit.com/r/askhistorians/about.json",
            UpstreamResponse::new(500, "oops"),
        );
        transport.route(
            "https://www.reddit.com/r/askhistorians/about.json",
            about("AskHistorians", "restricted"),
        );

        let result = service(&transport).resolve("askhistorians").await.unwrap();
        assert_eq!(result.canonical, "AskHistorians");
        assert_eq!(result.accessibility, Accessibility::Public);
        assert_eq!(result.source_probe, SourceProbe::WwwAbout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_listing_on_about_is_not_a_hit() {
        let transport = FakeTransport::new();
        transport.route(
            "https://api.reddit.com/r/typo/about.json",
            UpstreamResponse::new(200, r#"{"kind":"Listing","data":{"children":[]}}"#),
        );

        let result = service(&transport).resolve("typo").await.unwrap();
        assert!(!result.exists);
        assert_eq!(result.accessibility, Accessibility::NotFound);
        assert_eq!(
            transport.paths(),
            vec![
                "https://api.reddit.com/r/typo/about.json",
                "https://www.reddit.com/r/typo/about.json",
                "https://www.reddit.com/r/typo/",
                "https://old.reddit.com/r/typo/",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_mirrors_missing_means_not_found_and_nothing_fetched() {
        let transport = FakeTransport::new();
        let service = service(&transport);

        let result = service.resolve("doesnotexist123").await.unwrap();
        assert!(!result.exists);
        assert_eq!(result.accessibility, Accessibility::NotFound);
        assert_eq!(result.source_probe, SourceProbe::Html);

        let report = service.trending("doesnotexist123", &Timeframe::Day).await;
        assert!(matches!(
            report,
            Err(RedditApiError::SubredditNotFound { .. })
        ));
        assert!(transport.paths().iter().all(|path| !path.contains("/top")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_name_rejected_without_requests() {
        let transport = FakeTransport::new();
        let service = service(&transport);

        for raw in ["", "   ", "/r/", "r/"] {
            let result = service.resolve(raw).await.unwrap();
            assert!(!result.exists);
            assert_eq!(result.accessibility, Accessibility::NotFound);
            assert_eq!(result.source_probe, SourceProbe::Input);
        }
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gated_community_is_advisory() {
        let transport = FakeTransport::new();
        transport.route(
            "https://api.reddit.com/r/secretclub/about.json",
            UpstreamResponse::new(403, r#"{"reason":"private"}"#),
        );
        transport.route(
            "https://www.reddit.com/r/secretclub/",
            UpstreamResponse::new(
                403,
                "<html><title>r/SecretClub</title><h1>This community is private</h1></html>",
            ),
        );

        let result = service(&transport).resolve(" r/secretclub ").await.unwrap();
        assert!(result.exists);
        assert_eq!(result.canonical, "SecretClub");
        assert_eq!(result.accessibility, Accessibility::GatedMaybe);
        assert_eq!(result.source_probe, SourceProbe::Html);
        assert_eq!(
            transport.count("https://www.reddit.com/r/secretclub/about.json"),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_json_stage_with_posts_wins() {
        let transport = FakeTransport::new();
        transport.route(API_TOP, listing(12));

        let posts = service(&transport)
            .fetch_top("rust", &Timeframe::Day)
            .await
            .unwrap();
        assert_eq!(posts.len(), 5);
        assert_eq!(posts[0].title, "Post number 0");
        assert_eq!(posts[0].score, Some(1000));
        assert_eq!(posts[0].author.as_deref(), Some("ferris"));
        assert_eq!(
            posts[0].permalink.as_deref(),
            Some("https://www.reddit.com/r/rust/comments/p0/post/")
        );
        assert!(posts.iter().all(|p| p.provenance == Provenance::Json));
        assert_eq!(transport.paths(), vec![API_TOP]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_json_falls_through_to_feed() {
        let transport = FakeTransport::new();
        let empty = UpstreamResponse::new(200, r#"{"kind":"Listing","data":{"children":[]}}"#);
        transport.route(API_TOP, empty.clone());
        transport.route(WWW_TOP, empty.clone());
        transport.route(OLD_TOP, empty);
        transport.route(
            FEED_TOP,
            UpstreamResponse::new(
                200,
                r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>top scoring links : rust</title>
  <entry><title>One</title><link href="https://www.reddit.com/r/rust/comments/1/one/"/><id>t3_1</id><updated>2024-01-01T00:00:00+00:00</updated></entry>
  <entry><title>Two</title><link href="https://www.reddit.com/r/rust/comments/2/two/"/><id>t3_2</id><updated>2024-01-01T00:00:00+00:00</updated></entry>
  <entry><title>Three</title><link href="https://www.reddit.com/r/rust/comments/3/three/"/><id>t3_3</id><updated>2024-01-01T00:00:00+00:00</updated></entry>
</feed>"#,
            ),
        );

        let posts = service(&transport)
            .fetch_top("rust", &Timeframe::Day)
            .await
            .unwrap();
        assert_eq!(posts.len(), 3);
        for post in &posts {
            assert_eq!(post.provenance, Provenance::Rss);
            assert!(post.score.is_none());
            assert!(post.author.is_none());
            assert!(post.num_comments.is_none());
            assert!(post.created_at.is_none());
        }
        assert_eq!(transport.count(HTML_TOP), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stages_run_in_order_then_unavailable() {
        let transport = FakeTransport::new();
        for url in [API_TOP, WWW_TOP, OLD_TOP, FEED_TOP, HTML_TOP] {
            transport.route(url, UpstreamResponse::new(503, "down"));
        }
        let service = service(&transport);

        assert_eq!(
            service.stage_names(),
            vec![
                "oauth.top",
                "api.top.json",
                "www.top.json",
                "old.top.json",
                "www.top.rss",
                "old.top.html"
            ]
        );

        let result = service.fetch_top("rust", &Timeframe::Day).await;
        assert_eq!(
            result.unwrap_err(),
            RedditApiError::Unavailable {
                subreddit: "rust".to_string()
            }
        );
        // no credentials, so the OAuth stage never touches the network
        assert_eq!(
            transport.paths(),
            vec![API_TOP, WWW_TOP, OLD_TOP, FEED_TOP, HTML_TOP]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_stops_chain_with_retry_after() {
        let transport = FakeTransport::new();
        transport.route(
            API_TOP,
            UpstreamResponse::new(429, "").with_header("Retry-After", "45"),
        );
        transport.route(WWW_TOP, listing(3));

        let result = service(&transport)
            .fetch_top("rust", &Timeframe::Day)
            .await;
        assert_eq!(
            result.unwrap_err(),
            RedditApiError::RateLimitExceeded { retry_after: 45 }
        );
        assert_eq!(transport.paths(), vec![API_TOP]);
    }

    // Current behaviour: a stage that times out ends the chain, even though
    // the next stage would have answered.
    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_chain() {
        let transport = FakeTransport::new();
        transport.route_delayed(API_TOP, listing(3), Duration::from_secs(11));
        transport.route(WWW_TOP, listing(3));

        let result = service(&transport)
            .fetch_top("rust", &Timeframe::Day)
            .await;
        assert_eq!(result.unwrap_err(), RedditApiError::RequestTimeout);
        assert_eq!(transport.count(WWW_TOP), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_makes_no_network_call() {
        let transport = FakeTransport::new();
        transport.route(API_TOP, listing(5));
        let service = service(&transport);

        let first = service.fetch_top("rust", &Timeframe::Day).await.unwrap();
        let calls_after_first = transport.calls().len();
        let second = service.fetch_top("Rust", &Timeframe::Day).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls().len(), calls_after_first);

        let metrics = service.metrics().await;
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_day_results_refetched_after_five_minutes() {
        let transport = FakeTransport::new();
        transport.route(API_TOP, listing(5));
        let service = service(&transport);

        service.fetch_top("rust", &Timeframe::Day).await.unwrap();
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        service.fetch_top("rust", &Timeframe::Day).await.unwrap();
        assert_eq!(transport.count(API_TOP), 1);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        service.fetch_top("rust", &Timeframe::Day).await.unwrap();
        assert_eq!(transport.count(API_TOP), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_week_results_cached_for_an_hour() {
        let transport = FakeTransport::new();
        transport.route(API_TOP, listing(5));
        let service = service(&transport);

        service.fetch_top("rust", &Timeframe::Week).await.unwrap();
        tokio::time::advance(Duration::from_secs(59 * 60)).await;
        service.fetch_top("rust", &Timeframe::Week).await.unwrap();
        assert_eq!(transport.count(API_TOP), 1);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        service.fetch_top("rust", &Timeframe::Week).await.unwrap();
        assert_eq!(transport.count(API_TOP), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_run_one_chain() {
        let transport = FakeTransport::new();
        transport.route_delayed(API_TOP, listing(5), Duration::from_millis(500));
        let service = service(&transport);

        let lookups = (0..6).map(|_| service.fetch_top("rust", &Timeframe::Day));
        let results = futures::future::join_all(lookups).await;

        assert_eq!(transport.count(API_TOP), 1);
        let first = results[0].as_ref().unwrap();
        assert!(results.iter().all(|r| r.as_ref().unwrap() == first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_spaced_by_gate_interval() {
        let transport = FakeTransport::new();
        let service = service(&transport);

        // every stage 404s, so the whole chain hits the network
        let _ = service.fetch_top("rust", &Timeframe::Day).await;
        let _ = service.resolve("rust").await;

        let calls = transport.calls();
        assert!(calls.len() >= 8);
        for pair in calls.windows(2) {
            let gap = pair[1].at.duration_since(pair[0].at);
            assert!(gap >= Duration::from_millis(1200), "gap was {:?}", gap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_oauth_stage_used_with_credentials() {
        let transport = FakeTransport::new();
        transport.route(TOKEN_URL, token_response("tok-1"));
        transport.route(OAUTH_TOP, listing(25));
        let service = oauth_service(&transport, "secret");

        let posts = service.fetch_top("rust", &Timeframe::Day).await.unwrap();
        assert_eq!(posts.len(), 5);
        assert!(posts.iter().all(|p| p.provenance == Provenance::OauthJson));

        // second timeframe misses the cache but reuses the token
        service.fetch_top("rust", &Timeframe::Month).await.unwrap();
        assert_eq!(transport.count(TOKEN_URL), 1);

        // 3600s tokens are only trusted for 3540s
        transport.route(TOKEN_URL, token_response("tok-2"));
        tokio::time::advance(Duration::from_secs(3541)).await;
        service.fetch_top("rust", &Timeframe::Week).await.unwrap();
        assert_eq!(transport.count(TOKEN_URL), 2);

        let listing_calls: Vec<_> = transport
            .calls()
            .into_iter()
            .filter(|call| call.path == OAUTH_TOP)
            .collect();
        let tokens: Vec<_> = listing_calls.iter().map(bearer).collect();
        assert_eq!(
            tokens,
            vec![Some("Bearer tok-1"), Some("Bearer tok-1"), Some("Bearer tok-2")]
        );
        assert!(listing_calls.iter().all(|call| call.url.contains("raw_json=1")));
        assert_eq!(transport.count(API_TOP), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_share_one_token_exchange() {
        let transport = FakeTransport::new();
        transport.route_delayed(TOKEN_URL, token_response("tok-1"), Duration::from_millis(300));
        transport.route(OAUTH_TOP, listing(8));
        let service = oauth_service(&transport, "secret");

        let timeframes = [Timeframe::Day, Timeframe::Week];
        let results = futures::future::join_all(
            timeframes
                .iter()
                .map(|timeframe| service.fetch_top("rust", timeframe)),
        )
        .await;

        assert!(results.iter().all(|r| r.as_ref().unwrap().len() == 5));
        assert_eq!(transport.count(TOKEN_URL), 1);
        assert_eq!(transport.count(OAUTH_TOP), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_credentials_fall_back_to_public_json() {
        let transport = FakeTransport::new();
        transport.route(
            TOKEN_URL,
            UpstreamResponse::new(401, r#"{"error":"invalid_client"}"#)
                .with_header("Content-Type", "application/json"),
        );
        transport.route(API_TOP, listing(3));
        let service = oauth_service(&transport, "wrong");

        let posts = service.fetch_top("rust", &Timeframe::Day).await.unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].provenance, Provenance::Json);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trending_uses_canonical_name() {
        let transport = FakeTransport::new();
        transport.route(
            "https://api.reddit.com/r/rust/about.json",
            about("rust", "public"),
        );
        transport.route(API_TOP, listing(2));

        let report = service(&transport)
            .trending("/r/rust/", &Timeframe::Day)
            .await
            .unwrap();
        assert_eq!(report.subreddit.canonical, "rust");
        assert_eq!(report.timeframe, Timeframe::Day);
        assert_eq!(report.posts.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escaped_titles_read_the_same_from_every_stage() {
        let title = "Tips & tricks";
        let mut seen = Vec::new();

        let transport = FakeTransport::new();
        transport.route(API_TOP, listing_of(vec![title.to_string()]));
        let posts = service(&transport)
            .fetch_top("rust", &Timeframe::Day)
            .await
            .unwrap();
        // the public JSON surfaces only send unescaped text when asked to
        let calls = transport.calls();
        assert_eq!(calls[0].path, API_TOP);
        assert!(calls[0].url.contains("raw_json=1"));
        seen.push((posts[0].provenance, posts[0].title.clone()));

        let transport = FakeTransport::new();
        transport.route(TOKEN_URL, token_response("tok-1"));
        transport.route(OAUTH_TOP, listing_of(vec![title.to_string()]));
        let posts = oauth_service(&transport, "secret")
            .fetch_top("rust", &Timeframe::Day)
            .await
            .unwrap();
        seen.push((posts[0].provenance, posts[0].title.clone()));

        let transport = FakeTransport::new();
        transport.route(
            FEED_TOP,
            UpstreamResponse::new(
                200,
                r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>top scoring links : rust</title>
  <entry><title>Tips &amp; tricks</title><link href="https://www.reddit.com/r/rust/comments/t1/tips/"/><id>t3_t1</id><updated>2024-01-01T00:00:00+00:00</updated></entry>
</feed>"#,
            ),
        );
        let posts = service(&transport)
            .fetch_top("rust", &Timeframe::Day)
            .await
            .unwrap();
        seen.push((posts[0].provenance, posts[0].title.clone()));

        let transport = FakeTransport::new();
        transport.route(
            HTML_TOP,
            UpstreamResponse::new(
                200,
                r#"<div class="sitetable linklisting" id="siteTable">
<div class=" thing id-t3_t1 odd link " data-fullname="t3_t1" data-url="https://example.com/tips" data-permalink="/r/rust/comments/t1/tips/" data-score="10" data-promoted="false">
  <p class="title"><a class="title may-blank outbound" href="https://example.com/tips">Tips &amp; tricks</a></p>
</div>
</div>"#,
            ),
        );
        let posts = service(&transport)
            .fetch_top("rust", &Timeframe::Day)
            .await
            .unwrap();
        seen.push((posts[0].provenance, posts[0].title.clone()));

        assert_eq!(
            seen.iter().map(|(provenance, _)| *provenance).collect::<Vec<_>>(),
            vec![
                Provenance::Json,
                Provenance::OauthJson,
                Provenance::Rss,
                Provenance::Html
            ]
        );
        assert!(seen.iter().all(|(_, seen_title)| seen_title == title));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fetch_does_not_stall_other_requests() {
        let transport = FakeTransport::new();
        transport.route(API_TOP, listing(3));
        transport.route(
            "https://api.reddit.com/r/cooking/about.json",
            about("Cooking", "public"),
        );
        let service = Arc::new(service(&transport));

        service.resolve("warmup").await.unwrap();

        // queued at the gate behind the warmup requests when aborted
        let caller = {
            let service = service.clone();
            tokio::spawn(async move { service.fetch_top("rust", &Timeframe::Day).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        let cooking = tokio::time::timeout(Duration::from_secs(600), service.resolve("cooking"))
            .await
            .expect("resolve should not wait on the abandoned fetch")
            .unwrap();
        assert!(cooking.exists);
        assert_eq!(cooking.canonical, "Cooking");

        // the abandoned chain still ran and its result was cached
        let posts = service.fetch_top("rust", &Timeframe::Day).await.unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(transport.count(API_TOP), 1);
    }
}
