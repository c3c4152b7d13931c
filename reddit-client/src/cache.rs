//! Time-bounded result cache with in-flight request coalescing.
//!
//! Only successful results are stored. Concurrent callers for the same key
//! share a single producer run and all observe its outcome, error included.

use crate::metrics::MetricsCollector;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use trending_core::{Post, RedditApiError, Timeframe};

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Vec<Post>>, RedditApiError>>>;

/// `canonical_name_lowercase:timeframe`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    subreddit: String,
    timeframe: Timeframe,
}

impl CacheKey {
    pub fn new(canonical: &str, timeframe: &Timeframe) -> Self {
        Self {
            subreddit: canonical.to_lowercase(),
            timeframe: timeframe.clone(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.timeframe.cache_ttl()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subreddit, self.timeframe.as_str())
    }
}

struct CacheEntry {
    posts: Arc<Vec<Post>>,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, SharedFetch>,
}

#[derive(Clone, Default)]
pub struct ResultCache {
    state: Arc<Mutex<CacheState>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns a live entry, joins an in-flight fetch for the key, or starts
    /// `producer`. The producer runs to completion even if every caller is
    /// dropped.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey,
        producer: F,
    ) -> Result<Arc<Vec<Post>>, RedditApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Post>, RedditApiError>> + Send + 'static,
    {
        let fetch = {
            let mut state = self.state.lock().await;

            let cached = state
                .entries
                .get(&key)
                .map(|entry| (entry.posts.clone(), entry.expires_at > Instant::now()));
            match cached {
                Some((posts, true)) => {
                    debug!("Cache hit for {}", key);
                    drop(state);
                    self.record_lookup(true).await;
                    return Ok(posts);
                }
                Some((_, false)) => {
                    debug!("Cache entry for {} expired", key);
                    state.entries.remove(&key);
                }
                None => {}
            }

            if let Some(pending) = state.in_flight.get(&key) {
                debug!("Joining in-flight fetch for {}", key);
                pending.clone()
            } else {
                debug!("Cache miss for {}, starting fetch", key);
                let fetch = self.start_fetch(key.clone(), producer());
                state.in_flight.insert(key, fetch.clone());
                fetch
            }
        };

        self.record_lookup(false).await;
        fetch.await
    }

    /// Runs `producer` on its own task so it settles, deregisters and stores
    /// its result whether or not any caller is still waiting.
    fn start_fetch<Fut>(&self, key: CacheKey, producer: Fut) -> SharedFetch
    where
        Fut: Future<Output = Result<Vec<Post>, RedditApiError>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let key = task_key;
            let result = producer.await.map(Arc::new);

            let mut state = state.lock().await;
            state.in_flight.remove(&key);
            if let Ok(posts) = &result {
                let ttl = key.ttl();
                debug!("Caching {} posts for {} ({:?})", posts.len(), key, ttl);
                state.entries.insert(
                    key,
                    CacheEntry {
                        posts: posts.clone(),
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                warn!("Fetch task for {} did not complete: {}", key, e);
                Err(RedditApiError::Transport {
                    message: format!("fetch task failed: {}", e),
                })
            })
        }
        .boxed()
        .shared()
    }

    /// Number of stored entries, expired ones included until next lookup.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn record_lookup(&self, hit: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(hit).await;
        }
    }
}
