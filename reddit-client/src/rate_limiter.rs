use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum spacing between the start of two upstream calls.
    pub min_interval: Duration,
}

impl RateLimitConfig {
    pub fn reddit_public() -> Self {
        Self {
            min_interval: Duration::from_millis(1200), // keeps us under ~1 request/second
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::reddit_public()
    }
}

/// Global request gate in front of every Reddit call.
///
/// Callers queue on an async mutex, which hands out the lock in arrival
/// order, so slots are booked strictly FIFO. The lock is only held while a
/// slot is reserved; the caller then sleeps until it without blocking others.
/// A caller dropped mid-wait forfeits its slot and leaves the gate usable.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    next_slot: Mutex<Option<Instant>>,
    permits_granted: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            next_slot: Mutex::new(None),
            permits_granted: AtomicU64::new(0),
        }
    }

    pub async fn acquire_permit(&self) -> RateLimitPermit {
        let start_time = Instant::now();

        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next_slot.map_or(now, |next| next.max(now));
            *next_slot = Some(slot + self.config.min_interval);
            slot
        };

        if slot > Instant::now() {
            tracing::debug!("Request gate closed, waiting {:?}", slot - Instant::now());
            sleep_until(slot).await;
        }
        self.permits_granted.fetch_add(1, Ordering::Relaxed);

        RateLimitPermit {
            granted_at: slot,
            queue_wait_time: start_time.elapsed(),
        }
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        let next_slot = *self.next_slot.lock().await;
        let now = Instant::now();

        RateLimitStatus {
            min_interval: self.config.min_interval,
            permits_granted: self.permits_granted.load(Ordering::Relaxed),
            estimated_wait_time: next_slot
                .filter(|slot| *slot > now)
                .map(|slot| slot - now),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPermit {
    pub granted_at: Instant,
    pub queue_wait_time: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub min_interval: Duration,
    pub permits_granted: u64,
    pub estimated_wait_time: Option<Duration>,
}

impl RateLimitStatus {
    pub fn is_open(&self) -> bool {
        self.estimated_wait_time.is_none()
    }
}
