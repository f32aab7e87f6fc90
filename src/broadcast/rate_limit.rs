use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Send-rate budget: one global bucket for the whole process plus one
/// bucket per recipient. Defaults match the Bot API ceiling (25 msg/s
/// overall) and the usual per-chat anti-flood threshold (1 msg / 3 s).
#[derive(Clone, Debug)]
pub struct RateLimiterConfig {
    pub global_limit: u32,
    pub global_window: Duration,
    pub recipient_window: Duration,
    /// Per-recipient buckets are kept in an LRU cache of this size, so the
    /// map stays bounded no matter how many distinct users a broadcast
    /// reaches. An evicted entry just means that recipient gets a fresh
    /// (full) bucket next time.
    pub recipient_cache: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            global_limit: 25,
            global_window: Duration::from_secs(1),
            recipient_window: Duration::from_secs(3),
            recipient_cache: 65_536,
        }
    }
}

/// Continuously refilling token bucket.
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    fn consume(&mut self) {
        self.tokens -= 1.0;
    }

    fn time_until_token(&self) -> Duration {
        if self.has_token() {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_per_sec)
        }
    }
}

/// Dual-bucket admission control shared by every concurrently running
/// dispatcher. `acquire` is the single gate all outbound sends go through.
pub struct RateLimiter {
    global: Mutex<TokenBucket>,
    recipients: Mutex<LruCache<i64, Arc<Mutex<TokenBucket>>>>,
    recipient_refill_per_sec: f64,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let global_refill = config.global_limit as f64 / config.global_window.as_secs_f64();
        let cache_size =
            NonZeroUsize::new(config.recipient_cache.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            global: Mutex::new(TokenBucket::new(config.global_limit as f64, global_refill)),
            recipients: Mutex::new(LruCache::new(cache_size)),
            recipient_refill_per_sec: 1.0 / config.recipient_window.as_secs_f64(),
        }
    }

    async fn recipient_bucket(&self, recipient: i64) -> Arc<Mutex<TokenBucket>> {
        let mut cache = self.recipients.lock().await;
        if let Some(bucket) = cache.get(&recipient) {
            return Arc::clone(bucket);
        }
        let bucket = Arc::new(Mutex::new(TokenBucket::new(1.0, self.recipient_refill_per_sec)));
        cache.put(recipient, Arc::clone(&bucket));
        bucket
    }

    /// Suspends until both the global bucket and the recipient's bucket
    /// have a token, then consumes one from each atomically with respect
    /// to other acquirers. Never fails; worst case is a bounded wait.
    pub async fn acquire(&self, recipient: i64) {
        let bucket = self.recipient_bucket(recipient).await;
        loop {
            // Lock order is always global then recipient.
            let wait = {
                let mut global = self.global.lock().await;
                let mut per_user = bucket.lock().await;
                let now = Instant::now();
                global.refill(now);
                per_user.refill(now);
                if global.has_token() && per_user.has_token() {
                    global.consume();
                    per_user.consume();
                    return;
                }
                global.time_until_token().max(per_user.time_until_token())
            };
            sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}
