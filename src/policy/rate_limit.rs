//! Token-bucket rate limiting keyed by client identity.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Request;

use crate::policy::{ClientIdentity, DenyReason, Policy, PolicyError, Verdict};

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_refill)
    }
}

/// Per-rule rate limiter: up to `rate` tokens, refilled continuously at
/// `rate / per` tokens per second, one bucket per client key.
///
/// The bucket map sits behind a reader-writer lock; the hot path for a key
/// that already exists takes only the read lock, with the bucket itself
/// behind its own short mutex. The periodic sweep is the only writer that
/// removes entries.
pub struct RateLimit {
    rate: u32,
    per: Duration,
    buckets: RwLock<HashMap<String, Mutex<TokenBucket>>>,
}

impl RateLimit {
    pub fn new(rate: u32, per: Duration) -> Self {
        Self {
            rate,
            per,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    fn capacity(&self) -> f64 {
        f64::from(self.rate)
    }

    fn refill_rate(&self) -> f64 {
        f64::from(self.rate) / self.per.as_secs_f64()
    }

    /// Whether a request under `key` is admitted right now.
    pub fn allow(&self, key: &str) -> bool {
        {
            let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
            if let Some(bucket) = buckets.get(key) {
                let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
                return bucket.try_acquire(self.capacity(), self.refill_rate());
            }
        }

        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(TokenBucket::new(self.capacity())));
        let allowed = bucket
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_acquire(self.capacity(), self.refill_rate());
        allowed
    }

    /// Evict buckets unused for `2 × per`. Called by the periodic sweep.
    pub fn sweep(&self) {
        let cutoff = self.per * 2;
        let now = Instant::now();
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets.retain(|_, bucket| {
            bucket
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .idle_for(now)
                <= cutoff
        });
    }

    /// Tracked client keys, for sweep logging.
    pub fn tracked_keys(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Policy for RateLimit {
    fn kind(&self) -> &'static str {
        "rate_limit"
    }

    fn apply_request(
        &self,
        _request: &mut Request<Body>,
        client: &ClientIdentity,
    ) -> Result<Verdict, PolicyError> {
        if self.allow(client.raw()) {
            Ok(Verdict::Allow)
        } else {
            tracing::debug!(client = %client.raw(), "Rate limit exceeded");
            Ok(Verdict::Deny(DenyReason::RateLimitExceeded))
        }
    }
}

impl std::fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimit")
            .field("rate", &self.rate)
            .field("per", &self.per)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_burst_up_to_rate_then_denies() {
        let limiter = RateLimit::new(2, Duration::from_secs(1));

        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[test]
    fn keys_have_independent_buckets() {
        let limiter = RateLimit::new(1, Duration::from_secs(1));

        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
    }

    #[test]
    fn refills_continuously() {
        let limiter = RateLimit::new(5, Duration::from_millis(100));

        for _ in 0..5 {
            assert!(limiter.allow("c"));
        }
        assert!(!limiter.allow("c"));

        // 100ms refills the full bucket of 5.
        std::thread::sleep(Duration::from_millis(120));
        for _ in 0..5 {
            assert!(limiter.allow("c"));
        }
        assert!(!limiter.allow("c"));
    }

    #[test]
    fn sweep_evicts_idle_buckets_only() {
        let limiter = RateLimit::new(1, Duration::from_millis(10));

        assert!(limiter.allow("idle"));
        std::thread::sleep(Duration::from_millis(30));
        let _ = limiter.allow("fresh");
        limiter.sweep();

        assert_eq!(limiter.tracked_keys(), 1);
        // The fresh key still has its consumed bucket.
        assert!(!limiter.allow("fresh"));
    }
}
