//! Token-bucket rate limiting for model usage.
//!
//! A bucket with no capacity is unlimited: every `consume` succeeds and the
//! token count never moves. A finite bucket is only ever changed by
//! [`TokenBucket::consume`] and [`TokenBucket::refill`].
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    max_tokens: Option<f64>,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket holding `max_tokens`, regenerating `refill_rate` tokens per second
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens: Some(max_tokens),
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            tokens: 0.0,
            max_tokens: None,
            refill_rate: 0.0,
            last_refill: Instant::now(),
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn max_tokens(&self) -> Option<f64> {
        self.max_tokens
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_tokens.is_none()
    }

    /// Take `count` tokens if they are all available. Nothing is taken otherwise.
    pub fn consume(&mut self, count: f64) -> bool {
        if self.max_tokens.is_none() {
            return true;
        }
        if count.is_nan() || count < 0.0 {
            return false;
        }
        if self.tokens >= count {
            self.tokens -= count;
            return true;
        }
        false
    }

    pub fn refill(&mut self) {
        self.refill_at(Instant::now());
    }

    /// Top up for the time elapsed between the last refill and `now`
    pub fn refill_at(&mut self, now: Instant) {
        let Some(max_tokens) = self.max_tokens else {
            return;
        };
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(max_tokens);
        self.last_refill = now;
    }

    /// How long until `desired` tokens (capped at capacity) are available.
    ///
    /// Returns `None` when the bucket can never get there, i.e. a finite bucket
    /// that does not refill.
    pub fn time_until_available(&self, desired: f64) -> Option<Duration> {
        let Some(max_tokens) = self.max_tokens else {
            return Some(Duration::ZERO);
        };
        if self.tokens >= max_tokens {
            return Some(Duration::ZERO);
        }
        let needed = desired.min(max_tokens) - self.tokens;
        if needed <= 0.0 {
            return Some(Duration::ZERO);
        }
        if self.refill_rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(needed / self.refill_rate))
    }
}

pub type SharedBucket = Arc<Mutex<TokenBucket>>;

/// Maps identifiers (typically one per agent or session) to buckets.
///
/// Each bucket sits behind its own lock so operations on one identifier are
/// serialized while different identifiers proceed independently.
#[derive(Default)]
pub struct TokenBucketManager {
    buckets: Mutex<HashMap<String, SharedBucket>>,
}

impl TokenBucketManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, identifier: &str, max_tokens: f64, refill_rate: f64) -> SharedBucket {
        let bucket = Arc::new(Mutex::new(TokenBucket::new(max_tokens, refill_rate)));
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(identifier.to_string(), bucket.clone());
        bucket
    }

    pub fn get_bucket(&self, identifier: &str) -> Option<SharedBucket> {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(identifier)
            .cloned()
    }

    /// Forget the bucket for `identifier`. Holders of the shared handle keep it.
    pub fn remove_bucket(&self, identifier: &str) -> Option<SharedBucket> {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(identifier)
    }

    /// Consume from the bucket for `identifier`; unknown identifiers fail
    pub fn consume(&self, identifier: &str, count: f64) -> bool {
        match self.get_bucket(identifier) {
            Some(bucket) => lock(&bucket).consume(count),
            None => false,
        }
    }

    pub fn refill_buckets(&self) {
        let buckets: Vec<SharedBucket> = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        for bucket in buckets {
            lock(&bucket).refill();
        }
    }

    pub fn time_until_available(&self, identifier: &str, desired: f64) -> Option<Duration> {
        self.get_bucket(identifier)
            .and_then(|bucket| lock(&bucket).time_until_available(desired))
    }
}

pub(crate) fn lock(bucket: &SharedBucket) -> std::sync::MutexGuard<'_, TokenBucket> {
    bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_without_refill() {
        let mut bucket = TokenBucket::new(10.0, 0.0);
        assert!(bucket.consume(5.0));
        assert!(bucket.consume(5.0));
        assert!(!bucket.consume(1.0));
        assert_eq!(bucket.tokens(), 0.0);
    }

    #[test]
    fn test_failed_consume_takes_nothing() {
        let mut bucket = TokenBucket::new(10.0, 0.0);
        assert!(bucket.consume(7.0));
        assert!(!bucket.consume(4.0));
        assert_eq!(bucket.tokens(), 3.0);
    }

    #[test]
    fn test_negative_consume_is_rejected() {
        let mut bucket = TokenBucket::new(10.0, 0.0);
        assert!(bucket.consume(4.0));
        assert!(!bucket.consume(-5.0));
        assert!(!bucket.consume(f64::NAN));
        assert_eq!(bucket.tokens(), 6.0);
    }

    #[test]
    fn test_refill_with_no_elapsed_time() {
        let mut bucket = TokenBucket::new(10.0, 0.0);
        bucket.consume(4.0);
        let last = bucket.last_refill;
        bucket.refill_at(last);
        assert_eq!(bucket.tokens(), 6.0);
    }

    #[test]
    fn test_refill_is_capped() {
        let mut bucket = TokenBucket::new(10.0, 2.0);
        bucket.consume(5.0);
        let start = bucket.last_refill;

        bucket.refill_at(start + Duration::from_secs(1));
        assert_eq!(bucket.tokens(), 7.0);

        bucket.refill_at(start + Duration::from_secs(100));
        assert_eq!(bucket.tokens(), 10.0);
    }

    #[test]
    fn test_unlimited_bucket() {
        let mut bucket = TokenBucket::unlimited();
        assert!(bucket.consume(1.0));
        assert!(bucket.consume(1_000_000.0));
        bucket.refill();
        assert_eq!(bucket.tokens(), 0.0);
        assert_eq!(bucket.time_until_available(50.0), Some(Duration::ZERO));
    }

    #[test]
    fn test_time_until_available() {
        let mut bucket = TokenBucket::new(10.0, 2.0);
        assert_eq!(bucket.time_until_available(5.0), Some(Duration::ZERO));

        bucket.consume(10.0);
        assert_eq!(bucket.time_until_available(4.0), Some(Duration::from_secs(2)));
        // capped at capacity
        assert_eq!(bucket.time_until_available(40.0), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_time_until_available_never_refills() {
        let mut bucket = TokenBucket::new(10.0, 0.0);
        bucket.consume(10.0);
        assert_eq!(bucket.time_until_available(1.0), None);
    }

    #[test]
    fn test_manager() {
        let manager = TokenBucketManager::new();
        manager.create_bucket("alice", 3.0, 0.0);
        manager.create_bucket("bob", 1.0, 0.0);

        assert!(manager.consume("alice", 3.0));
        assert!(!manager.consume("alice", 1.0));
        assert!(manager.consume("bob", 1.0));
        assert!(!manager.consume("carol", 1.0));

        manager.refill_buckets();
        assert_eq!(manager.time_until_available("alice", 1.0), None);
        assert!(manager.time_until_available("carol", 1.0).is_none());
    }

    #[test]
    fn test_manager_shares_bucket() {
        let manager = TokenBucketManager::new();
        let bucket = manager.create_bucket("session", 2.0, 0.0);
        assert!(lock(&bucket).consume(2.0));
        assert!(!manager.consume("session", 1.0));
    }

    #[test]
    fn test_manager_remove_bucket() {
        let manager = TokenBucketManager::new();
        manager.create_bucket("session", 2.0, 0.0);
        assert!(manager.remove_bucket("session").is_some());
        assert!(manager.get_bucket("session").is_none());
        assert!(!manager.consume("session", 1.0));
        assert!(manager.remove_bucket("session").is_none());
    }
}
