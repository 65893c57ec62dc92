//! Request throttling
//!
//! Token buckets with continuous refill, one per key. Throttled requests are
//! rejected before they reach a handler, so they leave no state behind.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::api::error::ApiError;
use crate::api::owner::OwnerId;

const WINDOW: Duration = Duration::from_secs(60);

/// Buckets kept before idle ones are dropped
const MAX_TRACKED_KEYS: usize = 10_000;

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    tokens_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, window: Duration, now: Instant) -> Self {
        Self {
            capacity: f64::from(capacity),
            tokens: f64::from(capacity),
            tokens_per_sec: f64::from(capacity) / window.as_secs_f64(),
            last_refill: now,
        }
    }

    /// Takes one token, or returns how long until one is available
    fn try_consume(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.tokens_per_sec))
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.tokens_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn is_full(&self) -> bool {
        self.tokens >= self.capacity
    }
}

/// Rate limiter keeping one bucket per key
#[derive(Debug)]
pub struct KeyedRateLimiter<K> {
    per_window: u32,
    window: Duration,
    buckets: Mutex<HashMap<K, TokenBucket>>,
}

impl<K: Hash + Eq> KeyedRateLimiter<K> {
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, WINDOW)
    }

    pub fn new(per_window: u32, window: Duration) -> Self {
        Self {
            per_window,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Records one request for `key`
    ///
    /// # Returns
    /// `Err(seconds)` with the suggested wait when the key is over its limit
    pub fn check(&self, key: K) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: K, now: Instant) -> Result<(), u64> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        if buckets.len() >= MAX_TRACKED_KEYS {
            buckets.retain(|_, bucket| {
                bucket.refill(now);
                !bucket.is_full()
            });
        }

        buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(self.per_window, self.window, now))
            .try_consume(now)
            .map_err(|wait| (wait.as_millis() as u64).div_ceil(1000).max(1))
    }
}

/// Limits shared by the throttling middleware
#[derive(Debug)]
pub struct RateLimits {
    /// Submissions per owner
    pub submissions: KeyedRateLimiter<i64>,
    /// Requests per client address
    pub requests: KeyedRateLimiter<String>,
}

impl RateLimits {
    pub fn per_minute(submissions: u32, requests: u32) -> Self {
        Self {
            submissions: KeyedRateLimiter::per_minute(submissions),
            requests: KeyedRateLimiter::per_minute(requests),
        }
    }
}

/// Throttles every API request by client address
pub async fn limit_requests(
    State(limits): State<Arc<RateLimits>>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_address(&req);

    if let Err(retry_after) = limits.requests.check(client.clone()) {
        tracing::warn!("Request rate limit exceeded for {}", client);
        return ApiError::TooManyRequests { retry_after }.into_response();
    }

    next.run(req).await
}

/// Throttles job submissions by owner
///
/// Requests without a valid owner pass through and are rejected by the
/// handler's owner extractor instead.
pub async fn limit_submissions(
    State(limits): State<Arc<RateLimits>>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() == Method::POST && req.uri().path() == "/api/jobs" {
        if let Some(OwnerId(owner_id)) = OwnerId::from_headers(req.headers()) {
            if let Err(retry_after) = limits.submissions.check(owner_id) {
                tracing::warn!("Submission rate limit exceeded for owner {}", owner_id);
                return ApiError::TooManyRequests { retry_after }.into_response();
            }
        }
    }

    next.run(req).await
}

fn client_address(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_allows_capacity_then_throttles() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(3, Duration::from_secs(60), now);

        for _ in 0..3 {
            assert!(bucket.try_consume(now).is_ok());
        }
        let wait = bucket.try_consume(now).unwrap_err();
        assert!((wait.as_secs_f64() - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2, Duration::from_secs(60), start);
        assert!(bucket.try_consume(start).is_ok());
        assert!(bucket.try_consume(start).is_ok());
        assert!(bucket.try_consume(start).is_err());

        let later = start + Duration::from_secs(31);
        assert!(bucket.try_consume(later).is_ok());
        assert!(bucket.try_consume(later).is_err());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = KeyedRateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at(1, now).is_ok());
        assert_eq!(limiter.check_at(1, now), Err(60));
        assert!(limiter.check_at(2, now).is_ok());
    }
}
