//! # Rate limiting
//!
//! Token-bucket limiter shared by every request to one upstream host, plus an
//! adaptive variant that backs off hard on failure and recovers slowly on
//! success.
//!
//! ## Adaptation
//!
//! - `fail()` multiplies the rate by `1 - FAILURE_DECREASE`, never dropping below
//!   [`MIN_RATE`].
//! - `succeed()` multiplies the rate by `1 + SUCCESS_INCREASE`, never exceeding the
//!   starting rate plus the configured `max_increase`.
//!
//! Rate changes apply to future refills only; tokens already in the bucket are
//! kept. Configured rates below [`MIN_RATE`] are raised to it.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Fraction of the current rate removed on each failure
pub const FAILURE_DECREASE: f64 = 0.8;
/// Fraction of the current rate added on each success
pub const SUCCESS_INCREASE: f64 = 0.2;
/// Floor for the adaptive rate, in requests per second
pub const MIN_RATE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Requests per second
    pub rate: f64,
    pub burst: u32,
    /// How far above `rate` successful requests may push the limit
    pub max_increase: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rate: 10.0,
            burst: 5,
            max_increase: 5.0,
        }
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync + Debug {
    /// Block until a request may be issued.
    async fn wait(&self);

    /// Record a failed request.
    fn fail(&self) {}

    /// Record a successful request.
    fn succeed(&self) {}

    /// Stop handing out permits until [`RateLimiter::resume`] is called.
    fn pause(&self);

    fn resume(&self);

    /// Current rate in requests per second
    fn limit(&self) -> f64;
}

#[derive(Debug)]
struct BucketState {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
    paused: bool,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last_refill = now;
    }
}

enum Permit {
    Granted,
    Paused,
    RetryIn(Duration),
}

/// Fixed-rate token bucket
#[derive(Debug)]
pub struct TokenBucketLimiter {
    state: Mutex<BucketState>,
    resumed: Notify,
}

impl TokenBucketLimiter {
    /// The bucket starts full.
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            state: Mutex::new(BucketState {
                rate: floor_rate(rate),
                burst,
                tokens: burst,
                last_refill: Instant::now(),
                paused: false,
            }),
            resumed: Notify::new(),
        }
    }

    fn try_acquire(&self) -> Permit {
        let mut state = self.state.lock();
        if state.paused {
            return Permit::Paused;
        }
        state.refill(Instant::now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Permit::Granted
        } else {
            Permit::RetryIn(Duration::from_secs_f64((1.0 - state.tokens) / state.rate))
        }
    }

    /// Replace the refill rate, settling tokens accrued at the old rate first.
    fn update_rate(&self, f: impl FnOnce(f64) -> f64) -> f64 {
        let mut state = self.state.lock();
        state.refill(Instant::now());
        state.rate = floor_rate(f(state.rate));
        state.rate
    }
}

/// NaN and anything under [`MIN_RATE`] become [`MIN_RATE`]
fn floor_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        MIN_RATE
    } else {
        rate.clamp(MIN_RATE, f64::MAX)
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn wait(&self) {
        loop {
            // Register interest before checking so a resume between the check
            // and the await is not lost
            let resumed = self.resumed.notified();
            match self.try_acquire() {
                Permit::Granted => return,
                Permit::Paused => resumed.await,
                Permit::RetryIn(delay) => tokio::time::sleep(delay).await,
            }
        }
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn resume(&self) {
        {
            let mut state = self.state.lock();
            state.paused = false;
            // Time spent paused does not accrue tokens
            state.last_refill = Instant::now();
        }
        self.resumed.notify_waiters();
    }

    fn limit(&self) -> f64 {
        self.state.lock().rate
    }
}

/// Token bucket whose rate follows upstream health
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    bucket: TokenBucketLimiter,
    start_rate: f64,
    max_increase: f64,
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: TokenBucketLimiter::new(config.rate, config.burst),
            start_rate: floor_rate(config.rate),
            max_increase: if config.max_increase.is_finite() {
                config.max_increase.max(0.0)
            } else {
                0.0
            },
        }
    }

    pub fn ceiling(&self) -> f64 {
        self.start_rate + self.max_increase
    }
}

#[async_trait]
impl RateLimiter for AdaptiveRateLimiter {
    async fn wait(&self) {
        self.bucket.wait().await
    }

    fn fail(&self) {
        let rate = self
            .bucket
            .update_rate(|rate| (rate * (1.0 - FAILURE_DECREASE)).max(MIN_RATE));
        tracing::debug!(rate, "Upstream failure, rate limit lowered");
    }

    fn succeed(&self) {
        let ceiling = self.ceiling();
        self.bucket
            .update_rate(|rate| (rate * (1.0 + SUCCESS_INCREASE)).min(ceiling));
    }

    fn pause(&self) {
        self.bucket.pause()
    }

    fn resume(&self) {
        self.bucket.resume()
    }

    fn limit(&self) -> f64 {
        self.bucket.limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    fn config(rate: f64, burst: u32, max_increase: f64) -> RateLimiterConfig {
        RateLimiterConfig {
            rate,
            burst,
            max_increase,
        }
    }

    #[test]
    fn test_failure_then_recovery() {
        let limiter = AdaptiveRateLimiter::new(config(10.0, 5, 5.0));

        limiter.fail();
        assert!((limiter.limit() - 2.0).abs() < 1e-9);

        limiter.fail();
        assert!((limiter.limit() - 1.0).abs() < 1e-9);

        for _ in 0..20 {
            limiter.succeed();
        }
        assert!((limiter.limit() - 15.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ten_failures_then_wait() {
        let limiter = AdaptiveRateLimiter::new(config(10.0, 5, 5.0));
        for _ in 0..10 {
            limiter.fail();
        }
        assert!((limiter.limit() - MIN_RATE).abs() < 1e-9);

        // Tokens already in the bucket survive the slowdown
        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait().await;
        }
        assert_eq!(Instant::now(), start);

        let mut next = task::spawn(limiter.wait());
        assert_pending!(next.poll());

        tokio::time::advance(Duration::from_millis(990)).await;
        assert_pending!(next.poll());

        tokio::time::advance(Duration::from_millis(20)).await;
        assert_ready!(next.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_is_floored() {
        let limiter = AdaptiveRateLimiter::new(config(0.0, 1, 0.0));
        assert!((limiter.limit() - MIN_RATE).abs() < 1e-9);
        assert!((limiter.ceiling() - MIN_RATE).abs() < 1e-9);

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        let waited = Instant::now() - start;
        assert!(waited >= Duration::from_millis(999), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(1001), "waited {waited:?}");

        limiter.succeed();
        assert!((limiter.limit() - MIN_RATE).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_rates_are_floored() {
        let nan = TokenBucketLimiter::new(f64::NAN, 1);
        assert!((nan.limit() - MIN_RATE).abs() < 1e-9);
        let negative = TokenBucketLimiter::new(-3.0, 1);
        assert!((negative.limit() - MIN_RATE).abs() < 1e-9);
    }

    #[test]
    fn test_success_from_start_is_capped() {
        let limiter = AdaptiveRateLimiter::new(config(10.0, 5, 0.0));
        limiter.succeed();
        assert!((limiter.limit() - 10.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = TokenBucketLimiter::new(2.0, 2);
        let start = Instant::now();

        limiter.wait().await;
        limiter.wait().await;
        assert_eq!(Instant::now(), start);

        limiter.wait().await;
        let waited = Instant::now() - start;
        assert!(waited >= Duration::from_millis(499), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(501), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_blocks_until_resume() {
        let limiter = Arc::new(TokenBucketLimiter::new(100.0, 5));
        limiter.pause();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.wait().await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        limiter.resume();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter released after resume")
            .expect("waiter task");
    }

    proptest! {
        #[test]
        fn prop_limit_stays_in_bounds(
            rate in 1.0f64..100.0,
            max_increase in 0.0f64..50.0,
            outcomes in proptest::collection::vec(any::<bool>(), 0..200),
        ) {
            let limiter = AdaptiveRateLimiter::new(config(rate, 5, max_increase));
            let mut successes = 0u32;
            for ok in outcomes {
                if ok {
                    successes += 1;
                    limiter.succeed();
                } else {
                    limiter.fail();
                }
                let limit = limiter.limit();
                prop_assert!(limit >= MIN_RATE - 1e-9);
                prop_assert!(limit <= rate + max_increase + 1e-9);
                prop_assert!(limit <= rate + max_increase * f64::from(successes) + 1e-9);
            }
        }
    }
}
