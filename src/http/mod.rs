//! # Upstream HTTP
//!
//! Rate-limited, retrying, reporting HTTP stack used by every service adapter.
//!
//! A request travels `ReportingTransport -> RetryTransport -> RateLimitedTransport
//! -> base transport`, so each retry attempt waits for its own permit and feeds
//! the adaptive limiter, while the report carries one id per logical request.

pub mod client;
pub mod errors;
pub mod fixture;
pub mod rate_limiter;
pub mod transport;

pub use client::UpstreamClient;
pub use errors::UpstreamError;
pub use fixture::FixtureTransport;
pub use rate_limiter::{AdaptiveRateLimiter, RateLimiter, RateLimiterConfig, TokenBucketLimiter};
pub use transport::{
    RateLimitedTransport, ReportingTransport, ReqwestTransport, RetryPolicy, RetryTransport,
    Transport, UpstreamRequest, UpstreamResponse,
};
