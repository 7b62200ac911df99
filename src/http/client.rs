//! Per-upstream client: one base URL, one limiter, one layered transport.

use super::errors::UpstreamError;
use super::rate_limiter::{AdaptiveRateLimiter, RateLimiter, RateLimiterConfig};
use super::transport::{
    RateLimitedTransport, ReportingTransport, RetryPolicy, RetryTransport, Transport,
    UpstreamRequest, UpstreamResponse,
};
use std::sync::Arc;
use url::Url;

#[derive(Clone)]
pub struct UpstreamClient {
    base_url: Url,
    limiter: Arc<dyn RateLimiter>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.base_url.as_str())
            .field("limit", &self.limiter.limit())
            .finish()
    }
}

impl UpstreamClient {
    /// Wrap `base` in the reporting, retry and rate limiting layers.
    pub fn new(
        base_url: Url,
        limiter_config: RateLimiterConfig,
        retry: RetryPolicy,
        base: Arc<dyn Transport>,
    ) -> Self {
        let limiter: Arc<dyn RateLimiter> = Arc::new(AdaptiveRateLimiter::new(limiter_config));
        let limited: Arc<dyn Transport> =
            Arc::new(RateLimitedTransport::new(base, Arc::clone(&limiter)));
        let retrying: Arc<dyn Transport> = Arc::new(RetryTransport::new(limited, retry));
        let transport: Arc<dyn Transport> = Arc::new(ReportingTransport::new(retrying));

        Self {
            base_url,
            limiter,
            transport,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    /// Resolve `path` (which may carry a query string) against the base URL.
    pub fn url(&self, path: &str) -> Result<Url, UpstreamError> {
        self.base_url.join(path).map_err(|e| {
            UpstreamError::assumption_violation(path, format!("invalid upstream URL: {e}"))
        })
    }

    pub async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let operation = request.describe();
        self.transport
            .execute(request)
            .await?
            .error_for_status(&operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::StatusCode;

    struct Echo;

    #[async_trait]
    impl Transport for Echo {
        async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
            if request.url.path().ends_with("missing") {
                return Ok(UpstreamResponse::new(StatusCode::NOT_FOUND, ""));
            }
            Ok(UpstreamResponse::new(StatusCode::OK, request.url.to_string()))
        }
    }

    fn client() -> UpstreamClient {
        UpstreamClient::new(
            Url::parse("https://banner.example.edu/StudentRegistrationSsb/ssb/").unwrap(),
            RateLimiterConfig::default(),
            RetryPolicy::default(),
            Arc::new(Echo),
        )
    }

    #[tokio::test]
    async fn test_paths_resolve_under_base() {
        let client = client();
        let url = client.url("classSearch/getTerms?offset=1&max=5").unwrap();
        let response = client.send(UpstreamRequest::get(url)).await.unwrap();
        assert_eq!(
            response.body,
            "https://banner.example.edu/StudentRegistrationSsb/ssb/classSearch/getTerms?offset=1&max=5"
        );
    }

    #[tokio::test]
    async fn test_client_error_status_becomes_violation() {
        let client = client();
        let url = client.url("term/missing").unwrap();
        let err = client.send(UpstreamRequest::get(url)).await.unwrap_err();
        assert!(err.is_assumption_violation());
    }
}
