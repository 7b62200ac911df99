//! # Transports
//!
//! [`Transport`] is the seam between service adapters and the network. The
//! production stack is assembled from layers that each wrap an inner transport:
//!
//! - [`ReqwestTransport`] performs the request and buffers the body
//! - [`RateLimitedTransport`] waits for a permit and feeds the outcome back to
//!   the limiter
//! - [`RetryTransport`] retries transient failures with exponential backoff
//! - [`ReportingTransport`] reports each request and response to the IO report
//!   target
//!
//! Tests swap the base for a fixture transport and keep the other layers.

use super::errors::{is_transient_status, UpstreamError};
use super::rate_limiter::RateLimiter;
use crate::constants::IO_REPORT_TARGET;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// A fully-described outgoing request. Cheap to clone so retries can resend it.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub form: Option<Vec<(String, String)>>,
}

impl UpstreamRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            form: None,
        }
    }

    pub fn post_form(url: Url, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: HeaderMap::new(),
            form: Some(form),
        }
    }

    /// Attach a session cookie. Values that are not valid header text are ignored.
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        if let Ok(header) = HeaderValue::from_str(&format!("{name}={value}")) {
            self.headers.insert(COOKIE, header);
        }
        self
    }

    /// Short form used in logs and error contexts
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.url.path())
    }
}

/// A buffered response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Turn an error status into an [`UpstreamError`].
    pub fn error_for_status(self, operation: &str) -> Result<Self, UpstreamError> {
        if self.status.is_client_error() || self.status.is_server_error() {
            Err(UpstreamError::from_status(operation, self.status))
        } else {
            Ok(self)
        }
    }

    /// Decode the body; a body that does not match the expected shape is an
    /// assumption violation.
    pub fn json<T: DeserializeOwned>(&self, context: &str) -> Result<T, UpstreamError> {
        serde_json::from_str(&self.body)
            .map_err(|e| UpstreamError::assumption_violation(context, format!("invalid JSON: {e}")))
    }

    /// Value of the named cookie from any `Set-Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value.trim().to_string())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// Network transport over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client with the defaults every upstream uses
    pub fn with_timeout(timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("catalog-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::from_reqwest("client build", &e))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let operation = request.describe();
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(&operation, &e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::from_reqwest(&operation, &e))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Waits on a shared limiter before each request and reports the outcome back.
pub struct RateLimitedTransport {
    inner: Arc<dyn Transport>,
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitedTransport {
    pub fn new(inner: Arc<dyn Transport>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl Transport for RateLimitedTransport {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        self.limiter.wait().await;
        let result = self.inner.execute(request).await;
        match &result {
            Ok(response) if response.status.as_u16() < 400 => self.limiter.succeed(),
            _ => self.limiter.fail(),
        }
        result
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Retries transport errors, 5xx and 429 responses.
pub struct RetryTransport {
    inner: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryTransport {
    pub fn new(inner: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

fn should_retry(result: &Result<UpstreamResponse, UpstreamError>) -> bool {
    match result {
        Ok(response) => is_transient_status(response.status),
        Err(err) => err.is_transient(),
    }
}

#[async_trait]
impl Transport for RetryTransport {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let mut attempt = 0;
        loop {
            let result = self.inner.execute(request.clone()).await;
            if attempt >= self.policy.max_retries || !should_retry(&result) {
                return result;
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                request = %request.describe(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Transient upstream failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Reports every request/response pair to [`IO_REPORT_TARGET`] at debug level.
pub struct ReportingTransport {
    inner: Arc<dyn Transport>,
    next_request_id: AtomicU64,
}

impl ReportingTransport {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self {
            inner,
            next_request_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Transport for ReportingTransport {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: IO_REPORT_TARGET,
            request_id,
            method = %request.method,
            url = %request.url,
            form = ?request.form,
            "upstream request"
        );

        let started = Instant::now();
        let result = self.inner.execute(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => debug!(
                target: IO_REPORT_TARGET,
                request_id,
                status = response.status.as_u16(),
                bytes = response.body.len(),
                elapsed_ms,
                "upstream response"
            ),
            Err(err) => debug!(
                target: IO_REPORT_TARGET,
                request_id,
                error = %err,
                elapsed_ms,
                "upstream error"
            ),
        }
        result
    }
}
