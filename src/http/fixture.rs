//! Canned-response transport for offline runs and tests.

use super::errors::UpstreamError;
use super::transport::{Transport, UpstreamRequest, UpstreamResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderValue, SET_COOKIE};
use reqwest::{Method, StatusCode};

#[derive(Debug, Clone)]
struct FixtureRoute {
    method: Method,
    path_suffix: String,
    response: UpstreamResponse,
}

/// Serves responses by method and path suffix. The most recently added route
/// wins, so a test can swap a fixture between runs. Unmatched requests get 404.
#[derive(Debug, Default)]
pub struct FixtureTransport {
    routes: Mutex<Vec<FixtureRoute>>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, method: Method, path_suffix: &str, response: UpstreamResponse) -> Self {
        self.add_route(method, path_suffix, response);
        self
    }

    pub fn with_body(self, method: Method, path_suffix: &str, body: impl Into<String>) -> Self {
        self.with_route(method, path_suffix, UpstreamResponse::new(StatusCode::OK, body))
    }

    pub fn add_route(&self, method: Method, path_suffix: &str, response: UpstreamResponse) {
        self.routes.lock().push(FixtureRoute {
            method,
            path_suffix: path_suffix.to_string(),
            response,
        });
    }

    pub fn add_body(&self, method: Method, path_suffix: &str, body: impl Into<String>) {
        self.add_route(method, path_suffix, UpstreamResponse::new(StatusCode::OK, body));
    }

    /// Requests seen so far, in arrival order
    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, path_suffix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.path().ends_with(path_suffix))
            .count()
    }
}

/// A 200 response carrying a `Set-Cookie` header
pub fn response_with_cookie(name: &str, value: &str) -> UpstreamResponse {
    let mut response = UpstreamResponse::new(StatusCode::OK, "");
    if let Ok(header) = HeaderValue::from_str(&format!("{name}={value}; Path=/; HttpOnly")) {
        response.headers.insert(SET_COOKIE, header);
    }
    response
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let response = self
            .routes
            .lock()
            .iter()
            .rev()
            .find(|route| {
                route.method == request.method && request.url.path().ends_with(&route.path_suffix)
            })
            .map(|route| route.response.clone())
            .unwrap_or_else(|| UpstreamResponse::new(StatusCode::NOT_FOUND, ""));
        self.requests.lock().push(request);
        Ok(response)
    }
}
