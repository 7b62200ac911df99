//! Upstream error classification.
//!
//! Every failure talking to an upstream lands in one of two categories: a
//! transient one worth retrying, or a violated assumption about the upstream's
//! schema that needs a human.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("Transient upstream failure during {operation}: {message}")]
    Transient {
        operation: String,
        message: String,
        status: Option<u16>,
    },

    #[error("Upstream assumption violated in {context}: {message}")]
    AssumptionViolation { context: String, message: String },
}

impl UpstreamError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn assumption_violation(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AssumptionViolation {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Classify a non-success status. 5xx and 429 are transient; any other
    /// error status means the endpoint no longer behaves as expected.
    pub fn from_status(operation: impl Into<String>, status: StatusCode) -> Self {
        let operation = operation.into();
        if is_transient_status(status) {
            Self::Transient {
                operation,
                message: format!("upstream responded {status}"),
                status: Some(status.as_u16()),
            }
        } else {
            Self::AssumptionViolation {
                context: operation,
                message: format!("unexpected status {status}"),
            }
        }
    }

    /// Transport-level failures (connect, timeout, reset) are transient.
    pub fn from_reqwest(operation: impl Into<String>, err: &reqwest::Error) -> Self {
        let operation = operation.into();
        if err.is_decode() {
            Self::assumption_violation(operation, err.to_string())
        } else {
            Self::Transient {
                operation,
                message: err.to_string(),
                status: err.status().map(|s| s.as_u16()),
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Transient { .. })
    }

    pub fn is_assumption_violation(&self) -> bool {
        matches!(self, UpstreamError::AssumptionViolation { .. })
    }
}

pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(UpstreamError::from_status("GET", StatusCode::BAD_GATEWAY).is_transient());
        assert!(UpstreamError::from_status("GET", StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(UpstreamError::from_status("GET", StatusCode::NOT_FOUND).is_assumption_violation());
        assert!(UpstreamError::from_status("GET", StatusCode::BAD_REQUEST).is_assumption_violation());
    }

    #[test]
    fn test_transient_keeps_status() {
        match UpstreamError::from_status("GET /terms", StatusCode::SERVICE_UNAVAILABLE) {
            UpstreamError::Transient { status, .. } => assert_eq!(status, Some(503)),
            other => panic!("expected transient, got {other:?}"),
        }
    }
}
