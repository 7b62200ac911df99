//! # Error Types
//!
//! Crate-wide error handling. Upstream failures arrive already classified as
//! [`UpstreamError`]; database errors pass through untouched so callers can
//! match on the original `sqlx::Error`.

use crate::http::UpstreamError;
use crate::messaging::MessagingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown school: {school_id}")]
    UnknownSchool { school_id: String },

    #[error("Unknown term collection: {term_collection_id}")]
    UnknownTermCollection { term_collection_id: String },

    #[error("Unknown service: {service_name}")]
    UnknownService { service_name: String },

    #[error("Service {service_name} does not support school {school_id}")]
    UnsupportedSchool {
        service_name: String,
        school_id: String,
    },

    #[error("Collection for {school_id}/{term_collection_id} was cancelled")]
    Cancelled {
        school_id: String,
        term_collection_id: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn unknown_school(school_id: impl Into<String>) -> Self {
        Self::UnknownSchool {
            school_id: school_id.into(),
        }
    }

    /// Whether re-delivering the same collection job could succeed.
    ///
    /// Assumption violations and configuration mistakes will fail the same way
    /// on every attempt; everything else (network, database, cancellation) may not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Upstream(err) => err.is_transient(),
            CatalogError::Database(_) | CatalogError::Messaging(_) => true,
            CatalogError::Cancelled { .. } => true,
            CatalogError::Configuration(_)
            | CatalogError::UnknownSchool { .. }
            | CatalogError::UnknownTermCollection { .. }
            | CatalogError::UnknownService { .. }
            | CatalogError::UnsupportedSchool { .. }
            | CatalogError::Serialization(_) => false,
        }
    }

    /// Upstream schema drift that an operator has to look at.
    pub fn needs_manual_review(&self) -> bool {
        matches!(self, CatalogError::Upstream(err) if err.is_assumption_violation())
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let transient = CatalogError::from(UpstreamError::transient("GET /terms", "503"));
        assert!(transient.is_retryable());
        assert!(!transient.needs_manual_review());

        let violation =
            CatalogError::from(UpstreamError::assumption_violation("searchResults", "missing data"));
        assert!(!violation.is_retryable());
        assert!(violation.needs_manual_review());

        assert!(!CatalogError::unknown_school("nowhere").is_retryable());
        assert!(CatalogError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn test_database_errors_are_not_rewrapped() {
        let err = CatalogError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.to_string(), sqlx::Error::RowNotFound.to_string());
    }
}
