//! # System Constants
//!
//! Operational limits and queue tuning shared by the collection pipeline and
//! the sync API.

use std::time::Duration;

/// Sync API record limits
pub mod sync_limits {
    /// Hard cap on records returned by any single sync request
    pub const LIMIT_MAX_RECORDS: u32 = 10_000;
    /// Records returned when the client does not ask for a count
    pub const DEFAULT_MAX_RECORDS: u32 = 500;

    /// Clamp a client-requested record count to the server limits.
    pub fn effective_limit(requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(DEFAULT_MAX_RECORDS)
            .min(LIMIT_MAX_RECORDS)
    }
}

/// Durable job queue settings
pub mod queue {
    use super::Duration;

    pub const COLLECTION_JOBS_QUEUE: &str = "collection_jobs";
    pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(600);
    pub const READ_BATCH_SIZE: i32 = 10;
    pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);
    pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
    /// Deliveries after which a failing job is surfaced for manual review
    pub const MAX_READ_COUNT: i32 = 5;
}

/// Tracing target for outgoing upstream request/response reports
pub const IO_REPORT_TARGET: &str = "catalog_sync::io_report";

#[cfg(test)]
mod tests {
    use super::sync_limits::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(None), DEFAULT_MAX_RECORDS);
        assert_eq!(effective_limit(Some(5)), 5);
        assert_eq!(effective_limit(Some(LIMIT_MAX_RECORDS + 1)), LIMIT_MAX_RECORDS);
        assert_eq!(effective_limit(Some(u32::MAX)), LIMIT_MAX_RECORDS);
    }
}
