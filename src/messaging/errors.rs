//! Job queue failures. All of them are worth retrying at the job level:
//! the queue lives in the same database as the catalog.

use std::fmt;
use thiserror::Error;

/// Queue call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOp {
    Create,
    Send,
    Read,
    Delete,
    Archive,
}

impl fmt::Display for QueueOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueueOp::Create => "create",
            QueueOp::Send => "send",
            QueueOp::Read => "read",
            QueueOp::Delete => "delete",
            QueueOp::Archive => "archive",
        })
    }
}

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Cannot reach job queue: {0}")]
    Connect(String),

    #[error("Job queue {queue_name}: {op} failed: {reason}")]
    Queue {
        queue_name: String,
        op: QueueOp,
        reason: String,
    },

    #[error("Collection job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl MessagingError {
    pub fn queue(queue_name: &str, op: QueueOp, reason: impl fmt::Display) -> Self {
        Self::Queue {
            queue_name: queue_name.to_string(),
            op,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = MessagingError::queue("collection_jobs", QueueOp::Delete, "gone");
        assert_eq!(err.to_string(), "Job queue collection_jobs: delete failed: gone");
    }

    #[test]
    fn test_json_errors_are_payload_errors() {
        let err: MessagingError = serde_json::from_str::<u32>("\"x\"").unwrap_err().into();
        assert!(matches!(err, MessagingError::Payload(_)));
    }
}
