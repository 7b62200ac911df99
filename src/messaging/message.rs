//! # Queue message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One collection job: collect `term_collection_id`, optionally through a
/// named service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMessage {
    pub term_collection_id: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub is_full_collection: bool,
    /// Term ids are only unique per school. Producers in this crate always set
    /// it; without it the term is looked up by id alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
}

impl CollectionMessage {
    pub fn new(school_id: &str, term_collection_id: &str, is_full_collection: bool) -> Self {
        Self {
            term_collection_id: term_collection_id.to_string(),
            service: None,
            is_full_collection,
            school_id: Some(school_id.to_string()),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// A delivered message as read from the queue
#[derive(Debug, Clone)]
pub struct QueuedMessage<T> {
    pub msg_id: i64,
    /// Deliveries so far, including this one
    pub read_ct: i32,
    pub enqueued_at: DateTime<Utc>,
    pub message: T,
}

impl QueuedMessage<serde_json::Value> {
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let message = CollectionMessage::new("marist", "202440", true).with_service("banner");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "term_collection_id": "202440",
                "service": "banner",
                "is_full_collection": true,
                "school_id": "marist",
            })
        );
    }

    #[test]
    fn test_minimal_message_parses() {
        let message: CollectionMessage =
            serde_json::from_value(json!({ "term_collection_id": "202440" })).unwrap();
        assert_eq!(message.service, None);
        assert!(!message.is_full_collection);
        assert_eq!(message.school_id, None);
    }

    #[test]
    fn test_null_service_parses() {
        let message: CollectionMessage = serde_json::from_value(json!({
            "term_collection_id": "202440",
            "service": null,
            "is_full_collection": false,
        }))
        .unwrap();
        assert_eq!(message.service, None);
    }
}
