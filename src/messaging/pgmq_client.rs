//! # PostgreSQL Message Queue Client (pgmq-rs)

use super::errors::{MessagingError, QueueOp};
use super::message::{CollectionMessage, QueuedMessage};
use async_trait::async_trait;
use pgmq::{types::Message, PGMQueue};
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait CollectionQueue: Send + Sync {
    async fn create_queue(&self, queue_name: &str) -> Result<(), MessagingError>;

    async fn send(&self, queue_name: &str, message: &CollectionMessage)
        -> Result<i64, MessagingError>;

    /// Read up to `batch` messages, waiting up to `poll_timeout` for the first
    /// one. Read messages stay invisible for `visibility_timeout`.
    async fn read_with_poll(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
        batch: i32,
        poll_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Vec<QueuedMessage<serde_json::Value>>, MessagingError>;

    /// Acknowledge a processed message.
    async fn delete(&self, queue_name: &str, msg_id: i64) -> Result<(), MessagingError>;

    /// Move a message out of the live queue without processing it.
    async fn archive(&self, queue_name: &str, msg_id: i64) -> Result<(), MessagingError>;
}

/// pgmq-rs based queue client
#[derive(Debug, Clone)]
pub struct PgmqCollectionQueue {
    pgmq: PGMQueue,
}

impl PgmqCollectionQueue {
    /// Connect using a connection string
    pub async fn new(database_url: &str) -> Result<Self, MessagingError> {
        let pgmq = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| MessagingError::Connect(e.to_string()))?;

        info!("Connected to pgmq");
        Ok(Self { pgmq })
    }
}

fn into_queued(message: Message<serde_json::Value>) -> QueuedMessage<serde_json::Value> {
    QueuedMessage {
        msg_id: message.msg_id,
        read_ct: message.read_ct,
        enqueued_at: message.enqueued_at,
        message: message.message,
    }
}

#[async_trait]
impl CollectionQueue for PgmqCollectionQueue {
    async fn create_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        self.pgmq
            .create(queue_name)
            .await
            .map_err(|e| MessagingError::queue(queue_name, QueueOp::Create, e))?;

        debug!(queue = %queue_name, "Queue ready");
        Ok(())
    }

    async fn send(
        &self,
        queue_name: &str,
        message: &CollectionMessage,
    ) -> Result<i64, MessagingError> {
        let payload = serde_json::to_value(message)?;
        let msg_id = self
            .pgmq
            .send(queue_name, &payload)
            .await
            .map_err(|e| MessagingError::queue(queue_name, QueueOp::Send, e))?;

        debug!(
            queue = %queue_name,
            msg_id,
            term_collection_id = %message.term_collection_id,
            "Collection job enqueued"
        );
        Ok(msg_id)
    }

    async fn read_with_poll(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
        batch: i32,
        poll_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Vec<QueuedMessage<serde_json::Value>>, MessagingError> {
        let vt = i32::try_from(visibility_timeout.as_secs()).unwrap_or(i32::MAX);
        let messages = self
            .pgmq
            .read_batch_with_poll::<serde_json::Value>(
                queue_name,
                Some(vt),
                batch,
                Some(poll_timeout),
                Some(poll_interval),
            )
            .await
            .map_err(|e| MessagingError::queue(queue_name, QueueOp::Read, e))?
            .unwrap_or_default();

        Ok(messages.into_iter().map(into_queued).collect())
    }

    async fn delete(&self, queue_name: &str, msg_id: i64) -> Result<(), MessagingError> {
        self.pgmq
            .delete(queue_name, msg_id)
            .await
            .map_err(|e| MessagingError::queue(queue_name, QueueOp::Delete, e))?;
        Ok(())
    }

    async fn archive(&self, queue_name: &str, msg_id: i64) -> Result<(), MessagingError> {
        self.pgmq
            .archive(queue_name, msg_id)
            .await
            .map_err(|e| MessagingError::queue(queue_name, QueueOp::Archive, e))?;
        Ok(())
    }
}
