//! # Scheduler
//!
//! Polls the collection job queue and runs one worker task per message.
//! A message is deleted only after its run succeeds; otherwise it becomes
//! visible again once the visibility timeout lapses, giving at-least-once
//! delivery across scheduler instances.

use super::orchestrator::CollectionRunner;
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::messaging::{CollectionMessage, CollectionQueue, QueuedMessage};
use crate::models::TermCollection;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// What happened to one delivered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Run succeeded; message deleted
    Acked,
    /// Message can never succeed; moved to the archive
    Archived,
    /// Run failed; message left for redelivery
    Released,
}

pub struct Scheduler {
    queue: Arc<dyn CollectionQueue>,
    runner: Arc<dyn CollectionRunner>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        queue: Arc<dyn CollectionQueue>,
        runner: Arc<dyn CollectionRunner>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queue,
            runner,
            config,
        }
    }

    /// Poll until `cancel` fires, then wait for in-flight workers to wind down.
    #[instrument(skip_all, fields(queue = %self.config.queue_name))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.queue.create_queue(&self.config.queue_name).await?;
        info!(
            batch_size = self.config.batch_size,
            visibility_timeout_secs = self.config.visibility_timeout.as_secs(),
            "Scheduler started"
        );

        let capacity = usize::try_from(self.config.batch_size.max(1)).unwrap_or(1);
        let mut workers: JoinSet<MessageOutcome> = JoinSet::new();

        loop {
            while let Some(finished) = workers.try_join_next() {
                log_worker_exit(finished);
            }

            let free = capacity.saturating_sub(workers.len());
            if free == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    Some(finished) = workers.join_next() => log_worker_exit(finished),
                }
                continue;
            }

            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = self.queue.read_with_poll(
                    &self.config.queue_name,
                    self.config.visibility_timeout,
                    i32::try_from(free).unwrap_or(i32::MAX),
                    self.config.poll_timeout,
                    self.config.poll_interval,
                ) => read,
            };

            match read {
                Ok(messages) => {
                    if !messages.is_empty() {
                        debug!(count = messages.len(), "Collection jobs received");
                    }
                    for message in messages {
                        let queue = Arc::clone(&self.queue);
                        let runner = Arc::clone(&self.runner);
                        let config = self.config.clone();
                        let cancel = cancel.child_token();
                        workers.spawn(async move {
                            process_message(queue.as_ref(), runner.as_ref(), &config, message, &cancel)
                                .await
                        });
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to read collection jobs");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        info!(in_flight = workers.len(), "Scheduler stopping");
        while let Some(finished) = workers.join_next().await {
            log_worker_exit(finished);
        }
        Ok(())
    }
}

fn log_worker_exit(finished: std::result::Result<MessageOutcome, tokio::task::JoinError>) {
    if let Err(e) = finished {
        error!(error = %e, "Collection worker panicked");
    }
}

/// Handle one delivered message end to end.
pub async fn process_message(
    queue: &dyn CollectionQueue,
    runner: &dyn CollectionRunner,
    config: &SchedulerConfig,
    delivered: QueuedMessage<serde_json::Value>,
    cancel: &CancellationToken,
) -> MessageOutcome {
    let queue_name = config.queue_name.as_str();
    let msg_id = delivered.msg_id;

    let message: CollectionMessage = match delivered.parse() {
        Ok(message) => message,
        Err(e) => {
            error!(msg_id, error = %e, payload = %delivered.message, "Malformed collection job");
            return archive(queue, queue_name, msg_id).await;
        }
    };

    if delivered.read_ct > config.max_read_count {
        error!(
            msg_id,
            read_ct = delivered.read_ct,
            term_collection_id = %message.term_collection_id,
            school_id = ?message.school_id,
            manual_review = true,
            "Collection job keeps failing"
        );
    }

    match runner.run_collection(&message, cancel).await {
        Ok(summary) => {
            info!(
                msg_id,
                history_id = summary.history_id,
                changed_rows = summary.changed_rows,
                "Collection job completed"
            );
            match queue.delete(queue_name, msg_id).await {
                Ok(()) => MessageOutcome::Acked,
                Err(e) => {
                    warn!(msg_id, error = %e, "Failed to delete completed collection job");
                    MessageOutcome::Released
                }
            }
        }
        Err(e) if !e.is_retryable() => {
            error!(
                msg_id,
                term_collection_id = %message.term_collection_id,
                error = %e,
                manual_review = true,
                "Collection job cannot succeed"
            );
            archive(queue, queue_name, msg_id).await
        }
        Err(e) => {
            warn!(
                msg_id,
                read_ct = delivered.read_ct,
                term_collection_id = %message.term_collection_id,
                error = %e,
                "Collection job failed, will be redelivered"
            );
            MessageOutcome::Released
        }
    }
}

async fn archive(queue: &dyn CollectionQueue, queue_name: &str, msg_id: i64) -> MessageOutcome {
    match queue.archive(queue_name, msg_id).await {
        Ok(()) => MessageOutcome::Archived,
        Err(e) => {
            warn!(msg_id, error = %e, "Failed to archive collection job");
            MessageOutcome::Released
        }
    }
}

/// Enqueue one job per term that is still collecting. Frozen terms are skipped.
pub async fn enqueue_terms(
    queue: &dyn CollectionQueue,
    queue_name: &str,
    terms: &[TermCollection],
    is_full_collection: bool,
) -> Result<usize> {
    let mut sent = 0;
    for term in terms.iter().filter(|t| t.still_collecting) {
        let message = CollectionMessage::new(&term.school_id, &term.id, is_full_collection);
        queue.send(queue_name, &message).await?;
        sent += 1;
    }
    Ok(sent)
}

pub async fn enqueue_active_terms(
    pool: &PgPool,
    queue: &dyn CollectionQueue,
    queue_name: &str,
    is_full_collection: bool,
) -> Result<usize> {
    let terms = TermCollection::list_still_collecting(pool).await?;
    let sent = enqueue_terms(queue, queue_name, &terms, is_full_collection).await?;
    info!(sent, full = is_full_collection, "Collection jobs enqueued");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use crate::http::UpstreamError;
    use crate::messaging::MessagingError;
    use crate::models::{CollectionStatus, Season};
    use crate::orchestration::orchestrator::CollectionRunSummary;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryQueue {
        pending: Mutex<VecDeque<QueuedMessage<serde_json::Value>>>,
        sent: Mutex<Vec<CollectionMessage>>,
        deleted: Mutex<Vec<i64>>,
        archived: Mutex<Vec<i64>>,
    }

    impl MemoryQueue {
        fn with_messages(payloads: Vec<(i64, i32, serde_json::Value)>) -> Self {
            let queue = Self::default();
            queue.pending.lock().extend(payloads.into_iter().map(|(msg_id, read_ct, message)| {
                QueuedMessage {
                    msg_id,
                    read_ct,
                    enqueued_at: Utc::now(),
                    message,
                }
            }));
            queue
        }
    }

    #[async_trait]
    impl CollectionQueue for MemoryQueue {
        async fn create_queue(&self, _queue_name: &str) -> std::result::Result<(), MessagingError> {
            Ok(())
        }

        async fn send(
            &self,
            _queue_name: &str,
            message: &CollectionMessage,
        ) -> std::result::Result<i64, MessagingError> {
            let mut sent = self.sent.lock();
            sent.push(message.clone());
            Ok(sent.len() as i64)
        }

        async fn read_with_poll(
            &self,
            _queue_name: &str,
            _visibility_timeout: Duration,
            batch: i32,
            poll_timeout: Duration,
            _poll_interval: Duration,
        ) -> std::result::Result<Vec<QueuedMessage<serde_json::Value>>, MessagingError> {
            let batch: Vec<_> = {
                let mut pending = self.pending.lock();
                let n = pending.len().min(batch as usize);
                pending.drain(..n).collect()
            };
            if batch.is_empty() {
                tokio::time::sleep(poll_timeout).await;
            }
            Ok(batch)
        }

        async fn delete(&self, _queue_name: &str, msg_id: i64) -> std::result::Result<(), MessagingError> {
            self.deleted.lock().push(msg_id);
            Ok(())
        }

        async fn archive(&self, _queue_name: &str, msg_id: i64) -> std::result::Result<(), MessagingError> {
            self.archived.lock().push(msg_id);
            Ok(())
        }
    }

    /// Succeeds for term 202440, transient failure for 202420, unknown otherwise
    #[derive(Default)]
    struct ScriptedRunner {
        seen: Mutex<Vec<CollectionMessage>>,
    }

    #[async_trait]
    impl CollectionRunner for ScriptedRunner {
        async fn run_collection(
            &self,
            message: &CollectionMessage,
            _cancel: &CancellationToken,
        ) -> Result<CollectionRunSummary> {
            self.seen.lock().push(message.clone());
            match message.term_collection_id.as_str() {
                "202440" => Ok(CollectionRunSummary {
                    history_id: 1,
                    school_id: "marist".to_string(),
                    term_collection_id: "202440".to_string(),
                    service_name: "banner".to_string(),
                    status: CollectionStatus::Success,
                    changed_rows: 6,
                    duration: Duration::from_millis(5),
                }),
                "202420" => Err(UpstreamError::transient("GET", "503").into()),
                other => Err(CatalogError::UnknownTermCollection {
                    term_collection_id: other.to_string(),
                }),
            }
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            poll_timeout: Duration::from_millis(10),
            poll_interval: Duration::from_millis(1),
            ..SchedulerConfig::default()
        }
    }

    fn delivered(msg_id: i64, read_ct: i32, payload: serde_json::Value) -> QueuedMessage<serde_json::Value> {
        QueuedMessage {
            msg_id,
            read_ct,
            enqueued_at: Utc::now(),
            message: payload,
        }
    }

    #[tokio::test]
    async fn test_success_acks_message() {
        let queue = MemoryQueue::default();
        let runner = ScriptedRunner::default();
        let outcome = process_message(
            &queue,
            &runner,
            &config(),
            delivered(7, 1, json!({"term_collection_id": "202440", "school_id": "marist"})),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, MessageOutcome::Acked);
        assert_eq!(*queue.deleted.lock(), vec![7]);
    }

    #[tokio::test]
    async fn test_transient_failure_is_released() {
        let queue = MemoryQueue::default();
        let runner = ScriptedRunner::default();
        let outcome = process_message(
            &queue,
            &runner,
            &config(),
            delivered(8, 6, json!({"term_collection_id": "202420"})),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, MessageOutcome::Released);
        assert!(queue.deleted.lock().is_empty());
        assert!(queue.archived.lock().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_failures_are_archived() {
        let queue = MemoryQueue::default();
        let runner = ScriptedRunner::default();

        let unknown = process_message(
            &queue,
            &runner,
            &config(),
            delivered(9, 1, json!({"term_collection_id": "199910"})),
            &CancellationToken::new(),
        )
        .await;
        let malformed = process_message(
            &queue,
            &runner,
            &config(),
            delivered(10, 1, json!({"term": 5})),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(unknown, MessageOutcome::Archived);
        assert_eq!(malformed, MessageOutcome::Archived);
        assert_eq!(*queue.archived.lock(), vec![9, 10]);
        // the malformed payload never reached the runner
        assert_eq!(runner.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_run_loop_drains_queue_until_cancelled() {
        let queue = Arc::new(MemoryQueue::with_messages(vec![
            (1, 1, json!({"term_collection_id": "202440", "school_id": "marist"})),
            (2, 1, json!({"term_collection_id": "202420", "school_id": "marist"})),
            (3, 1, json!({"term_collection_id": "202440", "service": "banner"})),
        ]));
        let runner = Arc::new(ScriptedRunner::default());
        let scheduler = Scheduler::new(queue.clone(), runner.clone(), config());

        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while runner.seen.lock().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("all jobs dispatched");

        cancel.cancel();
        handle.await.unwrap().unwrap();

        let mut deleted = queue.deleted.lock().clone();
        deleted.sort();
        assert_eq!(deleted, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_enqueue_skips_frozen_terms() {
        let queue = MemoryQueue::default();
        let term = |id: &str, still_collecting| TermCollection {
            id: id.to_string(),
            school_id: "marist".to_string(),
            year: 2024,
            season: Season::Fall,
            name: None,
            still_collecting,
        };
        let terms = vec![term("202440", true), term("202420", false), term("202510", true)];

        let sent = enqueue_terms(&queue, "collection_jobs", &terms, false).await.unwrap();
        assert_eq!(sent, 2);

        let sent = queue.sent.lock();
        let ids: Vec<&str> = sent.iter().map(|m| m.term_collection_id.as_str()).collect();
        assert_eq!(ids, vec!["202440", "202510"]);
        assert!(sent.iter().all(|m| m.school_id.as_deref() == Some("marist")));
    }
}
