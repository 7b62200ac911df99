//! Queue-driven collection through the pgmq-backed queue.

mod common;

use catalog_sync::config::SchedulerConfig;
use catalog_sync::messaging::{CollectionQueue, PgmqCollectionQueue};
use catalog_sync::models::{CollectionStatus, TermCollectionHistory};
use catalog_sync::orchestration::{enqueue_active_terms, Scheduler};
use common::{setup, FALL_2024, SCHOOL, SPRING_2024};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[serial]
async fn test_enqueued_terms_are_collected() {
    let Some(ctx) = setup().await else { return };
    let Ok(url) = std::env::var("TEST_DB_CONN") else { return };

    let queue_name = format!("cjobs_it_{}", chrono::Utc::now().timestamp_millis());
    let queue = Arc::new(PgmqCollectionQueue::new(&url).await.expect("pgmq"));
    queue.create_queue(&queue_name).await.expect("create queue");

    // Spring is view-only and must not be scheduled
    let sent = enqueue_active_terms(ctx.pool(), queue.as_ref(), &queue_name, false)
        .await
        .unwrap();
    assert_eq!(sent, 1);

    let config = SchedulerConfig {
        queue_name: queue_name.clone(),
        visibility_timeout: Duration::from_secs(30),
        batch_size: 2,
        poll_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(50),
        max_read_count: 3,
    };
    let scheduler = Scheduler::new(queue.clone(), ctx.orchestrator.clone(), config);
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let collected = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let runs = TermCollectionHistory::list_for_term(ctx.pool(), SCHOOL, FALL_2024)
                .await
                .unwrap();
            if runs.iter().any(|r| r.status == CollectionStatus::Success) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert!(collected.is_ok(), "scheduled collection never finished");
    assert!(TermCollectionHistory::list_for_term(ctx.pool(), SCHOOL, SPRING_2024)
        .await
        .unwrap()
        .is_empty());

    // The acknowledged job is gone
    let leftover = queue
        .read_with_poll(
            &queue_name,
            Duration::from_secs(1),
            10,
            Duration::from_millis(100),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
    assert!(leftover.is_empty());
}
