//! Batch scheduler runs against a real database.

mod common;

use std::time::Duration;

use casepress::batch::BatchStatus;
use casepress::collaborators::{DocumentKind, GenerationTask};
use casepress::item::ItemState;

use common::{ConfigBuilder, ItemBuilder, ScriptedGenerator, TestHarness};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_ten_items_with_bound_three() {
    let config = ConfigBuilder::new().max_concurrent(3).build();
    let generator = ScriptedGenerator::new().with_delay(Duration::from_millis(15));
    let harness = TestHarness::with_parts(config, generator);
    harness.seed_batch("b1", BatchStatus::Processing);
    for i in 0..10 {
        harness.seed_item(&ItemBuilder::new(&format!("i{}", i)).batch("b1").build());
    }

    let scheduler = harness.scheduler();
    let handle = scheduler.start();
    let drained = harness
        .wait_for_batch("b1", BatchStatus::Completed, DRAIN_TIMEOUT)
        .await;
    handle.stop().await;

    assert!(drained);
    assert!(harness.generator.peak_concurrency() <= 3);
    let batch = harness.batch("b1");
    assert_eq!(batch.total, 10);
    assert_eq!(batch.processed, batch.total);
    assert_eq!(batch.successful, 10);
    assert!(batch.counters_consistent());
}

#[tokio::test]
async fn test_one_failing_item_does_not_affect_siblings() {
    let config = ConfigBuilder::new().max_concurrent(2).max_attempts(1).build();
    let harness = TestHarness::with_config(config);
    harness.generator.fail_payloads_containing("POISON");
    harness.seed_batch("b1", BatchStatus::Processing);
    harness.seed_item(&ItemBuilder::new("good1").batch("b1").build());
    harness.seed_item(&ItemBuilder::new("bad").batch("b1").text("POISON text").build());
    harness.seed_item(&ItemBuilder::new("good2").batch("b1").build());

    let handle = harness.scheduler().start();
    let drained = harness
        .wait_for_batch("b1", BatchStatus::Completed, DRAIN_TIMEOUT)
        .await;
    handle.stop().await;

    assert!(drained);
    assert_eq!(harness.item("bad").state, ItemState::Failed);
    assert_eq!(harness.item("good1").state, ItemState::Generated);
    assert_eq!(harness.item("good2").state, ItemState::Generated);

    let batch = harness.batch("b1");
    assert_eq!((batch.processed, batch.successful, batch.failed), (3, 2, 1));
}

#[tokio::test]
async fn test_pending_and_cancelled_batches_are_left_alone() {
    let harness = TestHarness::new();
    harness.seed_batch("pending", BatchStatus::Pending);
    harness.seed_batch("cancelled", BatchStatus::Cancelled);
    harness.seed_item(&ItemBuilder::new("p1").batch("pending").build());
    harness.seed_item(&ItemBuilder::new("c1").batch("cancelled").build());

    let scheduler = harness.scheduler();
    let handle = scheduler.start();
    scheduler.trigger();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.stop().await;

    assert_eq!(harness.item("p1").state, ItemState::Extracted);
    assert_eq!(harness.item("c1").state, ItemState::Extracted);
    assert_eq!(harness.generator.calls(GenerationTask::Deidentify), 0);
}

#[tokio::test]
async fn test_uploaded_batch_is_driven_to_completion() {
    let harness = TestHarness::new();
    let service = harness.batch_service();
    let batch = service.create_batch(None).unwrap();
    for i in 0..4 {
        let body = format!("פסק דין מספר {}\n\nהעובד פוטר", i);
        service
            .add_document(&batch.id, &format!("r{}.txt", i), body.as_bytes(), DocumentKind::PlainText)
            .await
            .unwrap();
    }
    service
        .add_document(&batch.id, "copy.txt", "פסק דין מספר 0\n\nהעובד פוטר".as_bytes(), DocumentKind::PlainText)
        .await
        .unwrap();
    service.start_batch(&batch.id).unwrap();

    let handle = harness.scheduler().start();
    let drained = harness
        .wait_for_batch(&batch.id, BatchStatus::Completed, DRAIN_TIMEOUT)
        .await;
    handle.stop().await;

    assert!(drained);
    let stored = harness.batch(&batch.id);
    assert_eq!(stored.total, 5);
    assert_eq!((stored.successful, stored.skipped), (4, 1));
    assert_eq!(stored.processed, stored.total);
    assert!(stored.completed_at.is_some());
    assert!(service
        .items(&batch.id)
        .unwrap()
        .iter()
        .all(|item| item.state == ItemState::Generated));
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_items() {
    let config = ConfigBuilder::new().max_concurrent(2).build();
    let generator = ScriptedGenerator::new().with_delay(Duration::from_millis(30));
    let harness = TestHarness::with_parts(config, generator);
    harness.seed_batch("b1", BatchStatus::Processing);
    harness.seed_item(&ItemBuilder::new("i1").batch("b1").build());
    harness.seed_item(&ItemBuilder::new("i2").batch("b1").build());

    let handle = harness.scheduler().start();
    while harness.generator.calls(GenerationTask::Deidentify) < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.stop().await;

    for id in ["i1", "i2"] {
        let item = harness.item(id);
        assert!(!item.state.is_in_flight(), "{} left in {}", id, item.state);
        assert_eq!(item.state, ItemState::Generated);
    }
}
