//! Background loop that drives eligible items of processing batches.
//!
//! One scheduler runs per process. Each cycle pulls the oldest eligible items
//! of every processing batch and runs each on its own task, bounded by a
//! counting semaphore. Batches are marked completed once drained.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::batch::BatchStatus;
use crate::broadcast::ItemProgressBroadcaster;
use crate::config::Config;
use crate::db::{batch_repo, item_repo, Database, DatabaseError};
use crate::item::ItemState;
use crate::pipeline::{BroadcastProgress, ItemPipeline};

pub struct BatchScheduler {
    db: Database,
    pipeline: Arc<ItemPipeline>,
    broadcaster: ItemProgressBroadcaster,
    poll_interval: Duration,
    max_concurrent: usize,
    slots: Arc<Semaphore>,
    shutdown: AtomicBool,
    wake: Notify,
}

impl BatchScheduler {
    pub fn new(
        pipeline: Arc<ItemPipeline>,
        broadcaster: ItemProgressBroadcaster,
        poll_interval: Duration,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            db: pipeline.database().clone(),
            pipeline,
            broadcaster,
            poll_interval,
            max_concurrent,
            slots: Arc::new(Semaphore::new(max_concurrent)),
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    pub fn from_config(
        config: &Config,
        pipeline: Arc<ItemPipeline>,
        broadcaster: ItemProgressBroadcaster,
    ) -> Self {
        Self::new(
            pipeline,
            broadcaster,
            config.scheduler.poll_interval(),
            config.scheduler.max_concurrent,
        )
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Spawns the polling loop on the current tokio runtime.
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move { scheduler.run_loop().await });
        SchedulerHandle {
            scheduler: Arc::clone(self),
            task,
        }
    }

    /// Runs the next cycle now instead of after the poll interval.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    fn is_stopping(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    async fn run_loop(&self) {
        log::info!(
            "Batch scheduler started (poll every {:?}, up to {} items at once)",
            self.poll_interval,
            self.max_concurrent
        );
        let mut tasks = JoinSet::new();

        while !self.is_stopping() {
            match self.cycle(&mut tasks).await {
                Ok(0) => {}
                Ok(started) => log::debug!("Scheduler cycle started {} items", started),
                Err(e) => log::error!("Scheduler cycle failed: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = self.wake.notified() => {},
            }
        }

        if !tasks.is_empty() {
            log::info!("Waiting for {} in-flight items", tasks.len());
        }
        while let Some(result) = tasks.join_next().await {
            Self::reap(result);
        }
        log::info!("Batch scheduler stopped");
    }

    /// One poll cycle. Returns how many item runs were started.
    async fn cycle(&self, tasks: &mut JoinSet<()>) -> Result<usize, DatabaseError> {
        while let Some(result) = tasks.try_join_next() {
            Self::reap(result);
        }

        let batches = batch_repo::list_by_status(&self.db, BatchStatus::Processing)?;
        let mut started = 0;

        'batches: for batch in &batches {
            let eligible = item_repo::fetch_eligible(&self.db, &batch.id, self.max_concurrent)?;
            for item in eligible {
                if self.is_stopping() {
                    break 'batches;
                }
                if self.pipeline.in_flight().is_active(&item.id) {
                    continue;
                }

                let Ok(permit) = Arc::clone(&self.slots).acquire_owned().await else {
                    break 'batches;
                };

                // The wait for a slot may have been long; cancellation stops new pulls.
                let still_processing = batch_repo::find_by_id(&self.db, &batch.id)?
                    .is_some_and(|b| b.status == BatchStatus::Processing);
                if !still_processing {
                    continue 'batches;
                }

                let Some(guard) = self.pipeline.in_flight().acquire(&item.id) else {
                    continue;
                };
                let eligible_now = item_repo::find_by_id(&self.db, &item.id)?
                    .is_some_and(|current| ItemState::ELIGIBLE.contains(&current.state));
                if !eligible_now {
                    continue;
                }

                let pipeline = Arc::clone(&self.pipeline);
                let progress = BroadcastProgress::new(self.broadcaster.track(&item.id, Some(&batch.id)));
                tasks.spawn(async move {
                    let _permit = permit;
                    match pipeline.run_claimed(&guard, &progress).await {
                        Ok(item) => log::debug!("Item {} finished at {}", item.id, item.state),
                        Err(e) => log::debug!("Item {} stopped: {}", guard.item_id(), e),
                    }
                });
                started += 1;
            }
        }

        for batch in &batches {
            if batch_repo::complete_if_drained(&self.db, &batch.id)? {
                log::info!("Batch {} completed", batch.id);
            }
        }
        Ok(started)
    }

    fn reap(result: Result<(), JoinError>) {
        if let Err(e) = result {
            log::error!("Item task ended abnormally: {}", e);
        }
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    scheduler: Arc<BatchScheduler>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn scheduler(&self) -> &Arc<BatchScheduler> {
        &self.scheduler
    }

    /// Stops pulling new items and waits for in-flight ones to finish.
    pub async fn stop(self) {
        self.scheduler.shutdown.store(true, Ordering::Release);
        self.scheduler.slots.close();
        self.scheduler.wake.notify_one();
        if let Err(e) = self.task.await {
            log::error!("Scheduler loop ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::collaborators::{Generation, GenerationError, GenerationRequest, GenerationTask};
    use crate::item::WorkItem;
    use crate::quality::CategoryValues;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Valid replies for every task, with a short delay to overlap runs.
    #[derive(Default)]
    struct Slow {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Generation for Slow {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let reply = match request.task {
                GenerationTask::Deidentify => json!({"deidentified_text": "טקסט", "overall_risk": "low"}),
                GenerationTask::Analyze => json!({
                    "subject_term": "שכר",
                    "key_facts": ["a"],
                    "legal_questions": ["b"],
                    "legal_principles": ["c"],
                }),
                GenerationTask::Draft => json!({"title": "שכר", "content_html": "<p>תוכן</p>"}),
            };
            Ok(reply.to_string())
        }
    }

    fn scheduler(items: usize, max_concurrent: usize) -> (Arc<BatchScheduler>, Arc<Slow>) {
        let mut config = Config::default();
        config.quality.thresholds = CategoryValues::uniform(0);
        let db = Database::open_in_memory().unwrap();
        let mut batch = Batch::new("b1", "batch");
        batch.status = BatchStatus::Processing;
        batch_repo::insert(&db, &batch).unwrap();
        for i in 0..items {
            let mut item = WorkItem::new(&format!("i{}", i), Some("b1"), "a.txt", &format!("h{}", i));
            item.state = ItemState::Extracted;
            item.progress = 5;
            item.cleaned_text = Some("טקסט מקורי".to_string());
            item_repo::insert(&db, &item).unwrap();
            item_repo::save(&db, &item).unwrap();
            batch_repo::increment_total(&db, "b1").unwrap();
        }

        let generator = Arc::new(Slow::default());
        let pipeline = Arc::new(ItemPipeline::from_config(&config, db, generator.clone()));
        let scheduler = BatchScheduler::new(
            pipeline,
            ItemProgressBroadcaster::new(100),
            Duration::from_millis(10),
            max_concurrent,
        );
        (Arc::new(scheduler), generator)
    }

    async fn drain(tasks: &mut JoinSet<()>) {
        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }
    }

    // ── Cycle ──

    #[tokio::test]
    async fn test_cycle_pulls_at_most_bound_per_batch() {
        let (scheduler, _) = scheduler(5, 2);
        let mut tasks = JoinSet::new();

        let started = scheduler.cycle(&mut tasks).await.unwrap();
        assert_eq!(started, 2);
        drain(&mut tasks).await;

        let batch = batch_repo::find_by_id(&scheduler.db, "b1").unwrap().unwrap();
        assert_eq!((batch.processed, batch.successful), (2, 2));
        assert_eq!(batch.status, BatchStatus::Processing);
    }

    #[tokio::test]
    async fn test_cycle_skips_items_already_in_flight() {
        let (scheduler, _) = scheduler(2, 3);
        let _held = scheduler.pipeline.claim("i0").unwrap();
        let mut tasks = JoinSet::new();

        assert_eq!(scheduler.cycle(&mut tasks).await.unwrap(), 1);
        drain(&mut tasks).await;
        let item = item_repo::find_by_id(&scheduler.db, "i0").unwrap().unwrap();
        assert_eq!(item.state, ItemState::Extracted);
    }

    #[tokio::test]
    async fn test_cancelled_batch_is_not_pulled() {
        let (scheduler, _) = scheduler(3, 3);
        batch_repo::transition(&scheduler.db, "b1", &[BatchStatus::Processing], BatchStatus::Cancelled)
            .unwrap();
        let mut tasks = JoinSet::new();

        assert_eq!(scheduler.cycle(&mut tasks).await.unwrap(), 0);
        let items = item_repo::list_by_batch(&scheduler.db, "b1").unwrap();
        assert!(items.iter().all(|i| i.state == ItemState::Extracted));
    }

    #[tokio::test]
    async fn test_drained_batch_is_completed() {
        let (scheduler, _) = scheduler(2, 3);
        let mut tasks = JoinSet::new();
        scheduler.cycle(&mut tasks).await.unwrap();
        drain(&mut tasks).await;

        assert_eq!(scheduler.cycle(&mut tasks).await.unwrap(), 0);
        let batch = batch_repo::find_by_id(&scheduler.db, "b1").unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert!(batch.completed_at.is_some());
    }

    // ── Loop ──

    #[tokio::test]
    async fn test_loop_drains_batch_within_bound() {
        let (scheduler, generator) = scheduler(10, 3);
        let handle = scheduler.start();

        let mut completed = false;
        for _ in 0..500 {
            let batch = batch_repo::find_by_id(&scheduler.db, "b1").unwrap().unwrap();
            if batch.status == BatchStatus::Completed {
                completed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;

        assert!(completed);
        let batch = batch_repo::find_by_id(&scheduler.db, "b1").unwrap().unwrap();
        assert_eq!(batch.processed, batch.total);
        assert_eq!(batch.successful, 10);
        assert!(generator.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_stop_without_work_returns() {
        let (scheduler, _) = scheduler(0, 1);
        let handle = scheduler.start();
        handle.stop().await;
        assert!(scheduler.is_stopping());
    }
}
