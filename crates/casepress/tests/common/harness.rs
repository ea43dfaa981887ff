//! Test harness for isolated pipeline runs.
//!
//! The `TestHarness` struct owns a temporary directory holding a real SQLite
//! database, a config, and a scripted generation fake, and builds the
//! services under test on top of them.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use casepress::batch::{Batch, BatchService, BatchStatus};
use casepress::broadcast::ItemProgressBroadcaster;
use casepress::collaborators::PlainTextExtractor;
use casepress::config::Config;
use casepress::db::{batch_repo, item_repo, Database};
use casepress::item::WorkItem;
use casepress::pipeline::ItemPipeline;
use casepress::worker::BatchScheduler;

use super::builders::ConfigBuilder;
use super::fakes::ScriptedGenerator;

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub db: Database,
    pub generator: Arc<ScriptedGenerator>,
}

impl TestHarness {
    /// Harness with permissive quality thresholds and valid canned replies.
    pub fn new() -> Self {
        Self::with_config(ConfigBuilder::new().build())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_parts(config, ScriptedGenerator::new())
    }

    pub fn with_parts(config: Config, generator: ScriptedGenerator) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("casepress.db"))
            .expect("Failed to open test database");
        Self {
            temp_dir,
            config,
            db,
            generator: Arc::new(generator),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("casepress.db")
    }

    pub fn pipeline(&self) -> ItemPipeline {
        ItemPipeline::from_config(&self.config, self.db.clone(), self.generator.clone())
    }

    /// Pipeline over the same database and generator with a different config.
    pub fn pipeline_with(&self, config: &Config) -> ItemPipeline {
        ItemPipeline::from_config(config, self.db.clone(), self.generator.clone())
    }

    pub fn batch_service(&self) -> BatchService {
        BatchService::new(self.db.clone(), Arc::new(PlainTextExtractor))
    }

    /// Scheduler with the configured bound and a short poll interval.
    pub fn scheduler(&self) -> Arc<BatchScheduler> {
        Arc::new(BatchScheduler::new(
            Arc::new(self.pipeline()),
            ItemProgressBroadcaster::new(100),
            Duration::from_millis(20),
            self.config.scheduler.max_concurrent,
        ))
    }

    pub fn seed_batch(&self, id: &str, status: BatchStatus) -> Batch {
        let mut batch = Batch::new(id, id);
        batch.status = status;
        batch_repo::insert(&self.db, &batch).expect("Failed to insert batch");
        batch
    }

    /// Inserts an item with all of its fields and counts it in its batch.
    pub fn seed_item(&self, item: &WorkItem) {
        item_repo::insert(&self.db, item).expect("Failed to insert item");
        item_repo::save(&self.db, item).expect("Failed to save item");
        if let Some(batch_id) = item.batch_id.as_deref() {
            batch_repo::increment_total(&self.db, batch_id).expect("Failed to count item");
        }
    }

    pub fn item(&self, id: &str) -> WorkItem {
        item_repo::find_by_id(&self.db, id)
            .expect("Failed to load item")
            .expect("Item not found")
    }

    pub fn batch(&self, id: &str) -> Batch {
        batch_repo::find_by_id(&self.db, id)
            .expect("Failed to load batch")
            .expect("Batch not found")
    }

    /// Polls until the batch reaches `status` or `timeout` elapses.
    pub async fn wait_for_batch(&self, id: &str, status: BatchStatus, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.batch(id).status == status {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.batch(id).status == status
    }
}
