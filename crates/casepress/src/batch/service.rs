use std::sync::Arc;

use chrono::Utc;
use tracing::Instrument;

use super::{Batch, BatchError, BatchErrorEntry, BatchStatistics, BatchStatus, ItemOutcome};
use crate::collaborators::{DocumentKind, TextExtraction};
use crate::db::{batch_repo, item_repo, Database};
use crate::item::{ItemState, Stage, WorkItem};
use crate::sanitize;
use crate::text::clean_text;

pub const MAX_ITEMS_PER_BATCH: usize = 50;

/// What happened to one uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// A new item reached EXTRACTED.
    Extracted { item_id: String },
    /// Same content already in the batch; counted as skipped.
    Duplicate { existing_item_id: String },
    /// A new item was created but extraction failed; counted as failed.
    Failed { item_id: String, reason: String },
    /// Another writer moved the item while its text was being extracted.
    /// The extracted text was not stored; a failed item is counted as failed.
    Superseded { item_id: String, state: ItemState },
}

/// Batch lifecycle: create, fill, start, cancel and report.
pub struct BatchService {
    db: Database,
    extractor: Arc<dyn TextExtraction>,
}

impl BatchService {
    pub fn new(db: Database, extractor: Arc<dyn TextExtraction>) -> Self {
        Self { db, extractor }
    }

    pub fn create_batch(&self, name: Option<&str>) -> Result<Batch, BatchError> {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => Utc::now().format("Batch %Y-%m-%d %H:%M").to_string(),
        };
        let batch = Batch::new(&uuid::Uuid::new_v4().to_string(), &name);
        batch_repo::insert(&self.db, &batch)?;
        log::info!("Created batch {} ({})", batch.id, batch.name);
        Ok(batch)
    }

    pub fn get_batch(&self, id: &str) -> Result<Batch, BatchError> {
        batch_repo::find_by_id(&self.db, id)?.ok_or_else(|| BatchError::NotFound(id.to_string()))
    }

    /// Adds one document to a pending batch and extracts its text.
    ///
    /// Every path counts the document exactly once in `total` and, unless
    /// extraction succeeds, once in `processed`.
    pub async fn add_document(
        &self,
        batch_id: &str,
        filename: &str,
        content: &[u8],
        kind: DocumentKind,
    ) -> Result<UploadOutcome, BatchError> {
        let batch = self.get_batch(batch_id)?;
        if batch.status != BatchStatus::Pending {
            return Err(BatchError::InvalidStatus {
                id: batch.id,
                status: batch.status,
                operation: "add documents to",
            });
        }
        if batch.total as usize >= MAX_ITEMS_PER_BATCH {
            return Err(BatchError::Full {
                max: MAX_ITEMS_PER_BATCH,
            });
        }

        let content_hash = sanitize::hash_bytes(content);
        if let Some(existing) = item_repo::find_by_hash(&self.db, batch_id, &content_hash)? {
            let reason = format!("Duplicate of item {}", existing.id);
            batch_repo::record_skipped_upload(&self.db, batch_id, filename, &reason)?;
            log::info!("Skipped duplicate upload in batch {}: {}", batch_id, reason);
            return Ok(UploadOutcome::Duplicate {
                existing_item_id: existing.id,
            });
        }

        let item = WorkItem::new(
            &uuid::Uuid::new_v4().to_string(),
            Some(batch_id),
            filename,
            &content_hash,
        );
        item_repo::insert(&self.db, &item)?;
        batch_repo::increment_total(&self.db, batch_id)?;

        let span = tracing::info_span!("extract", item_id = %item.id, content_hash = %content_hash);
        self.extract(item, content, kind).instrument(span).await
    }

    async fn extract(
        &self,
        mut item: WorkItem,
        content: &[u8],
        kind: DocumentKind,
    ) -> Result<UploadOutcome, BatchError> {
        let (start, end) = Stage::Extract.progress_range();
        item_repo::transition(
            &self.db,
            &item.id,
            ItemState::New,
            ItemState::Extracting,
            start,
            "Extracting text",
        )?;

        match self.extractor.extract(content, kind).await {
            Ok(raw) => {
                let cleaned = clean_text(&raw);
                item.raw_text = Some(raw);
                item.cleaned_text = Some(cleaned);
                item.state = ItemState::Extracted;
                item.progress = end;
                item.progress_message = "Text extracted".to_string();
                if !item_repo::save_if_state(&self.db, &item, ItemState::Extracting)? {
                    let state = item_repo::find_by_id(&self.db, &item.id)?
                        .map_or(ItemState::Extracting, |stored| stored.state);
                    log::warn!(
                        "Item {} moved to {} during extraction; extracted text dropped",
                        item.id,
                        state
                    );
                    if state == ItemState::Failed {
                        if let Some(batch_id) = item.batch_id.as_deref() {
                            batch_repo::record_outcome(
                                &self.db,
                                batch_id,
                                ItemOutcome::Failed,
                                Some((&item.id, "state changed during extraction")),
                            )?;
                        }
                    }
                    return Ok(UploadOutcome::Superseded {
                        item_id: item.id,
                        state,
                    });
                }
                tracing::debug!("extracted text");
                Ok(UploadOutcome::Extracted { item_id: item.id })
            }
            Err(e) => {
                let reason = e.to_string();
                log::warn!("Extraction failed for item {}: {}", item.id, reason);
                item_repo::mark_failed(&self.db, &item.id, &reason)?;
                if let Some(batch_id) = item.batch_id.as_deref() {
                    batch_repo::record_outcome(
                        &self.db,
                        batch_id,
                        ItemOutcome::Failed,
                        Some((&item.id, &reason)),
                    )?;
                }
                Ok(UploadOutcome::Failed {
                    item_id: item.id,
                    reason,
                })
            }
        }
    }

    /// Hands a pending, non-empty batch to the scheduler.
    pub fn start_batch(&self, id: &str) -> Result<Batch, BatchError> {
        let batch = self.get_batch(id)?;
        if batch.status != BatchStatus::Pending {
            return Err(BatchError::InvalidStatus {
                id: batch.id,
                status: batch.status,
                operation: "start",
            });
        }
        if batch.total == 0 {
            return Err(BatchError::Empty(batch.id));
        }
        if !batch_repo::transition(&self.db, id, &[BatchStatus::Pending], BatchStatus::Processing)? {
            let current = self.get_batch(id)?;
            return Err(BatchError::InvalidStatus {
                id: current.id,
                status: current.status,
                operation: "start",
            });
        }
        log::info!("Started batch {} with {} documents", id, batch.total);
        self.get_batch(id)
    }

    /// Cancels a pending or processing batch. Items already running finish;
    /// the returned count is the eligible items that will not be picked up.
    pub fn cancel_batch(&self, id: &str) -> Result<usize, BatchError> {
        let batch = self.get_batch(id)?;
        if batch.is_terminal() {
            return Err(BatchError::InvalidStatus {
                id: batch.id,
                status: batch.status,
                operation: "cancel",
            });
        }
        let abandoned = item_repo::count_in_states(&self.db, id, &ItemState::ELIGIBLE)?;
        let cancelled = batch_repo::transition(
            &self.db,
            id,
            &[BatchStatus::Pending, BatchStatus::Processing],
            BatchStatus::Cancelled,
        )?;
        if !cancelled {
            let current = self.get_batch(id)?;
            return Err(BatchError::InvalidStatus {
                id: current.id,
                status: current.status,
                operation: "cancel",
            });
        }
        log::info!("Cancelled batch {} ({} items not started)", id, abandoned);
        Ok(abandoned)
    }

    pub fn items(&self, id: &str) -> Result<Vec<WorkItem>, BatchError> {
        Ok(item_repo::list_by_batch(&self.db, id)?)
    }

    pub fn errors(&self, id: &str) -> Result<Vec<BatchErrorEntry>, BatchError> {
        Ok(batch_repo::errors_for(&self.db, id)?)
    }

    pub fn statistics(&self) -> Result<BatchStatistics, BatchError> {
        Ok(batch_repo::statistics(&self.db)?)
    }
}
