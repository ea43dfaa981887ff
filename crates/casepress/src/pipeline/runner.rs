use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use crate::batch::ItemOutcome;
use crate::chunker::{merge_results, DocumentChunker};
use crate::collaborators::{Generation, GenerationError, GenerationRequest, PublishError, Publishing};
use crate::config::{Config, LeakPolicy};
use crate::db::{batch_repo, item_repo, Database};
use crate::generation::{prompts, GenerationInput, GenerationOrchestrator};
use crate::item::{InFlightGuard, InFlightRegistry, ItemState, Stage, WorkItem};
use crate::quality::leak;
use crate::repair;
use crate::sanitize;

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::outputs::{self, Deidentification};
use super::progress::{MonotoneProgress, ProgressEvent, ProgressReporter};

type ResponseCheck = fn(&Value) -> Result<(), PipelineError>;

fn short_hash(hash: &str) -> String {
    hash.chars().take(8).collect()
}

/// Drives one work item through de-identify, analyze and generate.
///
/// Every run holds the item's in-flight guard, so at most one run per item
/// is active. Stage outputs are written only after the stage validated them.
pub struct ItemPipeline {
    config: PipelineConfig,
    db: Database,
    generator: Arc<dyn Generation>,
    orchestrator: GenerationOrchestrator,
    publisher: Option<Arc<dyn Publishing>>,
    chunker: DocumentChunker,
    in_flight: InFlightRegistry,
}

impl ItemPipeline {
    /// Production constructor: builds the orchestrator from config.
    pub fn from_config(config: &Config, db: Database, generator: Arc<dyn Generation>) -> Self {
        let orchestrator = GenerationOrchestrator::from_config(Arc::clone(&generator), config);
        Self::new(PipelineConfig::from_config(config), db, generator, orchestrator)
    }

    pub fn new(
        config: PipelineConfig,
        db: Database,
        generator: Arc<dyn Generation>,
        orchestrator: GenerationOrchestrator,
    ) -> Self {
        let chunker = DocumentChunker::new(config.max_chunk_size);
        Self {
            config,
            db,
            generator,
            orchestrator,
            publisher: None,
            chunker,
            in_flight: InFlightRegistry::new(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publishing>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    /// Claims an item for one run.
    pub fn claim(&self, item_id: &str) -> Result<InFlightGuard, PipelineError> {
        self.in_flight
            .acquire(item_id)
            .ok_or_else(|| PipelineError::AlreadyInFlight(item_id.to_string()))
    }

    /// Runs every remaining stage until the item is GENERATED or FAILED.
    pub async fn run(
        &self,
        item_id: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<WorkItem, PipelineError> {
        let guard = self.claim(item_id)?;
        self.run_claimed(&guard, progress).await
    }

    /// Like [`run`](Self::run) for an item the caller has already claimed.
    pub async fn run_claimed(
        &self,
        guard: &InFlightGuard,
        progress: &dyn ProgressReporter,
    ) -> Result<WorkItem, PipelineError> {
        let item = self.load(guard.item_id())?;
        let span = tracing::info_span!(
            "item_pipeline",
            item_id = %item.id,
            content_hash = %short_hash(&item.content_hash),
        );
        self.drive(item, None, progress).instrument(span).await
    }

    /// Runs a single stage. The item must sit in the stage's prerequisite state.
    pub async fn run_stage(
        &self,
        item_id: &str,
        stage: Stage,
        progress: &dyn ProgressReporter,
    ) -> Result<WorkItem, PipelineError> {
        let guard = self.claim(item_id)?;
        let item = self.load(guard.item_id())?;
        let span = tracing::info_span!(
            "item_stage",
            item_id = %item.id,
            content_hash = %short_hash(&item.content_hash),
            stage = %stage,
        );
        self.drive(item, Some(stage), progress).instrument(span).await
    }

    async fn drive(
        &self,
        mut item: WorkItem,
        only: Option<Stage>,
        progress: &dyn ProgressReporter,
    ) -> Result<WorkItem, PipelineError> {
        let monotone = MonotoneProgress::new(progress, self.db.clone(), &item.id, item.progress);
        let result = match only {
            Some(stage) => self.run_one(&mut item, stage, &monotone).await,
            None => self.run_remaining(&mut item, &monotone).await,
        };

        match result {
            Ok(()) => {
                if item.state == ItemState::Generated {
                    self.complete(&item, &monotone)?;
                }
                Ok(item)
            }
            Err(e) if e.is_guard_violation() => {
                log::error!("State guard violation on item {}: {}", item.id, e);
                Err(e)
            }
            Err(e) => {
                if let Err(db_err) = self.fail(&mut item, &e, &monotone) {
                    log::error!("Failed to record failure of item {}: {}", item.id, db_err);
                }
                Err(e)
            }
        }
    }

    async fn run_remaining(
        &self,
        item: &mut WorkItem,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        if !ItemState::ELIGIBLE.contains(&item.state) {
            return Err(PipelineError::StateGuardViolation {
                item_id: item.id.clone(),
                from: item.state,
                to: item.state.next().unwrap_or(ItemState::Failed),
            });
        }
        for stage in [Stage::Deidentify, Stage::Analyze, Stage::Generate] {
            if item.state == stage.prerequisite() {
                self.run_one(item, stage, progress).await?;
            }
        }
        Ok(())
    }

    async fn run_one(
        &self,
        item: &mut WorkItem,
        stage: Stage,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        match stage {
            Stage::Deidentify => self.deidentify(item, progress).await,
            Stage::Analyze => self.analyze(item, progress).await,
            Stage::Generate => self.generate(item, progress).await,
            // Extraction happens at upload; publishing goes through `publish`.
            Stage::Extract | Stage::Publish => Err(PipelineError::StateGuardViolation {
                item_id: item.id.clone(),
                from: item.state,
                to: stage.done(),
            }),
        }
    }

    // ── Stages ──

    async fn deidentify(
        &self,
        item: &mut WorkItem,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        self.enter(item, Stage::Deidentify, progress)?;
        let text = Self::input(item, item.cleaned_text.as_deref(), Stage::Deidentify)?;

        let chunks = self.chunker.split(&text);
        let total = chunks.len();
        let (start, end) = Stage::Deidentify.progress_range();
        let span = usize::from(end - start);

        let mut results = Vec::with_capacity(total);
        for chunk in &chunks {
            let percent = start + (chunk.index * span / total) as u8;
            progress.report(ProgressEvent::advanced(
                ItemState::Deidentifying,
                percent,
                format!("De-identifying part {}/{}", chunk.index + 1, total),
            ));
            let request = prompts::deidentify_request(&chunk.text, chunk.index, total);
            results.push(
                self.call_structured(&request, outputs::check_deidentified_chunk)
                    .await?,
            );
        }

        let merged = merge_results(&chunks, &results, &outputs::DEIDENTIFY_MERGE);
        let result = Deidentification::from_merged(&merged)?;
        tracing::info!(
            chunks = total,
            risk = result.risk.as_str(),
            identified = result.identified_items.len(),
            "de-identified"
        );

        let residual = leak::scan_text("deidentified_text", &result.text);
        let mut review_notes = result.review_notes;
        if !residual.is_empty() {
            let listed: Vec<String> = residual.iter().map(ToString::to_string).collect();
            log::warn!("Item {} still matches personal data patterns after de-identification", item.id);
            let note = format!("Residual personal data patterns: {}", listed.join(", "));
            review_notes = Some(match review_notes.filter(|n| !n.trim().is_empty()) {
                Some(existing) => format!("{}\n{}", existing, note),
                None => note,
            });
        }

        item.deidentified_text = Some(result.text);
        item.privacy_risk = Some(result.risk);
        item.requires_review = result.requires_review || !residual.is_empty();
        item.review_notes = review_notes;
        self.finish(item, Stage::Deidentify, "De-identification complete", progress)
    }

    async fn analyze(
        &self,
        item: &mut WorkItem,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        self.enter(item, Stage::Analyze, progress)?;
        let text = Self::input(item, item.deidentified_text.as_deref(), Stage::Analyze)?;

        let chunks = self.chunker.split(&text);
        let analysis = if chunks.len() == 1 {
            let request = prompts::analyze_request(&text, None);
            self.call_structured(&request, outputs::check_analysis).await?
        } else {
            let total = chunks.len();
            let mut results = Vec::with_capacity(total);
            for chunk in &chunks {
                let request = prompts::analyze_request(&chunk.text, Some((chunk.index, total)));
                results.push(self.call_structured(&request, outputs::check_object).await?);
            }
            merge_results(&chunks, &results, &outputs::ANALYSIS_MERGE)
        };
        progress.report(ProgressEvent::advanced(ItemState::Analyzing, 50, "Analysis received"));

        outputs::check_analysis(&analysis)?;
        progress.report(ProgressEvent::advanced(ItemState::Analyzing, 55, "Analysis validated"));

        item.analysis = Some(analysis);
        self.finish(item, Stage::Analyze, "Analysis complete", progress)
    }

    async fn generate(
        &self,
        item: &mut WorkItem,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        self.enter(item, Stage::Generate, progress)?;
        let analysis = item.analysis.clone().ok_or_else(|| PipelineError::MissingInput {
            item_id: item.id.clone(),
            stage: Stage::Generate,
        })?;

        let input = GenerationInput {
            item_id: item.id.clone(),
            subject_term: outputs::subject_term(&analysis),
            context: analysis,
        };
        match self.orchestrator.run(&input, progress).await {
            Ok(outcome) => {
                tracing::info!(
                    attempts = outcome.attempts,
                    overall = outcome.report.overall_score,
                    "draft accepted"
                );
                item.draft = Some(outcome.draft);
                item.quality_report = Some(outcome.report);
                item.review_draft = None;
                self.finish(item, Stage::Generate, "Draft generated", progress)
            }
            Err(failure) => {
                let leaked = matches!(failure.error, PipelineError::PrivacyLeakDetected { .. });
                item.quality_report = failure.last_report;
                item.review_draft = match (leaked, self.config.leak_policy) {
                    (true, LeakPolicy::DiscardDraft) => None,
                    _ => failure.last_draft,
                };
                Err(failure.error)
            }
        }
    }

    // ── Publishing ──

    /// Hands a GENERATED item to the publishing collaborator. A failed
    /// publish leaves the item GENERATED so it can be retried.
    pub async fn publish(&self, item_id: &str) -> Result<WorkItem, PipelineError> {
        let publisher = self.publisher.as_ref().ok_or_else(|| {
            PipelineError::Publish(PublishError::Rejected(
                "no publishing collaborator configured".to_string(),
            ))
        })?;
        let guard = self.claim(item_id)?;
        let mut item = self.load(guard.item_id())?;

        if item.state != ItemState::Generated {
            return Err(PipelineError::StateGuardViolation {
                item_id: item.id,
                from: item.state,
                to: ItemState::Published,
            });
        }
        let draft = item.draft.clone().ok_or_else(|| PipelineError::MissingInput {
            item_id: item.id.clone(),
            stage: Stage::Publish,
        })?;

        let mut findings: Vec<String> = item
            .quality_report
            .iter()
            .flat_map(|report| report.leaks.iter().map(ToString::to_string))
            .collect();
        if findings.is_empty() {
            findings = leak::scan(&draft).iter().map(ToString::to_string).collect();
        }
        if !findings.is_empty() {
            log::warn!("Refusing to publish item {}: personal data detected", item.id);
            return Err(PipelineError::PrivacyLeakDetected { findings });
        }

        let reference = publisher
            .publish(&item.id, &draft)
            .instrument(tracing::info_span!(
                "publish",
                item_id = %item.id,
                draft_hash = %sanitize::hash_text(&draft.content_html),
            ))
            .await?;

        let (_, end) = Stage::Publish.progress_range();
        item.external_ref = Some(reference);
        item.state = ItemState::Published;
        item.progress = end;
        item.progress_message = "Published".to_string();
        if !item_repo::save_if_state(&self.db, &item, ItemState::Generated)? {
            return Err(PipelineError::StateGuardViolation {
                item_id: item.id,
                from: ItemState::Generated,
                to: ItemState::Published,
            });
        }
        log::info!("Published item {}", item.id);
        Ok(item)
    }

    // ── Administration ──

    /// Rolls an item back to `target`, dropping every later stage output.
    /// A counted outcome is taken back from the batch so the rerun is
    /// counted once.
    pub fn reset(&self, item_id: &str, target: ItemState) -> Result<WorkItem, PipelineError> {
        let guard = self.claim(item_id)?;
        let mut item = self.load(guard.item_id())?;

        let allowed = target.is_reset_target()
            && (item.state == ItemState::Failed || item.state.reached(target))
            && item.has_output_for(target);
        if !allowed {
            return Err(PipelineError::StateGuardViolation {
                item_id: item.id,
                from: item.state,
                to: target,
            });
        }

        let previous = item.state;
        let counted = match previous {
            ItemState::Failed => Some(ItemOutcome::Failed),
            ItemState::Generated | ItemState::Published => Some(ItemOutcome::Succeeded),
            _ => None,
        };

        item.clear_after(target);
        if !item_repo::save_if_state(&self.db, &item, previous)? {
            return Err(PipelineError::StateGuardViolation {
                item_id: item.id,
                from: previous,
                to: target,
            });
        }

        if let (Some(outcome), Some(batch_id)) = (counted, item.batch_id.as_deref()) {
            if target != ItemState::Generated {
                batch_repo::revert_outcome(&self.db, batch_id, outcome)?;
                batch_repo::reopen(&self.db, batch_id)?;
            }
        }
        log::info!("Reset item {} from {} to {}", item.id, previous, target);
        Ok(item)
    }

    // ── Helpers ──

    fn load(&self, item_id: &str) -> Result<WorkItem, PipelineError> {
        item_repo::find_by_id(&self.db, item_id)?
            .ok_or_else(|| PipelineError::ItemNotFound(item_id.to_string()))
    }

    fn input(item: &WorkItem, text: Option<&str>, stage: Stage) -> Result<String, PipelineError> {
        text.filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::MissingInput {
                item_id: item.id.clone(),
                stage,
            })
    }

    /// Moves the item into the stage's running state.
    fn enter(
        &self,
        item: &mut WorkItem,
        stage: Stage,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let running = stage.running().unwrap_or(stage.done());
        if !item.state.can_transition_to(running) {
            return Err(PipelineError::StateGuardViolation {
                item_id: item.id.clone(),
                from: item.state,
                to: running,
            });
        }

        let (start, _) = stage.progress_range();
        let message = format!("Starting {}", stage);
        if !item_repo::transition(&self.db, &item.id, item.state, running, start, &message)? {
            let stored = item_repo::find_by_id(&self.db, &item.id)?
                .map(|i| i.state)
                .unwrap_or(item.state);
            return Err(PipelineError::StateGuardViolation {
                item_id: item.id.clone(),
                from: stored,
                to: running,
            });
        }

        item.state = running;
        item.progress = item.progress.max(start);
        item.progress_message = message.clone();
        progress.report(ProgressEvent::advanced(running, start, message));
        Ok(())
    }

    /// Persists the stage output and its done state in one guarded write.
    fn finish(
        &self,
        item: &mut WorkItem,
        stage: Stage,
        message: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let running = item.state;
        let done = stage.done();
        let (_, end) = stage.progress_range();

        item.state = done;
        item.progress = item.progress.max(end);
        item.progress_message = message.to_string();
        if !item_repo::save_if_state(&self.db, item, running)? {
            return Err(PipelineError::StateGuardViolation {
                item_id: item.id.clone(),
                from: running,
                to: done,
            });
        }
        progress.report(ProgressEvent::advanced(done, end, message));
        Ok(())
    }

    fn complete(&self, item: &WorkItem, progress: &dyn ProgressReporter) -> Result<(), PipelineError> {
        progress.report(ProgressEvent::Completed { state: item.state });
        if let Some(batch_id) = item.batch_id.as_deref() {
            batch_repo::record_outcome(&self.db, batch_id, ItemOutcome::Succeeded, None)?;
        }
        log::info!("Item {} reached {}", item.id, item.state);
        Ok(())
    }

    fn fail(
        &self,
        item: &mut WorkItem,
        error: &PipelineError,
        progress: &MonotoneProgress<'_>,
    ) -> Result<(), PipelineError> {
        let reason = error.to_string();
        let expected = item.state;

        item.state = ItemState::Failed;
        item.failure_reason = Some(reason.clone());
        item.progress_message = reason.clone();
        item.progress = progress.current();
        if !item_repo::save_if_state(&self.db, item, expected)? {
            item_repo::mark_failed(&self.db, &item.id, &reason)?;
        }

        progress.report(ProgressEvent::Failed {
            percent: progress.current(),
            error: reason.clone(),
        });
        log::warn!("Item {} failed: {}", item.id, sanitize::preview(&reason, 200));

        if let Some(batch_id) = item.batch_id.as_deref() {
            batch_repo::record_outcome(
                &self.db,
                batch_id,
                ItemOutcome::Failed,
                Some((&item.id, &reason)),
            )?;
        }
        Ok(())
    }

    /// One structured call with the attempt bound applied to transient and
    /// malformed responses.
    async fn call_structured(
        &self,
        request: &GenerationRequest,
        check: ResponseCheck,
    ) -> Result<Value, PipelineError> {
        let mut last_error = None;
        for attempt in 1..=self.config.max_attempts {
            match self.call_once(request, check).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::warn!(
                        "{:?} call attempt {}/{} failed: {}",
                        request.task,
                        attempt,
                        self.config.max_attempts,
                        sanitize::preview(&e.to_string(), 200)
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| PipelineError::malformed("no attempt was made")))
    }

    async fn call_once(
        &self,
        request: &GenerationRequest,
        check: ResponseCheck,
    ) -> Result<Value, PipelineError> {
        let text = tokio::time::timeout(self.config.call_timeout, self.generator.generate(request))
            .await
            .map_err(|_| GenerationError::Timeout(self.config.call_timeout))??;
        let value = repair::parse(&text)
            .ok_or_else(|| PipelineError::malformed("response could not be repaired"))?;
        check(&value)?;
        Ok(value)
    }
}
