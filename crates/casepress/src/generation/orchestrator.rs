//! Bounded generate, score and retry loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::collaborators::{Generation, GenerationError, GenerationRequest};
use crate::config::Config;
use crate::item::{ItemState, Stage};
use crate::pipeline::{PipelineError, ProgressEvent, ProgressReporter};
use crate::quality::{DraftMetadata, ImprovementHint, QualityGate, QualityReport};
use crate::repair;

use super::draft::ContentDraft;
use super::postprocess::PostProcessor;
use super::prompts;

/// What a draft is generated from.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub item_id: String,
    pub subject_term: String,
    /// Structured analysis of the source document.
    pub context: Value,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub draft: ContentDraft,
    pub report: QualityReport,
    pub attempts: u32,
}

/// Terminal failure, with the last scored draft for human review.
#[derive(Debug)]
pub struct GenerationFailure {
    pub error: PipelineError,
    pub last_draft: Option<ContentDraft>,
    pub last_report: Option<QualityReport>,
    pub attempts: u32,
}

impl std::fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

pub struct GenerationOrchestrator {
    generator: Arc<dyn Generation>,
    gate: QualityGate,
    post: PostProcessor,
    max_attempts: u32,
    call_timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(
        generator: Arc<dyn Generation>,
        gate: QualityGate,
        post: PostProcessor,
        max_attempts: u32,
        call_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            gate,
            post,
            max_attempts: max_attempts.max(1),
            call_timeout,
        }
    }

    pub fn from_config(generator: Arc<dyn Generation>, config: &Config) -> Self {
        Self::new(
            generator,
            QualityGate::new(&config.quality),
            PostProcessor::new(&config.postprocess, &config.quality.lexicon),
            config.generation.max_attempts,
            config.generation.call_timeout(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs up to `max_attempts` attempts. Returns the first draft that
    /// passes the gate; a leak ends the loop at once.
    pub async fn run(
        &self,
        input: &GenerationInput,
        progress: &dyn ProgressReporter,
    ) -> Result<GenerationOutcome, GenerationFailure> {
        let metadata = DraftMetadata {
            subject_term: input.subject_term.clone(),
        };
        let mut hints: Vec<ImprovementHint> = Vec::new();
        let mut last_draft = None;
        let mut last_report = None;
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            let request = prompts::draft_request(&input.context, &input.subject_term, &hints);
            let message = match self.attempt(&request, &input.subject_term).await {
                Err(e) => {
                    log::warn!(
                        "Draft attempt {}/{} for item {} failed: {}",
                        attempt,
                        self.max_attempts,
                        input.item_id,
                        e
                    );
                    let message = format!("Attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    last_error = Some(e);
                    message
                }
                Ok(draft) => {
                    let report = self.gate.score(&draft, &metadata);
                    tracing::debug!(
                        attempt,
                        overall = report.overall_score,
                        passed = report.passed,
                        "scored draft"
                    );

                    if report.has_leak() {
                        let findings = report.leaks.iter().map(ToString::to_string).collect();
                        self.report_attempt(progress, attempt, "Personal data detected in draft");
                        return Err(GenerationFailure {
                            error: PipelineError::PrivacyLeakDetected { findings },
                            last_draft: Some(draft),
                            last_report: Some(report),
                            attempts: attempt,
                        });
                    }

                    if report.passed {
                        self.report_attempt(progress, attempt, "Draft passed the quality gate");
                        return Ok(GenerationOutcome {
                            draft,
                            report,
                            attempts: attempt,
                        });
                    }

                    hints = report.failing_hints();
                    let message = format!(
                        "Attempt {}/{} below threshold in {} categories",
                        attempt,
                        self.max_attempts,
                        hints.len()
                    );
                    last_error = Some(PipelineError::QualityGateFailure {
                        attempts: attempt,
                        gaps: hints.clone(),
                    });
                    last_draft = Some(draft);
                    last_report = Some(report);
                    message
                }
            };
            self.report_attempt(progress, attempt, &message);
        }

        let error = last_error.unwrap_or_else(|| PipelineError::malformed("no attempt was made"));
        Err(GenerationFailure {
            error,
            last_draft,
            last_report,
            attempts: self.max_attempts,
        })
    }

    async fn attempt(
        &self,
        request: &GenerationRequest,
        subject_term: &str,
    ) -> Result<ContentDraft, PipelineError> {
        let text = tokio::time::timeout(self.call_timeout, self.generator.generate(request))
            .await
            .map_err(|_| GenerationError::Timeout(self.call_timeout))??;

        let mut draft: ContentDraft = repair::parse_as(&text)
            .ok_or_else(|| PipelineError::malformed("response does not contain a draft object"))?;
        if draft.title.trim().is_empty() || draft.content_html.trim().is_empty() {
            return Err(PipelineError::malformed("draft is missing its title or content"));
        }

        self.post.apply(&mut draft, subject_term);
        Ok(draft)
    }

    fn report_attempt(&self, progress: &dyn ProgressReporter, attempt: u32, message: &str) {
        let (start, end) = Stage::Generate.progress_range();
        let span = u32::from(end - start);
        let percent = start + (span * attempt / self.max_attempts) as u8;
        progress.report(ProgressEvent::advanced(ItemState::Generating, percent, message));
    }
}
