//! Work items and the per-item state machine.

pub mod guard;
pub mod state;

pub use guard::{InFlightGuard, InFlightRegistry};
pub use state::{ItemState, Stage};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chunker::RiskLevel;
use crate::generation::ContentDraft;
use crate::quality::QualityReport;

/// One document moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub batch_id: Option<String>,
    pub filename: String,
    pub content_hash: String,
    pub state: ItemState,
    pub progress: u8,
    pub progress_message: String,
    pub failure_reason: Option<String>,

    // Extract
    pub raw_text: Option<String>,
    pub cleaned_text: Option<String>,

    // De-identify
    pub deidentified_text: Option<String>,
    pub privacy_risk: Option<RiskLevel>,
    pub requires_review: bool,
    pub review_notes: Option<String>,

    // Analyze
    pub analysis: Option<Value>,

    // Generate
    pub draft: Option<ContentDraft>,
    pub quality_report: Option<QualityReport>,
    /// Draft held back from `draft` because it failed the leak scan.
    pub review_draft: Option<ContentDraft>,

    // Publish
    pub external_ref: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(id: &str, batch_id: Option<&str>, filename: &str, content_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            batch_id: batch_id.map(str::to_string),
            filename: filename.to_string(),
            content_hash: content_hash.to_string(),
            state: ItemState::New,
            progress: 0,
            progress_message: String::new(),
            failure_reason: None,
            raw_text: None,
            cleaned_text: None,
            deidentified_text: None,
            privacy_risk: None,
            requires_review: false,
            review_notes: None,
            analysis: None,
            draft: None,
            quality_report: None,
            review_draft: None,
            external_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Drops every stage output produced after `target`, so the item holds
    /// exactly the data validated through that state.
    pub fn clear_after(&mut self, target: ItemState) {
        if !target.reached(ItemState::Extracted) {
            self.raw_text = None;
            self.cleaned_text = None;
        }
        if !target.reached(ItemState::Deidentified) {
            self.deidentified_text = None;
            self.privacy_risk = None;
            self.requires_review = false;
            self.review_notes = None;
        }
        if !target.reached(ItemState::Analyzed) {
            self.analysis = None;
        }
        if !target.reached(ItemState::Generated) {
            self.draft = None;
            self.quality_report = None;
            self.review_draft = None;
        }
        if !target.reached(ItemState::Published) {
            self.external_ref = None;
        }
        self.failure_reason = None;
        self.state = target;
        self.progress = target.progress_floor();
        self.progress_message = format!("Reset to {}", target);
    }

    /// Whether the output a state promises is actually present.
    pub fn has_output_for(&self, state: ItemState) -> bool {
        match state {
            ItemState::Extracted => self.cleaned_text.is_some(),
            ItemState::Deidentified => self.deidentified_text.is_some(),
            ItemState::Analyzed => self.analysis.is_some(),
            ItemState::Generated => self.draft.is_some(),
            ItemState::Published => self.external_ref.is_some(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finished_item() -> WorkItem {
        let mut item = WorkItem::new("i1", Some("b1"), "case.pdf", "abc");
        item.state = ItemState::Generated;
        item.progress = 95;
        item.raw_text = Some("raw".to_string());
        item.cleaned_text = Some("clean".to_string());
        item.deidentified_text = Some("anon".to_string());
        item.privacy_risk = Some(RiskLevel::High);
        item.requires_review = true;
        item.analysis = Some(json!({"key_facts": ["x"]}));
        item.draft = Some(ContentDraft::default());
        item
    }

    #[test]
    fn test_reset_to_extracted_clears_downstream() {
        let mut item = finished_item();
        item.clear_after(ItemState::Extracted);

        assert_eq!(item.state, ItemState::Extracted);
        assert_eq!(item.progress, 5);
        assert!(item.cleaned_text.is_some());
        assert!(item.deidentified_text.is_none());
        assert!(item.privacy_risk.is_none());
        assert!(!item.requires_review);
        assert!(item.analysis.is_none());
        assert!(item.draft.is_none());
        assert!(item.quality_report.is_none());
    }

    #[test]
    fn test_reset_to_analyzed_keeps_analysis() {
        let mut item = finished_item();
        item.clear_after(ItemState::Analyzed);
        assert!(item.analysis.is_some());
        assert!(item.deidentified_text.is_some());
        assert!(item.draft.is_none());
        assert!(item.has_output_for(ItemState::Analyzed));
        assert!(!item.has_output_for(ItemState::Generated));
    }

    #[test]
    fn test_reset_clears_failure_reason() {
        let mut item = finished_item();
        item.state = ItemState::Failed;
        item.failure_reason = Some("boom".to_string());
        item.clear_after(ItemState::Deidentified);
        assert!(item.failure_reason.is_none());
        assert_eq!(item.state, ItemState::Deidentified);
    }
}
