//! Builders for configs, items and canned model replies.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::json;

use casepress::config::{Config, LeakPolicy};
use casepress::item::{ItemState, WorkItem};
use casepress::quality::CategoryValues;

/// De-identification reply for one chunk.
pub fn deidentified_json(text: &str, risk: &str) -> String {
    json!({
        "deidentified_text": text,
        "identified_items": [
            {"original_category": "name", "replacement": "[שם הוסר]", "confidence": 0.9}
        ],
        "overall_risk": risk,
        "requires_manual_review": false,
        "review_notes": "",
    })
    .to_string()
}

/// Analysis reply with every required list filled.
pub fn analysis_json(subject_term: &str) -> String {
    json!({
        "subject_term": subject_term,
        "legal_area": "דיני עבודה",
        "key_facts": ["העובד פוטר ללא שימוע"],
        "legal_questions": ["האם הפיטורים היו כדין"],
        "legal_principles": ["חובת עריכת שימוע לפני פיטורים"],
        "court_decision": "התביעה התקבלה",
        "relevant_laws": [{"name": "חוק פיצויי פיטורים", "section": "12"}],
    })
    .to_string()
}

pub fn draft_json(title: &str, content_html: &str) -> String {
    json!({
        "title": title,
        "meta_description": "סקירה של פסק דין בנושא פיטורים",
        "content_html": content_html,
        "focus_keyword": "פיצויי פיטורים",
        "faq_items": [{"question": "מתי מגיעים פיצויים?", "answer": "לאחר שנת עבודה."}],
    })
    .to_string()
}

/// Builder for test `Config` instances. Quality thresholds default to zero
/// so canned drafts pass the gate.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.quality.thresholds = CategoryValues::uniform(0);
        config.scheduler.poll_interval_secs = 1;
        Self { config }
    }

    pub fn thresholds(mut self, threshold: u8) -> Self {
        self.config.quality.thresholds = CategoryValues::uniform(threshold);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.generation.max_attempts = attempts;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation.call_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.config.chunking.max_chunk_size = size;
        self
    }

    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.scheduler.max_concurrent = max;
        self
    }

    pub fn leak_policy(mut self, policy: LeakPolicy) -> Self {
        self.config.privacy.leak_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Builder for `WorkItem` rows seeded directly into the database.
pub struct ItemBuilder {
    item: WorkItem,
}

impl ItemBuilder {
    pub fn new(id: &str) -> Self {
        let mut item = WorkItem::new(id, None, &format!("{}.txt", id), id);
        item.state = ItemState::Extracted;
        item.progress = ItemState::Extracted.progress_floor();
        item.raw_text = Some("העובד ישראל ישראלי פוטר מעבודתו".to_string());
        item.cleaned_text = item.raw_text.clone();
        Self { item }
    }

    pub fn batch(mut self, batch_id: &str) -> Self {
        self.item.batch_id = Some(batch_id.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.item.raw_text = Some(text.to_string());
        self.item.cleaned_text = Some(text.to_string());
        self
    }

    pub fn state(mut self, state: ItemState) -> Self {
        self.item.state = state;
        self.item.progress = state.progress_floor();
        self
    }

    pub fn build(self) -> WorkItem {
        self.item
    }
}
