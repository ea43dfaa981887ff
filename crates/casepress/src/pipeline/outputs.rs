//! Typed views over the structured values the de-identify and analyze calls return.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chunker::{MergeRules, RiskLevel};

use super::PipelineError;

pub const DEIDENTIFY_MERGE: MergeRules = MergeRules {
    text_fields: &["deidentified_text"],
    ranked_fields: &["overall_risk"],
    note_fields: &["review_notes"],
};

/// Lists concatenate and scalars keep the first non-null value.
pub const ANALYSIS_MERGE: MergeRules = MergeRules {
    text_fields: &[],
    ranked_fields: &[],
    note_fields: &[],
};

pub const REQUIRED_ANALYSIS_FIELDS: [&str; 3] = ["key_facts", "legal_questions", "legal_principles"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedItem {
    #[serde(default)]
    pub original_category: String,
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub confidence: f64,
}

/// De-identification of a whole document, after chunk outputs are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Deidentification {
    pub text: String,
    pub identified_items: Vec<IdentifiedItem>,
    pub risk: RiskLevel,
    pub requires_review: bool,
    pub review_notes: Option<String>,
}

impl Deidentification {
    pub fn from_merged(value: &Value) -> Result<Self, PipelineError> {
        let text = value
            .get("deidentified_text")
            .and_then(Value::as_str)
            .map(str::trim_end)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PipelineError::malformed("missing deidentified_text"))?
            .to_string();

        let identified_items = value
            .get("identified_items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let risk = value
            .get("overall_risk")
            .and_then(Value::as_str)
            .map(RiskLevel::parse_lenient)
            .unwrap_or(RiskLevel::Medium);

        let flagged = value
            .get("requires_manual_review")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let review_notes = value
            .get("review_notes")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(Self {
            text,
            identified_items,
            risk,
            requires_review: flagged || risk == RiskLevel::High,
            review_notes,
        })
    }
}

/// Checks one chunk's de-identification output before it is merged.
pub fn check_deidentified_chunk(value: &Value) -> Result<(), PipelineError> {
    match value.get("deidentified_text").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(()),
        _ => Err(PipelineError::malformed("chunk response has no deidentified_text")),
    }
}

/// The analysis must carry non-empty arrays for every required field.
pub fn check_analysis(value: &Value) -> Result<(), PipelineError> {
    let missing: Vec<&str> = REQUIRED_ANALYSIS_FIELDS
        .iter()
        .copied()
        .filter(|field| {
            value
                .get(*field)
                .and_then(Value::as_array)
                .map_or(true, |items| items.is_empty())
        })
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::malformed(format!(
            "analysis missing {}",
            missing.join(", ")
        )))
    }
}

pub fn check_object(value: &Value) -> Result<(), PipelineError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(PipelineError::malformed("response is not an object"))
    }
}

/// Primary subject of the article: the analysis' own term, else its legal area.
pub fn subject_term(analysis: &Value) -> String {
    ["subject_term", "legal_area"]
        .iter()
        .filter_map(|key| analysis.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|term| !term.is_empty())
        .unwrap_or_default()
        .to_string()
}
