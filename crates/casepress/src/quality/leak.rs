use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::generation::ContentDraft;

struct LeakPattern {
    kind: &'static str,
    regex: Regex,
}

static PATTERNS: LazyLock<Vec<LeakPattern>> = LazyLock::new(|| {
    [
        ("identifier_number", r"\b\d{9}\b"),
        ("identifier_number", r"\b\d{3}-?\d{7}\b"),
        ("mobile_phone", r"\b05\d-?\d{7}\b"),
        ("landline_phone", r"\b0[2-9]-?\d{7}\b"),
        ("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
        ("ip_address", r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b"),
        ("payment_card", r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| LeakPattern {
        kind,
        regex: Regex::new(pattern).unwrap(),
    })
    .collect()
});

/// A residual personally-identifying pattern found in a public field.
///
/// Only the field and the pattern kind are recorded, never the matched value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakFinding {
    pub field: String,
    pub kind: String,
    pub count: usize,
}

impl std::fmt::Display for LeakFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in {} ({})", self.kind, self.field, self.count)
    }
}

/// Scans every field of a draft that readers will see.
pub fn scan(draft: &ContentDraft) -> Vec<LeakFinding> {
    let mut findings: Vec<LeakFinding> = Vec::new();
    for (field, value) in draft.public_fields() {
        for pattern in PATTERNS.iter() {
            let count = pattern.regex.find_iter(value).count();
            if count == 0 {
                continue;
            }
            match findings
                .iter_mut()
                .find(|f| f.field == field && f.kind == pattern.kind)
            {
                Some(existing) => existing.count += count,
                None => findings.push(LeakFinding {
                    field: field.to_string(),
                    kind: pattern.kind.to_string(),
                    count,
                }),
            }
        }
    }
    findings
}

/// Scans free text. De-identified stage output goes through this so an
/// item whose text still matches is flagged for manual review.
pub fn scan_text(field: &str, text: &str) -> Vec<LeakFinding> {
    PATTERNS
        .iter()
        .filter_map(|pattern| {
            let count = pattern.regex.find_iter(text).count();
            (count > 0).then(|| LeakFinding {
                field: field.to_string(),
                kind: pattern.kind.to_string(),
                count,
            })
        })
        .collect()
}

/// Replaces every match with `[redacted:<kind>]`.
pub fn redact(text: &str) -> String {
    let mut out = text.to_string();
    for pattern in PATTERNS.iter() {
        let replacement = format!("[redacted:{}]", pattern.kind);
        out = pattern
            .regex
            .replace_all(&out, regex::NoExpand(&replacement))
            .into_owned();
    }
    out
}
