//! Quality gate: scores a draft per category and renders the pass/fail verdict.

mod category;
pub mod checks;
pub mod leak;

pub use category::{Category, CategoryValues};
pub use checks::{CheckResult, CheckSuite, Severity};
pub use leak::LeakFinding;

use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;
use crate::generation::ContentDraft;

/// Facts about the item that the checks need alongside the draft.
#[derive(Debug, Clone, Default)]
pub struct DraftMetadata {
    /// Primary subject term; used as the focus keyword when the draft has none.
    pub subject_term: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Excellent,
    Good,
    NeedsImprovement,
    Poor,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            QualityLevel::Excellent
        } else if score >= 70.0 {
            QualityLevel::Good
        } else if score >= 50.0 {
            QualityLevel::NeedsImprovement
        } else {
            QualityLevel::Poor
        }
    }
}

/// A failing category and how far it is from its bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovementHint {
    pub category: Category,
    pub observed: u8,
    pub threshold: u8,
}

impl ImprovementHint {
    pub fn delta(&self) -> u8 {
        self.threshold.saturating_sub(self.observed)
    }
}

impl std::fmt::Display for ImprovementHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}/{} (-{})",
            self.category,
            self.observed,
            self.threshold,
            self.delta()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub checks: Vec<CheckResult>,
    pub category_scores: CategoryValues<u8>,
    pub thresholds: CategoryValues<u8>,
    pub category_passed: CategoryValues<bool>,
    pub overall_score: f64,
    pub level: QualityLevel,
    pub leaks: Vec<LeakFinding>,
    /// Gate verdict: every category at or above its threshold and no leak.
    pub passed: bool,
    pub ready_to_publish: bool,
    pub critical_issues: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl QualityReport {
    pub fn has_leak(&self) -> bool {
        !self.leaks.is_empty()
    }

    /// Categories below their threshold, in fixed category order.
    pub fn failing_hints(&self) -> Vec<ImprovementHint> {
        self.category_passed
            .iter()
            .filter(|(_, passed)| !passed)
            .map(|(category, _)| ImprovementHint {
                category,
                observed: self.category_scores.get(category),
                threshold: self.thresholds.get(category),
            })
            .collect()
    }
}

pub struct QualityGate {
    thresholds: CategoryValues<u8>,
    weights: CategoryValues<f64>,
    suite: CheckSuite,
}

impl QualityGate {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            weights: config.weights,
            suite: CheckSuite::new(config),
        }
    }

    pub fn thresholds(&self) -> &CategoryValues<u8> {
        &self.thresholds
    }

    /// Runs every check and the leak scan over a draft.
    pub fn score(&self, draft: &ContentDraft, metadata: &DraftMetadata) -> QualityReport {
        let checks = self.suite.run(draft, metadata);
        let leaks = leak::scan(draft);
        self.assemble(checks, leaks)
    }

    /// Aggregates check results into a report and decides the verdict.
    ///
    /// A category with no checks scores 0. The overall score is informational;
    /// only per-category thresholds and the leak scan decide `passed`.
    pub fn assemble(&self, checks: Vec<CheckResult>, leaks: Vec<LeakFinding>) -> QualityReport {
        let mut category_scores = CategoryValues::<u8>::default();
        let mut category_passed = CategoryValues::<bool>::default();

        for category in Category::ALL {
            let scores: Vec<u32> = checks
                .iter()
                .filter(|c| c.category == category)
                .map(|c| c.score as u32)
                .collect();
            let mean = if scores.is_empty() {
                0
            } else {
                (scores.iter().sum::<u32>() / scores.len() as u32) as u8
            };
            category_scores.set(category, mean);
            category_passed.set(category, mean >= self.thresholds.get(category));
        }

        let overall_score: f64 = category_scores
            .iter()
            .map(|(c, s)| s as f64 * self.weights.get(c))
            .sum();

        let mut critical_issues: Vec<String> = leaks
            .iter()
            .map(|leak| format!("Personal data detected: {}", leak))
            .collect();
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();
        for check in checks.iter().filter(|c| !c.passed) {
            match check.severity {
                Severity::Error => critical_issues.push(check.message.clone()),
                Severity::Warning => warnings.push(check.message.clone()),
                Severity::Info => suggestions.push(check.message.clone()),
            }
        }

        let categories_pass = category_passed.iter().all(|(_, passed)| passed);
        let passed = categories_pass && leaks.is_empty();
        let no_errors = !checks
            .iter()
            .any(|c| !c.passed && c.severity == Severity::Error);

        QualityReport {
            checks,
            category_scores,
            thresholds: self.thresholds,
            category_passed,
            overall_score,
            level: QualityLevel::from_score(overall_score),
            leaks,
            passed,
            ready_to_publish: passed && no_errors,
            critical_issues,
            warnings,
            suggestions,
        }
    }
}
