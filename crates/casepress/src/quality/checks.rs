use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::category::Category;
use super::DraftMetadata;
use crate::config::{ContentTargets, Lexicon, QualityConfig};
use crate::generation::draft::{count_phrases, strip_tags};
use crate::generation::ContentDraft;

static RE_H2: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<h2[^>]*>").unwrap());
static RE_H3: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<h3[^>]*>").unwrap());
static RE_P_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<p[^>]*>").unwrap());
static RE_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<[uo]l[^>]*>").unwrap());
static RE_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").unwrap());
static RE_SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Outcome of one deterministic check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub category: Category,
    pub passed: bool,
    pub score: u8,
    pub message: String,
    pub severity: Severity,
}

impl CheckResult {
    fn new(
        name: &str,
        category: Category,
        passed: bool,
        score: u32,
        message: String,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.to_string(),
            category,
            passed,
            score: score.min(100) as u8,
            message,
            severity,
        }
    }

    /// Builds a check whose severity is `on_fail` when it fails and info otherwise.
    fn graded(
        name: &str,
        category: Category,
        passed: bool,
        score: u32,
        message: String,
        on_fail: Severity,
    ) -> Self {
        let severity = if passed { Severity::Info } else { on_fail };
        Self::new(name, category, passed, score, message, severity)
    }
}

/// The battery of content checks, with lexicon patterns compiled once.
pub struct CheckSuite {
    targets: ContentTargets,
    lexicon: Lexicon,
    law_patterns: Vec<Regex>,
    precedent_patterns: Vec<Regex>,
    placeholder_patterns: Vec<Regex>,
}

fn compile_all(patterns: &[String]) -> Vec<Regex> {
    // Patterns are validated at config load; anything that still fails is skipped.
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn count_matches(patterns: &[Regex], text: &str) -> usize {
    patterns.iter().map(|re| re.find_iter(text).count()).sum()
}

impl CheckSuite {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            targets: config.targets.clone(),
            lexicon: config.lexicon.clone(),
            law_patterns: compile_all(&config.lexicon.law_citation_patterns),
            precedent_patterns: compile_all(&config.lexicon.precedent_patterns),
            placeholder_patterns: compile_all(&config.lexicon.placeholder_patterns),
        }
    }

    pub fn run(&self, draft: &ContentDraft, metadata: &DraftMetadata) -> Vec<CheckResult> {
        let mut checks = Vec::new();
        checks.extend(self.structure(draft));
        checks.extend(self.discoverability(draft, metadata));
        checks.extend(self.readability(draft));
        checks.extend(self.trust(draft));
        checks
    }

    // ── Structure ──

    fn structure(&self, draft: &ContentDraft) -> Vec<CheckResult> {
        let t = &self.targets;
        let html = &draft.content_html;
        let cat = Category::Structure;
        let mut checks = Vec::new();

        let wc = draft.word_count;
        let score = if wc >= t.target_word_count {
            100
        } else if wc >= t.min_word_count {
            let span = t.target_word_count.saturating_sub(t.min_word_count).max(1);
            70 + ((wc - t.min_word_count) * 30 / span) as u32
        } else {
            (wc * 70 / t.min_word_count.max(1)) as u32
        };
        checks.push(CheckResult::graded(
            "word_count",
            cat,
            wc >= t.min_word_count,
            score,
            format!("Word count: {} (minimum: {})", wc, t.min_word_count),
            Severity::Error,
        ));

        let h2 = RE_H2.find_iter(html).count();
        checks.push(CheckResult::graded(
            "h2_structure",
            cat,
            h2 >= t.min_h2,
            (h2 * 15) as u32,
            format!("H2 headings: {} (recommended: {}+)", h2, t.min_h2),
            Severity::Warning,
        ));

        let h3 = RE_H3.find_iter(html).count();
        checks.push(CheckResult::new(
            "h3_structure",
            cat,
            h3 >= t.min_h3,
            50 + (h3 * 10) as u32,
            format!("H3 headings: {} (recommended: {}+)", h3, t.min_h3),
            Severity::Info,
        ));

        let paragraphs = RE_P_OPEN.find_iter(html).count();
        checks.push(CheckResult::new(
            "paragraph_count",
            cat,
            paragraphs >= t.min_paragraphs,
            (paragraphs * 5) as u32,
            format!("Paragraphs: {}", paragraphs),
            Severity::Info,
        ));

        let faq = draft.faq_items.len();
        checks.push(CheckResult::graded(
            "faq_count",
            cat,
            faq >= t.min_faq,
            (faq * 12) as u32,
            format!("FAQ items: {} (recommended: {}+)", faq, t.min_faq),
            Severity::Warning,
        ));

        let lists = RE_LIST.find_iter(html).count();
        checks.push(CheckResult::new(
            "list_usage",
            cat,
            lists >= t.min_lists,
            50 + (lists * 15) as u32,
            format!("Lists used: {}", lists),
            Severity::Info,
        ));

        checks
    }

    // ── Discoverability ──

    fn discoverability(&self, draft: &ContentDraft, metadata: &DraftMetadata) -> Vec<CheckResult> {
        let t = &self.targets;
        let cat = Category::Discoverability;
        let mut checks = Vec::new();

        let keyword = if draft.focus_keyword.trim().is_empty() {
            metadata.subject_term.trim().to_lowercase()
        } else {
            draft.focus_keyword.trim().to_lowercase()
        };
        let has_keyword = !keyword.is_empty();
        let contains_keyword = |text: &str| has_keyword && text.to_lowercase().contains(&keyword);

        let title_len = draft.title.chars().count();
        let title_ok = title_len > 0 && title_len <= t.max_title_length;
        checks.push(CheckResult::graded(
            "title_length",
            cat,
            title_ok,
            match (title_ok, title_len) {
                (true, _) => 100,
                (false, 0) => 0,
                _ => 50,
            },
            format!(
                "Title length: {} characters (max: {})",
                title_len, t.max_title_length
            ),
            Severity::Warning,
        ));

        let meta_len = draft.meta_description.chars().count();
        let meta_ok = (t.min_meta_length..=t.max_meta_length).contains(&meta_len);
        checks.push(CheckResult::graded(
            "meta_description_length",
            cat,
            meta_ok,
            match (meta_ok, meta_len) {
                (true, _) => 100,
                (false, 0) => 0,
                _ => 50,
            },
            format!(
                "Meta description: {} characters ({}-{} recommended)",
                meta_len, t.min_meta_length, t.max_meta_length
            ),
            Severity::Warning,
        ));

        let in_title = contains_keyword(&draft.title);
        checks.push(CheckResult::graded(
            "keyword_in_title",
            cat,
            in_title,
            if in_title { 100 } else { 0 },
            if in_title {
                "Focus keyword in title".to_string()
            } else {
                "Focus keyword missing from title".to_string()
            },
            Severity::Warning,
        ));

        let in_meta = contains_keyword(&draft.meta_description);
        checks.push(CheckResult::new(
            "keyword_in_meta",
            cat,
            in_meta,
            if in_meta { 100 } else { 0 },
            if in_meta {
                "Focus keyword in meta description".to_string()
            } else {
                "Focus keyword missing from meta description".to_string()
            },
            Severity::Info,
        ));

        let intro = RE_PARAGRAPH
            .captures(&draft.content_html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or("");
        let in_intro = contains_keyword(intro);
        checks.push(CheckResult::graded(
            "keyword_in_intro",
            cat,
            in_intro,
            if in_intro { 100 } else { 0 },
            if in_intro {
                "Focus keyword in introduction".to_string()
            } else {
                "Focus keyword missing from introduction".to_string()
            },
            Severity::Warning,
        ));

        let text = strip_tags(&draft.content_html).to_lowercase();
        let words = text.split_whitespace().count();
        let density = if has_keyword && words > 0 {
            text.matches(keyword.as_str()).count() as f64 / words as f64 * 100.0
        } else {
            0.0
        };
        let density_ok = (t.min_keyword_density..=t.max_keyword_density).contains(&density);
        checks.push(CheckResult::new(
            "keyword_density",
            cat,
            density_ok,
            if density_ok {
                100
            } else if density > 0.0 {
                50
            } else {
                0
            },
            format!(
                "Keyword density: {:.1}% ({}-{}% recommended)",
                density, t.min_keyword_density, t.max_keyword_density
            ),
            Severity::Info,
        ));

        let coverage = if draft.secondary_keywords.is_empty() {
            50
        } else {
            let used = draft
                .secondary_keywords
                .iter()
                .filter(|kw| text.contains(&kw.to_lowercase()))
                .count();
            (used * 100 / draft.secondary_keywords.len()) as u32
        };
        checks.push(CheckResult::new(
            "secondary_keywords",
            cat,
            coverage >= t.min_secondary_coverage as u32,
            coverage,
            format!("Secondary keywords coverage: {}%", coverage),
            Severity::Info,
        ));

        let slug_ok = slug_is_optimized(&draft.slug, &keyword);
        checks.push(CheckResult::new(
            "slug_optimization",
            cat,
            slug_ok,
            if slug_ok { 100 } else { 50 },
            if slug_ok {
                "URL slug is optimized".to_string()
            } else {
                "URL slug could be improved".to_string()
            },
            Severity::Info,
        ));

        checks
    }

    // ── Readability ──

    fn readability(&self, draft: &ContentDraft) -> Vec<CheckResult> {
        let t = &self.targets;
        let cat = Category::Readability;
        let mut checks = Vec::new();
        let text = strip_tags(&draft.content_html);

        let sentences: Vec<&str> = RE_SENTENCE_END
            .split(&text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let avg = if sentences.is_empty() {
            0.0
        } else {
            let words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
            words as f64 / sentences.len() as f64
        };
        let (sentence_ok, sentence_score) = if sentences.is_empty() {
            (false, 0)
        } else if avg <= t.ideal_sentence_words {
            (true, 100)
        } else if avg <= t.max_sentence_words {
            (true, 70)
        } else {
            (false, 40)
        };
        checks.push(CheckResult::new(
            "sentence_length",
            cat,
            sentence_ok,
            sentence_score,
            format!(
                "Average sentence length: {:.1} words (max {} recommended)",
                avg, t.max_sentence_words
            ),
            Severity::Info,
        ));

        let long_paragraphs = RE_PARAGRAPH
            .captures_iter(&draft.content_html)
            .filter_map(|c| c.get(1))
            .filter(|m| m.as_str().split_whitespace().count() > t.long_paragraph_words)
            .count();
        checks.push(CheckResult::graded(
            "paragraph_length",
            cat,
            long_paragraphs == 0,
            100u32.saturating_sub((long_paragraphs * 20) as u32),
            format!(
                "Long paragraphs ({}+ words): {}",
                t.long_paragraph_words, long_paragraphs
            ),
            Severity::Warning,
        ));

        let transitions = count_phrases(&self.lexicon.transition_words, &text);
        checks.push(CheckResult::new(
            "transition_words",
            cat,
            transitions >= t.min_transition_words,
            (transitions * 10) as u32,
            format!("Transition words used: {}", transitions),
            Severity::Info,
        ));

        let minutes = draft.reading_time_minutes;
        let reading_ok = (t.min_reading_minutes..=t.max_reading_minutes).contains(&minutes);
        checks.push(CheckResult::new(
            "reading_time",
            cat,
            reading_ok,
            if reading_ok { 100 } else { 70 },
            format!("Reading time: {} minutes", minutes),
            Severity::Info,
        ));

        checks
    }

    // ── Trust ──

    fn trust(&self, draft: &ContentDraft) -> Vec<CheckResult> {
        let t = &self.targets;
        let cat = Category::Trust;
        let mut checks = Vec::new();
        let text = strip_tags(&draft.content_html).to_lowercase();

        let laws = count_matches(&self.law_patterns, &text);
        checks.push(CheckResult::new(
            "legal_citations",
            cat,
            laws >= t.min_law_citations,
            (laws * 15) as u32,
            format!("Legal citations found: {}", laws),
            if laws + 1 < t.min_law_citations {
                Severity::Warning
            } else {
                Severity::Info
            },
        ));

        let precedents = count_matches(&self.precedent_patterns, &text);
        checks.push(CheckResult::new(
            "precedent_citations",
            cat,
            precedents >= t.min_precedents,
            50 + (precedents * 15) as u32,
            format!("Precedent citations found: {}", precedents),
            Severity::Info,
        ));

        let has_disclaimer = count_phrases(&self.lexicon.disclaimer_phrases, &text) > 0;
        checks.push(CheckResult::graded(
            "disclaimer",
            cat,
            has_disclaimer,
            if has_disclaimer { 100 } else { 0 },
            if has_disclaimer {
                "Legal disclaimer present".to_string()
            } else {
                "Legal disclaimer missing".to_string()
            },
            Severity::Error,
        ));

        let has_cta = count_phrases(&self.lexicon.cta_phrases, &text) > 0;
        checks.push(CheckResult::new(
            "call_to_action",
            cat,
            has_cta,
            if has_cta { 100 } else { 50 },
            if has_cta {
                "Call to action present".to_string()
            } else {
                "Consider adding a call to action".to_string()
            },
            Severity::Info,
        ));

        let terms = count_phrases(&self.lexicon.expert_terms, &text);
        checks.push(CheckResult::new(
            "expert_terminology",
            cat,
            terms >= t.min_expert_terms,
            (terms * 10) as u32,
            format!("Legal terms used: {}", terms),
            Severity::Info,
        ));

        let visible = format!(
            "{} {} {}",
            draft.title, draft.meta_description, draft.content_html
        );
        let placeholders = count_matches(&self.placeholder_patterns, &visible);
        let placeholders_ok = placeholders <= t.max_placeholders;
        checks.push(CheckResult::new(
            "placeholder_check",
            cat,
            placeholders_ok,
            if placeholders_ok { 100 } else { 50 },
            format!("Anonymization placeholders: {}", placeholders),
            Severity::Info,
        ));

        checks
    }
}

/// Latin keywords must appear in the slug. Keywords in other scripts only need
/// a reasonably long ASCII slug.
fn slug_is_optimized(slug: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return !slug.is_empty();
    }
    if keyword.is_ascii() {
        slug.to_lowercase().contains(&keyword.replace(' ', "-"))
    } else {
        slug.len() >= 5 && slug.is_ascii()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::draft::FaqItem;

    fn suite() -> CheckSuite {
        CheckSuite::new(&QualityConfig::default())
    }

    fn find<'a>(checks: &'a [CheckResult], name: &str) -> &'a CheckResult {
        checks.iter().find(|c| c.name == name).unwrap()
    }

    fn meta() -> DraftMetadata {
        DraftMetadata::default()
    }

    // ── Structure ──

    #[test]
    fn test_word_count_scoring_bands() {
        let s = suite();
        let mut draft = ContentDraft {
            word_count: 1800,
            ..Default::default()
        };
        assert_eq!(find(&s.structure(&draft), "word_count").score, 100);

        draft.word_count = 1500;
        let check = s.structure(&draft);
        let wc = find(&check, "word_count");
        assert_eq!(wc.score, 85);
        assert!(wc.passed);

        draft.word_count = 600;
        let check = s.structure(&draft);
        let wc = find(&check, "word_count");
        assert_eq!(wc.score, 35);
        assert!(!wc.passed);
        assert_eq!(wc.severity, Severity::Error);
    }

    #[test]
    fn test_heading_and_faq_counts() {
        let s = suite();
        let draft = ContentDraft {
            content_html: "<h2>a</h2><h2>b</h2><h3>c</h3><ul><li>x</li></ul><p>p</p>".to_string(),
            faq_items: vec![FaqItem::default(); 3],
            ..Default::default()
        };
        let checks = s.structure(&draft);
        assert_eq!(find(&checks, "h2_structure").score, 30);
        assert_eq!(find(&checks, "h3_structure").score, 60);
        assert_eq!(find(&checks, "list_usage").score, 65);
        assert_eq!(find(&checks, "paragraph_count").score, 5);
        assert_eq!(find(&checks, "faq_count").score, 36);
        assert_eq!(find(&checks, "faq_count").severity, Severity::Warning);
    }

    #[test]
    fn test_scores_are_capped_at_100() {
        let s = suite();
        let draft = ContentDraft {
            content_html: "<h2>x</h2>".repeat(20),
            ..Default::default()
        };
        assert_eq!(find(&s.structure(&draft), "h2_structure").score, 100);
    }

    // ── Discoverability ──

    #[test]
    fn test_keyword_checks_use_subject_term_fallback() {
        let s = suite();
        let draft = ContentDraft {
            title: "Work accident rights".to_string(),
            content_html: "<p>A work accident changes things.</p>".to_string(),
            ..Default::default()
        };
        let metadata = DraftMetadata {
            subject_term: "work accident".to_string(),
        };
        let checks = s.discoverability(&draft, &metadata);
        assert!(find(&checks, "keyword_in_title").passed);
        assert!(find(&checks, "keyword_in_intro").passed);
        assert!(!find(&checks, "keyword_in_meta").passed);
    }

    #[test]
    fn test_title_and_meta_lengths() {
        let s = suite();
        let draft = ContentDraft {
            title: "t".repeat(61),
            meta_description: "m".repeat(130),
            ..Default::default()
        };
        let checks = s.discoverability(&draft, &meta());
        assert_eq!(find(&checks, "title_length").score, 50);
        assert_eq!(find(&checks, "meta_description_length").score, 100);
    }

    #[test]
    fn test_slug_rules() {
        assert!(slug_is_optimized("work-accident-guide", "work accident"));
        assert!(!slug_is_optimized("guide", "work accident"));
        assert!(slug_is_optimized("guide-to-claims", "תאונת עבודה"));
        assert!(!slug_is_optimized("abc", "תאונת עבודה"));
        assert!(!slug_is_optimized("", ""));
    }

    // ── Readability ──

    #[test]
    fn test_sentence_length_bands() {
        let s = suite();
        let short = ContentDraft {
            content_html: "<p>One two three. Four five six.</p>".to_string(),
            ..Default::default()
        };
        assert_eq!(find(&s.readability(&short), "sentence_length").score, 100);

        let long = ContentDraft {
            content_html: format!("<p>{}.</p>", "word ".repeat(30)),
            ..Default::default()
        };
        let checks = s.readability(&long);
        assert_eq!(find(&checks, "sentence_length").score, 40);
        assert!(!find(&checks, "sentence_length").passed);
    }

    #[test]
    fn test_long_paragraphs_penalized() {
        let s = suite();
        let para = format!("<p>{}</p>", "word ".repeat(160));
        let draft = ContentDraft {
            content_html: para.repeat(2),
            ..Default::default()
        };
        let checks = s.readability(&draft);
        assert_eq!(find(&checks, "paragraph_length").score, 60);
        assert_eq!(find(&checks, "paragraph_length").severity, Severity::Warning);
    }

    // ── Trust ──

    #[test]
    fn test_trust_signals() {
        let s = suite();
        let draft = ContentDraft {
            content_html: "<p>לפי סעיף 12 וסעיף 13 לחוק החוזים, ראו ע\"א 1234/20. אין באמור ייעוץ. צרו קשר.</p>"
                .to_string(),
            ..Default::default()
        };
        let checks = s.trust(&draft);
        assert_eq!(find(&checks, "legal_citations").score, 45);
        assert_eq!(find(&checks, "precedent_citations").score, 65);
        assert!(find(&checks, "disclaimer").passed);
        assert!(find(&checks, "call_to_action").passed);
    }

    #[test]
    fn test_missing_disclaimer_is_error() {
        let s = suite();
        let checks = s.trust(&ContentDraft::default());
        let disclaimer = find(&checks, "disclaimer");
        assert!(!disclaimer.passed);
        assert_eq!(disclaimer.severity, Severity::Error);
        assert_eq!(find(&checks, "call_to_action").score, 50);
    }

    #[test]
    fn test_placeholder_overuse_is_info() {
        let s = suite();
        let draft = ContentDraft {
            content_html: "<p>[שם הוסר] ".repeat(6),
            ..Default::default()
        };
        let checks = s.trust(&draft);
        let placeholder = find(&checks, "placeholder_check");
        assert!(!placeholder.passed);
        assert_eq!(placeholder.score, 50);
        assert_eq!(placeholder.severity, Severity::Info);
    }

    #[test]
    fn test_block_phrases_match_like_post_processing() {
        use crate::config::PostProcessConfig;
        use crate::generation::PostProcessor;

        let mut config = QualityConfig::default();
        config.lexicon.disclaimer_phrases = vec!["Not Legal Advice".to_string()];
        config.lexicon.cta_phrases = vec!["Contact Us".to_string()];
        let processor = PostProcessor::new(&PostProcessConfig::default(), &config.lexicon);

        let mut draft = ContentDraft {
            title: "Title".to_string(),
            content_html: "<p>NOT LEGAL ADVICE. contact us today.</p>".to_string(),
            ..Default::default()
        };
        processor.apply(&mut draft, "");
        assert!(!draft.content_html.contains("class=\"disclaimer\""));
        assert!(!draft.content_html.contains("class=\"cta\""));

        let checks = CheckSuite::new(&config).trust(&draft);
        assert!(find(&checks, "disclaimer").passed);
        assert!(find(&checks, "call_to_action").passed);
    }
}
