//! Fixes the model is known to need on every draft.

use crate::config::{Lexicon, PostProcessConfig};

use super::draft::{count_phrases, truncate_chars, ContentDraft};
use super::links::LinkEnhancer;

/// Characters a published article may contain: ASCII, Latin-1, Hebrew
/// (including presentation forms), general punctuation and currency signs.
fn is_allowed_char(c: char) -> bool {
    c.is_ascii()
        || matches!(c,
            '\u{00A0}'..='\u{00FF}'
            | '\u{0590}'..='\u{05FF}'
            | '\u{2000}'..='\u{206F}'
            | '\u{20A0}'..='\u{20CF}'
            | '\u{FB1D}'..='\u{FB4F}')
}

pub fn strip_disallowed(text: &str) -> String {
    text.chars().filter(|c| is_allowed_char(*c)).collect()
}

pub struct PostProcessor {
    config: PostProcessConfig,
    disclaimer_phrases: Vec<String>,
    cta_phrases: Vec<String>,
    links: LinkEnhancer,
}

impl PostProcessor {
    pub fn new(config: &PostProcessConfig, lexicon: &Lexicon) -> Self {
        Self {
            config: config.clone(),
            disclaimer_phrases: lexicon.disclaimer_phrases.clone(),
            cta_phrases: lexicon.cta_phrases.clone(),
            links: LinkEnhancer::new(&config.links),
        }
    }

    /// Applies every fix in place, then fills the derived fields.
    pub fn apply(&self, draft: &mut ContentDraft, subject_term: &str) {
        self.strip_charset(draft);
        let focus = if draft.focus_keyword.trim().is_empty() {
            subject_term
        } else {
            draft.focus_keyword.as_str()
        };
        draft.content_html = self.links.enhance(&draft.content_html, focus);
        self.ensure_blocks(draft);
        self.ensure_subject_in_title(draft, subject_term);
        draft.meta_description =
            truncate_chars(&draft.meta_description, self.config.meta_description_max_length);
        draft.enrich();
    }

    fn strip_charset(&self, draft: &mut ContentDraft) {
        for field in [
            &mut draft.title,
            &mut draft.meta_title,
            &mut draft.meta_description,
            &mut draft.content_html,
            &mut draft.excerpt,
        ] {
            *field = strip_disallowed(field);
        }
        for faq in &mut draft.faq_items {
            faq.question = strip_disallowed(&faq.question);
            faq.answer = strip_disallowed(&faq.answer);
        }
    }

    fn ensure_blocks(&self, draft: &mut ContentDraft) {
        let text = draft.plain_text();
        let has_disclaimer = count_phrases(&self.disclaimer_phrases, &text) > 0;
        let has_cta = count_phrases(&self.cta_phrases, &text) > 0;

        if !has_disclaimer && !self.config.disclaimer_block.is_empty() {
            draft.content_html.push('\n');
            draft.content_html.push_str(&self.config.disclaimer_block);
        }
        if !has_cta && !self.config.cta_block.is_empty() {
            draft.content_html.push('\n');
            draft.content_html.push_str(&self.config.cta_block);
        }
    }

    fn ensure_subject_in_title(&self, draft: &mut ContentDraft, subject_term: &str) {
        let subject = subject_term.trim();
        if !subject.is_empty() && !draft.title.contains(subject) {
            draft.title = if draft.title.trim().is_empty() {
                subject.to_string()
            } else {
                format!("{}: {}", subject, draft.title.trim())
            };
        }
        draft.title = truncate_chars(&draft.title, self.config.title_max_length);
    }
}
