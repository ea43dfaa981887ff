use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaqItem {
    pub question: String,
    pub answer: String,
}

/// A generated article draft as returned by the model and enriched locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentDraft {
    pub title: String,
    pub meta_title: String,
    pub meta_description: String,
    pub content_html: String,
    pub excerpt: String,
    pub focus_keyword: String,
    pub secondary_keywords: Vec<String>,
    pub long_tail_keywords: Vec<String>,
    pub faq_items: Vec<FaqItem>,
    pub category_primary: String,
    pub tags: Vec<String>,
    pub slug: String,
    pub word_count: usize,
    pub reading_time_minutes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_article: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_faq: Option<Value>,
}

impl ContentDraft {
    /// Content with markup removed.
    pub fn plain_text(&self) -> String {
        strip_tags(&self.content_html)
    }

    /// Every field that ends up visible to readers, with its name.
    pub fn public_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![
            ("title", self.title.as_str()),
            ("meta_title", self.meta_title.as_str()),
            ("meta_description", self.meta_description.as_str()),
            ("content_html", self.content_html.as_str()),
            ("excerpt", self.excerpt.as_str()),
            ("slug", self.slug.as_str()),
        ];
        for faq in &self.faq_items {
            fields.push(("faq_items.question", faq.question.as_str()));
            fields.push(("faq_items.answer", faq.answer.as_str()));
        }
        for tag in &self.tags {
            fields.push(("tags", tag.as_str()));
        }
        fields
    }

    /// Fills derived fields: word count, reading time, slug, meta title and
    /// the schema.org JSON-LD blocks.
    pub fn enrich(&mut self) {
        self.word_count = self.plain_text().split_whitespace().count();
        self.reading_time_minutes = (self.word_count / 200).max(1);

        if self.meta_title.trim().is_empty() {
            self.meta_title = self.title.clone();
        }

        let mut slug = slugify(&self.title);
        if slug.is_empty() {
            slug = slugify(&self.focus_keyword);
        }
        if slug.is_empty() {
            slug = "article".to_string();
        }
        self.slug = slug;

        self.schema_article = Some(json!({
            "@context": "https://schema.org",
            "@type": "Article",
            "headline": self.title,
            "description": self.meta_description,
            "articleBody": self.plain_text(),
            "wordCount": self.word_count,
            "keywords": self.secondary_keywords.join(", "),
        }));

        self.schema_faq = if self.faq_items.is_empty() {
            None
        } else {
            Some(json!({
                "@context": "https://schema.org",
                "@type": "FAQPage",
                "mainEntity": self.faq_items.iter().map(|faq| json!({
                    "@type": "Question",
                    "name": faq.question,
                    "acceptedAnswer": { "@type": "Answer", "text": faq.answer },
                })).collect::<Vec<_>>(),
            }))
        };
    }
}

pub fn strip_tags(html: &str) -> String {
    RE_TAG.replace_all(html, " ").into_owned()
}

/// How many of `phrases` occur in `text`, ignoring case. Scoring and
/// post-processing both decide phrase presence through this.
pub fn count_phrases(phrases: &[String], text: &str) -> usize {
    let text = text.to_lowercase();
    phrases
        .iter()
        .filter(|p| !p.trim().is_empty() && text.contains(&p.to_lowercase()))
        .count()
}

/// Lowercase ASCII slug: alphanumerics kept, everything else collapsed to
/// single hyphens. Non-Latin titles yield an empty slug.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug.truncate(180);
    slug.trim_end_matches('-').to_string()
}

/// Truncates to at most `max` characters, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => text[..byte].trim_end().to_string(),
        None => text.to_string(),
    }
}
