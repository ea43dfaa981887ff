//! Lossless splitting of oversized text for bounded-payload calls, and
//! recombination of the per-chunk results.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static RE_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n\s*").unwrap());
static RE_SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?׃]+["'”)\]]*(\s+)"#).unwrap());
static RE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// The boundary kind a chunk was cut at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Whole,
    Paragraph,
    Sentence,
    Word,
}

impl Granularity {
    fn finer(self) -> Option<Granularity> {
        match self {
            Granularity::Whole => Some(Granularity::Paragraph),
            Granularity::Paragraph => Some(Granularity::Sentence),
            Granularity::Sentence => Some(Granularity::Word),
            Granularity::Word => None,
        }
    }

    fn separator(self) -> Option<&'static Regex> {
        match self {
            Granularity::Whole => None,
            Granularity::Paragraph => Some(&*RE_PARAGRAPH),
            Granularity::Sentence => Some(&*RE_SENTENCE),
            Granularity::Word => Some(&*RE_WORD),
        }
    }
}

/// An ordered slice of a larger text.
///
/// `separator` is the exact text that followed the chunk in the original,
/// so concatenating `text + separator` over all chunks reproduces the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub separator: String,
    pub granularity: Granularity,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Splits text into chunks of at most `max_size` characters, preferring
/// paragraph, then sentence, then word boundaries.
#[derive(Debug, Clone, Copy)]
pub struct DocumentChunker {
    max_size: usize,
}

impl DocumentChunker {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        split(text, self.max_size)
    }
}

/// Splits `text` into chunks no longer than `max_size` characters wherever
/// a boundary allows it. A single word longer than `max_size` is emitted
/// whole rather than cut.
pub fn split(text: &str, max_size: usize) -> Vec<Chunk> {
    let max_size = max_size.max(1);
    if text.chars().count() <= max_size {
        return vec![Chunk {
            index: 0,
            text: text.to_string(),
            separator: String::new(),
            granularity: Granularity::Whole,
        }];
    }

    let mut pieces = Vec::new();
    split_into(text, "", max_size, Granularity::Paragraph, &mut pieces);

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, (text, separator, granularity))| Chunk {
            index,
            text,
            separator,
            granularity,
        })
        .collect()
}

/// Rejoins chunks with their original separators.
pub fn join(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&chunk.text);
        out.push_str(&chunk.separator);
    }
    out
}

/// A piece of text plus the separator that followed it.
struct Segment<'a> {
    body: &'a str,
    separator: &'a str,
}

fn segments<'a>(text: &'a str, separator: &Regex) -> Vec<Segment<'a>> {
    let mut out = Vec::new();
    let mut last = 0;

    for caps in separator.captures_iter(text) {
        let Some(sep) = caps.get(1).or_else(|| caps.get(0)) else {
            continue;
        };
        // A separator at the very start (or right after another) would leave
        // an empty body; fold it into the next body instead.
        if sep.start() <= last {
            continue;
        }
        out.push(Segment {
            body: &text[last..sep.start()],
            separator: sep.as_str(),
        });
        last = sep.end();
    }

    if last < text.len() {
        out.push(Segment {
            body: &text[last..],
            separator: "",
        });
    }
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Packs `text` into `out` at `granularity`, recursing into finer
/// boundaries for segments that do not fit. The final piece produced for
/// `text` carries `trailing` as its separator.
fn split_into(
    text: &str,
    trailing: &str,
    max_size: usize,
    granularity: Granularity,
    out: &mut Vec<(String, String, Granularity)>,
) {
    let Some(separator) = granularity.separator() else {
        out.push((text.to_string(), trailing.to_string(), granularity));
        return;
    };

    let parts = segments(text, separator);
    if parts.len() <= 1 {
        match granularity.finer() {
            Some(finer) if char_len(text) > max_size => {
                split_into(text, trailing, max_size, finer, out)
            }
            _ => out.push((text.to_string(), trailing.to_string(), granularity)),
        }
        return;
    }

    let start = out.len();
    let mut body = String::new();
    let mut body_len = 0;
    let mut pending_sep = "";

    for segment in parts {
        let seg_len = char_len(segment.body);

        if seg_len > max_size {
            if !body.is_empty() {
                out.push((std::mem::take(&mut body), pending_sep.to_string(), granularity));
                body_len = 0;
            }
            match granularity.finer() {
                Some(finer) => split_into(segment.body, segment.separator, max_size, finer, out),
                None => out.push((
                    segment.body.to_string(),
                    segment.separator.to_string(),
                    granularity,
                )),
            }
            pending_sep = "";
            continue;
        }

        if body.is_empty() {
            body.push_str(segment.body);
            body_len = seg_len;
        } else if body_len + char_len(pending_sep) + seg_len <= max_size {
            body.push_str(pending_sep);
            body.push_str(segment.body);
            body_len += char_len(pending_sep) + seg_len;
        } else {
            out.push((std::mem::take(&mut body), pending_sep.to_string(), granularity));
            body.push_str(segment.body);
            body_len = seg_len;
        }
        pending_sep = segment.separator;
    }

    if !body.is_empty() {
        out.push((body, pending_sep.to_string(), granularity));
    }

    // The last piece of this text inherits the separator that followed it.
    if out.len() > start {
        if let Some(last) = out.last_mut() {
            last.1.push_str(trailing);
        }
    }
}

/// Ordered risk scale used when combining per-chunk assessments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Unknown labels map to `Medium`.
    pub fn parse_lenient(value: &str) -> RiskLevel {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => RiskLevel::Low,
            "high" => RiskLevel::High,
            _ => RiskLevel::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Field-level rules for [`merge_results`]. Fields not named here merge
/// by kind: arrays concatenate, booleans OR, everything else keeps the
/// first non-null value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeRules {
    /// Free text rejoined with the chunk separators.
    pub text_fields: &'static [&'static str],
    /// Risk labels combined by taking the maximum.
    pub ranked_fields: &'static [&'static str],
    /// Notes joined with `"; "`.
    pub note_fields: &'static [&'static str],
}

/// Combines per-chunk outputs (one object per chunk, in chunk order).
/// Text fields are rejoined with every chunk's separator, the last one
/// included, so echoing the chunks back reproduces the input exactly.
pub fn merge_results(chunks: &[Chunk], outputs: &[Value], rules: &MergeRules) -> Value {
    let mut merged = Map::new();

    for (i, output) in outputs.iter().enumerate() {
        let Some(object) = output.as_object() else {
            continue;
        };
        let fallback = if i + 1 < outputs.len() { "\n\n" } else { "" };
        let separator = chunks.get(i).map_or(fallback, |c| c.separator.as_str());

        for (key, value) in object {
            let key_str = key.as_str();
            let entry = merged.get_mut(key_str);

            if rules.text_fields.contains(&key_str) {
                let text = value.as_str().unwrap_or_default();
                match entry {
                    Some(Value::String(existing)) => {
                        existing.push_str(text);
                        existing.push_str(separator);
                    }
                    _ => {
                        merged.insert(key.clone(), Value::String(format!("{}{}", text, separator)));
                    }
                }
            } else if rules.ranked_fields.contains(&key_str) {
                let level = RiskLevel::parse_lenient(value.as_str().unwrap_or_default());
                let combined = match entry.and_then(|v| v.as_str()) {
                    Some(existing) => RiskLevel::parse_lenient(existing).max(level),
                    None => level,
                };
                merged.insert(key.clone(), Value::String(combined.as_str().to_string()));
            } else if rules.note_fields.contains(&key_str) {
                let note = value.as_str().unwrap_or_default().trim();
                if note.is_empty() {
                    merged.entry(key.clone()).or_insert(Value::Null);
                    continue;
                }
                match entry {
                    Some(Value::String(existing)) if !existing.is_empty() => {
                        existing.push_str("; ");
                        existing.push_str(note);
                    }
                    _ => {
                        merged.insert(key.clone(), Value::String(note.to_string()));
                    }
                }
            } else {
                match (entry, value) {
                    (Some(Value::Array(existing)), Value::Array(items)) => {
                        existing.extend(items.iter().cloned());
                    }
                    (Some(Value::Bool(existing)), Value::Bool(flag)) => *existing |= *flag,
                    (Some(existing), _) if existing.is_null() => *existing = value.clone(),
                    (Some(_), _) => {}
                    (None, _) => {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }

    Value::Object(merged)
}
