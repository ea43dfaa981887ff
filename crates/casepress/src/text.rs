//! Normalization of extracted document text.

use std::sync::LazyLock;

use regex::Regex;

static RE_HORIZONTAL_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static RE_BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_PAGE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:-?[ \t]*\d{1,4}[ \t]*-?|(?i:page)[ \t]+\d{1,4}|עמוד[ \t]+\d{1,4})[ \t]*$")
        .unwrap()
});

/// Hebrew points and cantillation marks.
fn is_niqqud(c: char) -> bool {
    ('\u{0591}'..='\u{05C7}').contains(&c) && !matches!(c, '\u{05BE}' | '\u{05C0}' | '\u{05C3}' | '\u{05C6}')
}

/// Cleans extracted text before de-identification: unified line endings,
/// collapsed whitespace, no page-number lines, no niqqud.
pub fn clean_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text: String = text.chars().filter(|c| !is_niqqud(*c)).collect();
    let text = RE_PAGE_NUMBER.replace_all(&text, "");
    let text = RE_HORIZONTAL_WS.replace_all(&text, " ");
    let text = text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let text = RE_BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}
