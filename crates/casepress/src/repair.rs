//! Recovery of structured values from malformed model output.
//!
//! Model responses are supposed to be a single JSON object but arrive
//! wrapped in code fences, cut off mid-object, missing commas or carrying
//! raw newlines inside strings. [`parse`] runs an ordered cascade of pure
//! `&str -> String` transforms and stops at the first one that yields a
//! parseable document. It never panics and never returns an error: the
//! failure sentinel is `None`.

use serde::de::DeserializeOwned;
use serde_json::Value;

type Transform = fn(&str) -> String;

/// Repair stages applied cumulatively, parsing after each.
const REPAIR_STAGES: &[(&str, Transform)] = &[
    ("strip_code_fences", strip_code_fences),
    ("isolate_object", isolate_object),
    ("normalize_syntax", normalize_syntax),
];

/// Pre-cleaning passes tried when the plain repair cascade fails.
const FALLBACKS: &[(&str, Transform)] = &[
    ("strip_control_chars", strip_control_chars),
    ("drop_preamble", strip_and_drop_preamble),
];

/// Parses `text` into a JSON value, repairing it if necessary.
pub fn parse(text: &str) -> Option<Value> {
    if let Some(value) = try_parse(text) {
        return Some(value);
    }

    if let Some(value) = repair_and_parse(text) {
        return Some(value);
    }

    for (name, fallback) in FALLBACKS {
        let cleaned = fallback(text);
        if let Some(value) = repair_and_parse(&cleaned) {
            log::debug!("Recovered response after {} fallback", name);
            return Some(value);
        }
    }

    None
}

/// Like [`parse`], then deserializes into `T`.
pub fn parse_as<T: DeserializeOwned>(text: &str) -> Option<T> {
    parse(text).and_then(|value| serde_json::from_value(value).ok())
}

fn try_parse(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

fn repair_and_parse(text: &str) -> Option<Value> {
    let mut current = text.to_string();
    for (name, stage) in REPAIR_STAGES {
        current = stage(&current);
        if let Some(value) = try_parse(&current) {
            log::debug!("Recovered response at stage {}", name);
            return Some(value);
        }
    }
    None
}

/// Removes Markdown code fences. A missing closing fence (truncated
/// response) takes everything after the opening fence.
pub fn strip_code_fences(text: &str) -> String {
    let Some(open) = text.find("```") else {
        return text.to_string();
    };

    let after_marker = &text[open + 3..];
    // Skip the info string ("json", "JSON", ...) up to the end of the line.
    let body_start = match after_marker.find('\n') {
        Some(newline) if after_marker[..newline].trim().chars().all(|c| c.is_alphanumeric()) => {
            newline + 1
        }
        _ => after_marker
            .find(|c: char| !c.is_alphanumeric())
            .unwrap_or(after_marker.len()),
    };
    let body = &after_marker[body_start..];

    match body.find("```") {
        Some(close) => body[..close].trim().to_string(),
        None => body.trim().to_string(),
    }
}

/// Cuts out the outermost object using quote- and escape-aware depth
/// counting. If the text ends inside the object, the missing closing quote
/// and brackets are synthesized in nesting order.
pub fn isolate_object(text: &str) -> String {
    let Some(start) = text.find('{') else {
        return text.to_string();
    };

    let body = &text[start..];
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
                if stack.is_empty() {
                    return body[..offset + c.len_utf8()].to_string();
                }
            }
            _ => {}
        }
    }

    // Truncated: close whatever is still open.
    let mut repaired = body.to_string();
    if in_string {
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    } else {
        trim_dangling(&mut repaired);
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    repaired
}

/// Drops a trailing separator or a key left without its value.
fn trim_dangling(text: &mut String) {
    let trimmed_len = text.trim_end().len();
    text.truncate(trimmed_len);

    if text.ends_with(',') {
        text.pop();
    } else if text.ends_with(':') {
        text.pop();
        let without_colon = text.trim_end().len();
        text.truncate(without_colon);
        // Remove the orphaned key string.
        if text.ends_with('"') {
            let key_body = &text[..text.len() - 1];
            if let Some(open_quote) = key_body.rfind('"') {
                text.truncate(open_quote);
            }
        }
        let rest = text.trim_end().len();
        text.truncate(rest);
        if text.ends_with(',') {
            text.pop();
        }
    }
}

/// Syntax normalization: escape raw control whitespace inside strings,
/// drop trailing commas, insert missing commas.
pub fn normalize_syntax(text: &str) -> String {
    let escaped = escape_newlines_in_strings(text);
    let without_trailing = remove_trailing_separators(&escaped);
    insert_missing_separators(&without_trailing)
}

/// Escapes literal newlines and tabs found inside string values; drops
/// carriage returns there.
pub fn escape_newlines_in_strings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => {}
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

/// Removes commas directly followed (modulo whitespace) by `}` or `]`.
pub fn remove_trailing_separators(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Inserts a comma between two value tokens separated only by whitespace,
/// e.g. `"a" "b"`, `} {` or `1\n"key"`.
pub fn insert_missing_separators(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_string = false;
    let mut escaped = false;
    let mut after_value = false;
    let mut saw_whitespace = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                after_value = true;
                saw_whitespace = false;
            }
            out.push(c);
            continue;
        }

        if c.is_whitespace() {
            saw_whitespace = true;
            out.push(c);
            continue;
        }

        if after_value && saw_whitespace && starts_value(c) {
            // Place the comma right after the previous value, before the gap.
            let gap_start = out.trim_end().len();
            out.insert(gap_start, ',');
        }

        match c {
            '"' => {
                in_string = true;
                after_value = false;
            }
            '}' | ']' => after_value = true,
            c if is_literal_char(c) => after_value = true,
            _ => after_value = false,
        }
        saw_whitespace = false;
        out.push(c);
    }
    out
}

fn starts_value(c: char) -> bool {
    matches!(c, '"' | '{' | '[' | '-' | 't' | 'f' | 'n') || c.is_ascii_digit()
}

fn is_literal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+')
}

/// Removes non-printable control characters, keeping `\t`, `\n`, `\r`.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|&c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Discards everything before the first `{`.
pub fn drop_preamble(text: &str) -> String {
    match text.find('{') {
        Some(start) => text[start..].to_string(),
        None => text.to_string(),
    }
}

fn strip_and_drop_preamble(text: &str) -> String {
    drop_preamble(&strip_control_chars(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Cascade ──

    #[test]
    fn test_valid_input_matches_direct_parse() {
        let inputs = [
            r#"{"a": 1, "b": [true, null, "x"], "c": {"d": -2.5e3}}"#,
            r#"  {"text": "line\nbreak", "quote": "say \"hi\""}  "#,
            r#"[1, 2, 3]"#,
        ];
        for input in inputs {
            let direct: Value = serde_json::from_str(input).unwrap();
            assert_eq!(parse(input), Some(direct), "input: {}", input);
        }
    }

    #[test]
    fn test_transforms_are_noops_on_valid_object() {
        let input = r#"{"a": [1, 2], "b": {"c": "d"}}"#;
        assert_eq!(isolate_object(input), input);
        assert_eq!(normalize_syntax(input), input);
        assert_eq!(strip_code_fences(input), input);
    }

    #[test]
    fn test_fenced_response() {
        let input = "Here you go:\n```json\n{\"title\": \"x\"}\n```\nThanks";
        assert_eq!(parse(input), Some(json!({"title": "x"})));
    }

    #[test]
    fn test_fence_without_closing() {
        let input = "```json\n{\"title\": \"x\", \"tags\": [\"a\"]}";
        assert_eq!(parse(input), Some(json!({"title": "x", "tags": ["a"]})));
    }

    #[test]
    fn test_truncated_inside_string() {
        let input = r#"{"title": "Partial", "body": "cut off her"#;
        assert_eq!(
            parse(input),
            Some(json!({"title": "Partial", "body": "cut off her"}))
        );
    }

    #[test]
    fn test_truncated_inside_nested_array() {
        let input = r#"{"items": [{"q": "a"}, {"q": "b""#;
        assert_eq!(
            parse(input),
            Some(json!({"items": [{"q": "a"}, {"q": "b"}]}))
        );
    }

    #[test]
    fn test_truncated_after_key() {
        let input = r#"{"title": "ok", "body":"#;
        assert_eq!(parse(input), Some(json!({"title": "ok"})));
    }

    #[test]
    fn test_missing_commas_between_fields() {
        let input = "{\n  \"a\": \"x\"\n  \"b\": 2\n  \"c\": [1 2]\n}";
        assert_eq!(parse(input), Some(json!({"a": "x", "b": 2, "c": [1, 2]})));
    }

    #[test]
    fn test_trailing_commas() {
        let input = r#"{"a": [1, 2,], "b": {"c": 1,},}"#;
        assert_eq!(parse(input), Some(json!({"a": [1, 2], "b": {"c": 1}})));
    }

    #[test]
    fn test_literal_newlines_inside_strings() {
        let input = "{\"html\": \"<p>one</p>\n<p>two</p>\t\r\"}";
        assert_eq!(
            parse(input),
            Some(json!({"html": "<p>one</p>\n<p>two</p>\t"}))
        );
    }

    #[test]
    fn test_control_characters_are_stripped() {
        let input = "{\"a\": \"b\u{0001}\"\u{0007}}";
        assert_eq!(parse(input), Some(json!({"a": "b"})));
    }

    #[test]
    fn test_unrecoverable_returns_none() {
        assert_eq!(parse("no structure here"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("}}}"), None);
    }

    #[test]
    fn test_parse_as_typed() {
        #[derive(serde::Deserialize)]
        struct Out {
            risk: String,
        }
        let out: Out = parse_as("```\n{\"risk\": \"high\"}\n```").unwrap();
        assert_eq!(out.risk, "high");
    }

    // ── Individual transforms ──

    #[test]
    fn test_isolate_object_ignores_braces_in_strings() {
        let input = r#"noise {"a": "}{", "b": "\"}"} trailing"#;
        assert_eq!(isolate_object(input), r#"{"a": "}{", "b": "\"}"}"#);
    }

    #[test]
    fn test_remove_trailing_separators_keeps_commas_in_strings() {
        assert_eq!(
            remove_trailing_separators(r#"{"a": ", }"}"#),
            r#"{"a": ", }"}"#
        );
    }

    #[test]
    fn test_insert_missing_separators_between_objects() {
        assert_eq!(
            insert_missing_separators("[{\"a\": 1}\n{\"a\": 2}]"),
            "[{\"a\": 1},\n{\"a\": 2}]"
        );
    }

    #[test]
    fn test_drop_preamble() {
        assert_eq!(drop_preamble("Sure! {\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(drop_preamble("nothing"), "nothing");
    }
}
