//! Helpers for sanitizing data before it enters logs or tracing span attributes.
//!
//! Source documents carry personal data, so spans record hashes and short
//! redacted previews, never raw text.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Returns a short deterministic hash of a text for correlation without
/// exposing its content.
pub fn hash_text(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Masks identifier numbers, phones, emails and card numbers.
pub fn redact_pii(text: &str) -> String {
    crate::quality::leak::redact(text)
}

/// First `max_chars` characters of a redacted, single-line version of `text`.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = redact_pii(text).split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((byte, _)) => format!("{}…", &flat[..byte]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_text_deterministic() {
        let h1 = hash_text("פסק דין");
        let h2 = hash_text("פסק דין");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }

    #[test]
    fn test_hash_bytes_different_inputs_differ() {
        assert_ne!(hash_text("a"), hash_bytes(b"b"));
        assert_eq!(hash_text("a"), hash_bytes(b"a"));
    }

    #[test]
    fn test_preview_is_flat_and_short() {
        assert_eq!(preview("line one\n\nline   two", 100), "line one line two");
        assert_eq!(preview("abcdefgh", 3), "abc…");
    }

    #[test]
    fn test_preview_redacts_before_truncating() {
        let out = preview("ת.ז. 123456789 של התובע", 200);
        assert!(!out.contains("123456789"));
        assert!(out.contains("[redacted:identifier_number]"));
    }
}
