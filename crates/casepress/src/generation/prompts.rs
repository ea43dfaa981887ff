//! Instructions and payloads for each kind of generation call.
//!
//! Retry hints stay typed until this point; `render_hints` is the only place
//! they become text.

use serde_json::Value;

use crate::collaborators::{GenerationRequest, GenerationTask};
use crate::quality::ImprovementHint;

const DEIDENTIFY_INSTRUCTION: &str = "\
You remove personally identifying details from Israeli court rulings written in Hebrew.
Replace every name of a private person, identity number, address, phone number, email,
bank or card number and exact birth date with a bracketed placeholder such as [שם הוסר].
Keep judges, courts, statutes, case numbers and amounts unchanged.
Return only one JSON object:
{\"deidentified_text\": string,
 \"identified_items\": [{\"original_category\": string, \"replacement\": string, \"confidence\": number}],
 \"overall_risk\": \"low\" | \"medium\" | \"high\",
 \"requires_manual_review\": boolean,
 \"review_notes\": string}";

const ANALYZE_INSTRUCTION: &str = "\
You analyze de-identified Israeli court rulings for a legal content site.
Return only one JSON object with these keys:
{\"subject_term\": string (the main legal topic, 2-4 Hebrew words),
 \"legal_area\": string,
 \"key_facts\": [string], \"legal_questions\": [string], \"legal_principles\": [string],
 \"court_decision\": string, \"compensation_amount\": number | null,
 \"relevant_laws\": [{\"name\": string, \"section\": string}],
 \"precedents_cited\": [{\"case_name\": string, \"case_number\": string}],
 \"practical_insights\": [string]}
key_facts, legal_questions and legal_principles must not be empty.";

const DRAFT_INSTRUCTION: &str = "\
You write SEO-optimized Hebrew articles for a law firm website, based on a structured
analysis of a court ruling. Never include any personal detail about the parties.
Use <h2>/<h3> headings, short paragraphs, at least one list, cite the relevant statutes
and precedents, add an FAQ section, a legal disclaimer and a call to action.
Return only one JSON object:
{\"title\": string, \"meta_title\": string, \"meta_description\": string,
 \"content_html\": string, \"excerpt\": string, \"focus_keyword\": string,
 \"secondary_keywords\": [string], \"long_tail_keywords\": [string],
 \"faq_items\": [{\"question\": string, \"answer\": string}],
 \"category_primary\": string, \"tags\": [string]}";

pub fn deidentify_request(chunk: &str, index: usize, total: usize) -> GenerationRequest {
    let payload = if total > 1 {
        format!("Part {} of {} of the ruling:\n\n{}", index + 1, total, chunk)
    } else {
        chunk.to_string()
    };
    GenerationRequest {
        task: GenerationTask::Deidentify,
        instruction: DEIDENTIFY_INSTRUCTION.to_string(),
        payload,
    }
}

pub fn analyze_request(text: &str, part: Option<(usize, usize)>) -> GenerationRequest {
    let payload = match part {
        Some((index, total)) => format!("Part {} of {} of the ruling:\n\n{}", index + 1, total, text),
        None => text.to_string(),
    };
    GenerationRequest {
        task: GenerationTask::Analyze,
        instruction: ANALYZE_INSTRUCTION.to_string(),
        payload,
    }
}

/// Draft request for one attempt. From the second attempt on, the payload
/// ends with the categories that fell short last time.
pub fn draft_request(context: &Value, subject_term: &str, hints: &[ImprovementHint]) -> GenerationRequest {
    let context = serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
    let mut payload = format!("Primary subject: {}\n\nRuling analysis:\n{}", subject_term, context);
    if !hints.is_empty() {
        payload.push_str("\n\n");
        payload.push_str(&render_hints(hints));
    }
    GenerationRequest {
        task: GenerationTask::Draft,
        instruction: DRAFT_INSTRUCTION.to_string(),
        payload,
    }
}

pub fn render_hints(hints: &[ImprovementHint]) -> String {
    let mut text = String::from("The previous draft fell short in these categories (score/threshold):");
    for hint in hints {
        text.push_str(&format!(
            "\n- {}: {}/{}, raise it by at least {} points",
            hint.category,
            hint.observed,
            hint.threshold,
            hint.delta()
        ));
    }
    text
}
