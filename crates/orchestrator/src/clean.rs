//! Response cleaning.
//!
//! Backends wrap their answers in boilerplate lead-ins and ragged
//! whitespace; this strips both so the caller sees just the answer.

use once_cell::sync::Lazy;
use regex::Regex;

/// Lead-in prefixes stripped from the start of a response, in order.
static LEAD_IN_PREFIXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^Here\s+").unwrap(),
        Regex::new(r"(?i)^answer:\s*").unwrap(),
        Regex::new(r"(?i)^\(answer\):\s*").unwrap(),
        Regex::new(r"(?i)^Response:\s*").unwrap(),
        Regex::new(r"(?i)^Output:\s*").unwrap(),
    ]
});

static EXCESS_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*\n").unwrap());

/// Normalize a raw backend response for presentation.
///
/// Trims, strips known lead-in prefixes, and collapses runs of three or
/// more newlines to a single blank line. A response that is empty after
/// cleaning becomes `"No response generated."`.
pub fn clean_response(text: &str) -> String {
    if text.is_empty() {
        return "No response generated.".to_string();
    }

    let mut cleaned = text.trim().to_string();
    for prefix in LEAD_IN_PREFIXES.iter() {
        cleaned = prefix.replace(&cleaned, "").into_owned();
    }
    cleaned = EXCESS_BLANK_LINES.replace_all(&cleaned, "\n\n").into_owned();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        "No response generated.".to_string()
    } else {
        cleaned.to_string()
    }
}
