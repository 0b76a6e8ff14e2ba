//! HIPAA scrubber applied to dictation text before it leaves the process.
//!
//! Pure regex redaction. Best-effort: false negatives are expected, and the
//! placeholders are built so they never match any pattern again.

use std::sync::LazyLock;

use regex::Regex;

/// A compiled PHI pattern and the placeholder that replaces it.
struct PhiPattern {
    regex: Regex,
    placeholder: &'static str,
}

fn pattern(regex_str: &str, placeholder: &'static str) -> PhiPattern {
    PhiPattern {
        regex: Regex::new(regex_str).expect("Invalid PHI regex pattern"),
        placeholder,
    }
}

/// Applied in order; more specific shapes come first so a phone number is
/// not half-eaten by the generic digit-run rule, and an honorific is taken
/// as a name before the address rule can read it as a street suffix.
static PHI_PATTERNS: LazyLock<Vec<PhiPattern>> = LazyLock::new(|| {
    vec![
        pattern(r"\b\d{3}-\d{2}-\d{4}\b", "[SSN]"),
        pattern(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b", "[EMAIL]"),
        pattern(
            r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s])\d{3}[-.\s]\d{4}\b",
            "[PHONE]",
        ),
        pattern(r"\b\d{1,2}[/-]\d{1,2}[/-](?:\d{4}|\d{2})\b", "[DATE]"),
        // Lowercase honorifics only count with a trailing dot: "ms" alone is
        // multiple sclerosis.
        pattern(
            r"\b(?:(?:Mr|Mrs|Ms|Miss|Dr)\.?|(?i:mr|mrs|ms|dr)\.)\s+[A-Z][a-zA-Z'-]+(?:\s+[A-Z][a-zA-Z'-]+)?",
            "[NAME]",
        ),
        // Street words and suffix must be capitalised; "CT", "ST" and
        // lowercase prose never qualify.
        pattern(
            r"\b\d{1,6}\s+(?:[A-Z][a-zA-Z0-9.]*\s+){1,4}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way|Place|Pl|Terrace|Circle)\b\.?",
            "[ADDRESS]",
        ),
        pattern(r"\b\d{6,10}\b", "[ID]"),
    ]
});

/// Redact protected health information from free text.
pub fn strip_phi(text: &str) -> String {
    let mut result = text.to_string();
    for p in PHI_PATTERNS.iter() {
        result = p.regex.replace_all(&result, p.placeholder).into_owned();
    }
    result
}
