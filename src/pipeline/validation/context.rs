use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{ClinicalContext, Laterality, PatientAttributes};

/// A canonical token and the pattern that recognizes it in dictation text.
struct TermPattern {
    token: &'static str,
    regex: Regex,
}

fn term(token: &'static str, regex_str: &str) -> TermPattern {
    TermPattern {
        token,
        regex: Regex::new(regex_str).expect("Invalid clinical term regex"),
    }
}

static MODALITY_PATTERNS: LazyLock<Vec<TermPattern>> = LazyLock::new(|| {
    vec![
        term("mri", r"(?i)\b(?:mri|magnetic\s+resonance)\b"),
        term("ct", r"(?i)\b(?:ct|cat\s+scan|computed\s+tomography)\b"),
        term("xray", r"(?i)\b(?:x-?rays?|radiographs?|plain\s+films?)\b"),
        term("ultrasound", r"(?i)\b(?:ultrasound|sonograph\w*|doppler)\b"),
        term("pet", r"(?i)\b(?:pet|positron\s+emission)\b"),
        term("mammography", r"(?i)\bmammogra\w*"),
        term("arthrogram", r"(?i)\barthrogra\w*"),
        term("nuclear", r"(?i)\b(?:bone\s+scan|nuclear\s+medicine|scintigraph\w*)\b"),
    ]
});

static ANATOMY_PATTERNS: LazyLock<Vec<TermPattern>> = LazyLock::new(|| {
    vec![
        term(
            "shoulder",
            r"(?i)\b(?:shoulders?|glenohumeral|rotator\s+cuff|labrum|labral|acromioclavicular|ac\s+joint)\b",
        ),
        term("elbow", r"(?i)\belbows?\b"),
        term("wrist", r"(?i)\b(?:wrists?|carpal|scaphoid)\b"),
        term("hand", r"(?i)\b(?:hands?|fingers?|thumbs?)\b"),
        term("hip", r"(?i)\b(?:hips?|acetabul\w*)\b"),
        term("knee", r"(?i)\b(?:knees?|meniscus|meniscal|menisci|patella\w*|acl|pcl)\b"),
        term("ankle", r"(?i)\b(?:ankles?|achilles)\b"),
        term("foot", r"(?i)\b(?:foot|feet|toes?|heel)\b"),
        term("lumbar", r"(?i)\b(?:lumbar|low(?:er)?\s+back|lumbosacral)\b"),
        term("cervical", r"(?i)\b(?:cervical\s+spine|c-spine|neck)\b"),
        term("thoracic", r"(?i)\bthoracic\s+spine\b"),
        term("brain", r"(?i)\b(?:brain|intracranial|cerebral)\b"),
        term("head", r"(?i)\b(?:head|skull|headaches?)\b"),
        term("chest", r"(?i)\b(?:chest|lungs?|pulmonary|thorax)\b"),
        term(
            "abdomen",
            r"(?i)\b(?:abdomen|abdominal|liver|kidneys?|renal|pancrea\w*|gallbladder|appendi\w*)\b",
        ),
        term("pelvis", r"(?i)\b(?:pelvis|pelvic|bladder|uterus|ovar\w*|prostate)\b"),
    ]
});

static CONDITION_PATTERNS: LazyLock<Vec<TermPattern>> = LazyLock::new(|| {
    vec![
        term("pain", r"(?i)\b(?:pain|painful|ache|aching|tenderness)\b"),
        term("tear", r"(?i)\b(?:tears?|torn|ruptured?)\b"),
        term("instability", r"(?i)\b(?:instability|unstable|dislocat\w*|subluxat\w*)\b"),
        term("trauma", r"(?i)\b(?:injur\w*|trauma\w*|fall|fell|accident)\b"),
        term("fracture", r"(?i)\b(?:fractur\w*|broken)\b"),
        term(
            "mass",
            r"(?i)\b(?:mass|masses|tumou?rs?|lesions?|nodules?|neoplasm|cancer|malignan\w*)\b",
        ),
        term("infection", r"(?i)\b(?:infection|infected|osteomyelitis|abscess|septic)\b"),
        term("headache", r"(?i)\b(?:headaches?|migraines?)\b"),
        term("radiculopathy", r"(?i)\b(?:radiculopathy|radiating|numbness|tingling|sciatica)\b"),
        term("swelling", r"(?i)\b(?:swelling|swollen|effusion)\b"),
        term("weakness", r"(?i)\bweakness\b"),
    ]
});

/// Priority order matters: the first side found wins.
static LATERALITY_PATTERNS: LazyLock<Vec<(Laterality, Regex)>> = LazyLock::new(|| {
    vec![
        (Laterality::Right, Regex::new(r"(?i)\bright\b").expect("laterality regex")),
        (Laterality::Left, Regex::new(r"(?i)\bleft\b").expect("laterality regex")),
        (
            Laterality::Bilateral,
            Regex::new(r"(?i)\b(?:bilateral|bilaterally|both)\b").expect("laterality regex"),
        ),
    ]
});

static AGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*(?:-\s*)?(?:years?|yrs?|yo\b|y/o|y\.o\.)(?:\s*-?\s*old)?")
        .expect("age regex")
});

static ATHLETE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:athletes?|athletic|players?|pitchers?|runners?|swimmers?|sports?|competitive)\b")
        .expect("athlete regex")
});

static TOKEN_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("token split regex"));

/// Words that carry no search value against code descriptions.
pub const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "before", "being", "complains", "days", "does", "evaluate",
    "evaluation", "female", "from", "have", "history", "into", "male", "months", "more", "order",
    "over", "patient", "please", "presents", "reports", "requested", "rule", "since", "some",
    "study", "that", "their", "there", "they", "this", "under", "weeks", "were", "what", "when",
    "which", "will", "with", "without", "year", "years", "old",
];

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Build the structured context for a dictation.
pub fn extract_clinical_context(text: &str) -> ClinicalContext {
    let laterality = LATERALITY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(side, _)| *side)
        .unwrap_or(Laterality::Unspecified);

    let approximate_age = AGE_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|age| *age <= 120);

    ClinicalContext {
        modalities: matched_tokens(&MODALITY_PATTERNS, text),
        anatomy: matched_tokens(&ANATOMY_PATTERNS, text),
        laterality,
        conditions: matched_tokens(&CONDITION_PATTERNS, text),
        patient: PatientAttributes {
            approximate_age,
            athlete: ATHLETE_PATTERN.is_match(text),
        },
    }
}

/// Lowercase search keywords: category hits plus generic tokens.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    let context = extract_clinical_context(text);
    keywords_for(text, &context)
}

/// Context and keyword set in one pass over the pattern tables.
pub fn extract(text: &str) -> (ClinicalContext, BTreeSet<String>) {
    let context = extract_clinical_context(text);
    let keywords = keywords_for(text, &context);
    (context, keywords)
}

fn keywords_for(text: &str, context: &ClinicalContext) -> BTreeSet<String> {
    let mut keywords: BTreeSet<String> = context
        .modalities
        .iter()
        .chain(&context.anatomy)
        .chain(&context.conditions)
        .cloned()
        .collect();

    if context.laterality != Laterality::Unspecified {
        keywords.insert(context.laterality.as_str().to_string());
    }

    let lowered = text.to_lowercase();
    for word in TOKEN_SPLIT.split(&lowered) {
        if word.len() > 3 && !is_stopword(word) && !word.chars().all(|c| c.is_ascii_digit()) {
            keywords.insert(word.to_string());
        }
    }

    keywords
}

fn matched_tokens(patterns: &[TermPattern], text: &str) -> Vec<String> {
    patterns
        .iter()
        .filter(|p| p.regex.is_match(text))
        .map(|p| p.token.to_string())
        .collect()
}
