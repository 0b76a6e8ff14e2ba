use super::types::{AppropriatenessMapping, CandidateCodes};

/// Feedback length when the specialty is unknown or absent.
pub const DEFAULT_WORD_TARGET: usize = 33;

/// Characters kept from each coding note.
pub const REFERENCE_DOC_MAX_CHARS: usize = 1200;

/// Diagnosis candidates whose coding notes are attached to the prompt.
pub const REFERENCE_DOC_TOP_N: usize = 3;

const SPECIALTY_WORD_TARGETS: &[(&str, usize)] = &[
    ("cardiology", 34),
    ("neurology", 35),
    ("orthopedics", 30),
    ("oncology", 40),
    ("family medicine", 33),
    ("internal medicine", 36),
    ("emergency medicine", 28),
    ("pediatrics", 32),
    ("rheumatology", 35),
    ("gastroenterology", 36),
    ("pulmonology", 35),
];

/// Target feedback word count for a referring specialty.
pub fn target_word_count(specialty: Option<&str>) -> usize {
    let Some(specialty) = specialty else {
        return DEFAULT_WORD_TARGET;
    };
    let wanted = specialty.trim().to_lowercase();
    SPECIALTY_WORD_TARGETS
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, count)| *count)
        .unwrap_or(DEFAULT_WORD_TARGET)
}

pub const VALIDATION_RULES_PROMPT: &str = r#"
You are a radiology order validation assistant. You review a referring
clinician's dictation for an imaging study, decide whether the order is
supported by the documented indication, and assign billing codes.

VALIDATION GATES — apply in order, stop at the first failure:
1. MODALITY: the requested imaging modality is stated or unambiguous.
2. ANATOMY: the body part is stated. Paired structures need a laterality.
3. INDICATION: a clinical reason (symptom, finding, or suspected condition)
   is documented.
4. APPROPRIATENESS: the study is usually or possibly appropriate for the
   indication per the ACR Appropriateness Criteria. Use the mappings below
   when they apply.
5. PRIOR WORKUP: where the criteria expect radiographs or conservative care
   first, the dictation mentions them or explains why they were skipped.

ICD-10 CODING RULES:
- Code to the highest documented specificity. Never code a condition that is
  only suspected when a symptom code describes the documented finding, unless
  the dictation states the diagnosis.
- Laterality must match the dictation. Never use an unspecified-side code
  when the side is documented.
- Use the 7th character A for an initial encounter with an injury code.
- Prefer the candidate codes listed below. Do not invent codes.
- Exactly ONE diagnosis code has "isPrimary": true. All others are false.

STATUS VALUES:
- "valid": every gate passes.
- "invalid": the study is rarely appropriate for the documented indication.
- "needs_clarification": a gate fails because information is missing.

COMPLIANCE SCORE: an integer 1-9 on the ACR scale (7-9 usually appropriate,
4-6 may be appropriate, 1-3 usually not appropriate).

FEEDBACK: address the ordering clinician in about {word_target} words. Name
the missing element when the status is needs_clarification.

RESPONSE FORMAT: reply with a single JSON object in a ```json fence and
nothing else:

```json
{
  "validationStatus": "valid | invalid | needs_clarification",
  "complianceScore": 7,
  "feedback": "text",
  "diagnosisCodes": [
    {"code": "M25.511", "description": "Pain in right shoulder", "confidence": 0.9, "isPrimary": true}
  ],
  "procedureCodes": [
    {"code": "73221", "description": "MRI upper extremity joint without contrast", "confidence": 0.9}
  ],
  "internalReasoning": "short explanation of the gate results"
}
```
"#;

/// Serialize candidates, mappings and coding notes into one text block.
pub fn build_database_context(
    candidates: &CandidateCodes,
    mappings: &[AppropriatenessMapping],
    docs: &[(String, String)],
) -> String {
    let mut out = String::new();

    out.push_str("CANDIDATE ICD-10 CODES:\n");
    if candidates.diagnoses.is_empty() {
        out.push_str("- none found\n");
    }
    for d in &candidates.diagnoses {
        out.push_str(&format!(
            "- {}: {} (confidence {:.2})\n",
            d.code, d.description, d.confidence
        ));
    }

    out.push_str("\nCANDIDATE CPT CODES:\n");
    if candidates.procedures.is_empty() {
        out.push_str("- none found\n");
    }
    for p in &candidates.procedures {
        let modality = p.modality.as_deref().unwrap_or("unspecified");
        out.push_str(&format!(
            "- {}: {} [{}] (confidence {:.2})\n",
            p.code, p.description, modality, p.confidence
        ));
    }

    if !mappings.is_empty() {
        out.push_str("\nAPPROPRIATENESS MAPPINGS (ACR 1-9):\n");
        for m in mappings {
            out.push_str(&format!(
                "- {} -> {} ({}): {} - {}",
                m.icd10_code,
                m.cpt_code,
                m.cpt_description,
                m.score,
                m.category().label()
            ));
            if !m.evidence.is_empty() {
                out.push_str(&format!(". Evidence: {}", m.evidence));
            }
            if !m.justification.is_empty() {
                out.push_str(&format!(". {}", m.justification));
            }
            out.push('\n');
        }
    }

    if !docs.is_empty() {
        out.push_str("\nCODING NOTES:\n");
        for (code, content) in docs {
            out.push_str(&format!("<note code=\"{code}\">\n{content}\n</note>\n"));
        }
    }

    out
}

/// Static rules with the word target filled in, then the database context.
pub fn build_system_prompt(database_context: &str, specialty: Option<&str>) -> String {
    let rules = VALIDATION_RULES_PROMPT
        .replace("{word_target}", &target_word_count(specialty).to_string());
    let specialty_line = match specialty {
        Some(s) if !s.trim().is_empty() => format!("Referring specialty: {}\n\n", s.trim()),
        _ => String::new(),
    };
    format!(
        "{}\n{specialty_line}DATABASE CONTEXT:\n{database_context}",
        rules.trim_end()
    )
}

/// Wrap the scrubbed dictation for the user turn.
pub fn build_user_message(scrubbed_dictation: &str) -> String {
    format!(
        "Validate this imaging order dictation:\n\n<dictation>\n{}\n</dictation>",
        scrubbed_dictation.trim()
    )
}
