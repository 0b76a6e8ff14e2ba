//! Rule-based validation used whenever the LLM result is unavailable.
//!
//! Deterministic: the same dictation and specialty always produce the same
//! status and code lists.

use super::context::extract_clinical_context;
use super::parser::repair_primary;
use super::prompt::target_word_count;
use super::types::{
    ClinicalContext, DiagnosisCode, Laterality, ProcedureCode, ValidationResult, ValidationStatus,
};

/// Minimum dictation length, in words, for a fallback `valid`.
pub const MOCK_MIN_WORDS: usize = 8;

const MOCK_CONFIDENCE: f32 = 0.6;

struct MockDiagnosis {
    anatomy: &'static str,
    /// `None` matches any side.
    side: Option<Laterality>,
    /// Any of these substrings in the lowercased dictation; empty means always.
    terms: &'static [&'static str],
    code: &'static str,
    description: &'static str,
}

struct MockProcedure {
    modality: &'static str,
    anatomy: &'static str,
    terms: &'static [&'static str],
    code: &'static str,
    description: &'static str,
}

const R: Option<Laterality> = Some(Laterality::Right);
const L: Option<Laterality> = Some(Laterality::Left);
const U: Option<Laterality> = Some(Laterality::Unspecified);

/// First matching row per anatomy site and side wins. Bilateral findings
/// are coded once per side.
static MOCK_DIAGNOSES: &[MockDiagnosis] = &[
    MockDiagnosis { anatomy: "shoulder", side: R, terms: &["labral", "labrum", "slap"], code: "S43.431A", description: "Superior glenoid labrum lesion of right shoulder, initial encounter" },
    MockDiagnosis { anatomy: "shoulder", side: L, terms: &["labral", "labrum", "slap"], code: "S43.432A", description: "Superior glenoid labrum lesion of left shoulder, initial encounter" },
    MockDiagnosis { anatomy: "shoulder", side: R, terms: &["rotator cuff"], code: "M75.101", description: "Unspecified rotator cuff tear or rupture of right shoulder, not specified as traumatic" },
    MockDiagnosis { anatomy: "shoulder", side: L, terms: &["rotator cuff"], code: "M75.102", description: "Unspecified rotator cuff tear or rupture of left shoulder, not specified as traumatic" },
    MockDiagnosis { anatomy: "shoulder", side: R, terms: &[], code: "M25.511", description: "Pain in right shoulder" },
    MockDiagnosis { anatomy: "shoulder", side: L, terms: &[], code: "M25.512", description: "Pain in left shoulder" },
    MockDiagnosis { anatomy: "shoulder", side: U, terms: &[], code: "M25.519", description: "Pain in unspecified shoulder" },
    MockDiagnosis { anatomy: "knee", side: R, terms: &["menisc"], code: "S83.241A", description: "Other tear of medial meniscus, current injury, right knee, initial encounter" },
    MockDiagnosis { anatomy: "knee", side: L, terms: &["menisc"], code: "S83.242A", description: "Other tear of medial meniscus, current injury, left knee, initial encounter" },
    MockDiagnosis { anatomy: "knee", side: R, terms: &[], code: "M25.561", description: "Pain in right knee" },
    MockDiagnosis { anatomy: "knee", side: L, terms: &[], code: "M25.562", description: "Pain in left knee" },
    MockDiagnosis { anatomy: "knee", side: U, terms: &[], code: "M25.569", description: "Pain in unspecified knee" },
    MockDiagnosis { anatomy: "hip", side: R, terms: &[], code: "M25.551", description: "Pain in right hip" },
    MockDiagnosis { anatomy: "hip", side: L, terms: &[], code: "M25.552", description: "Pain in left hip" },
    MockDiagnosis { anatomy: "hip", side: U, terms: &[], code: "M25.559", description: "Pain in unspecified hip" },
    MockDiagnosis { anatomy: "ankle", side: R, terms: &[], code: "M25.571", description: "Pain in right ankle and joints of right foot" },
    MockDiagnosis { anatomy: "ankle", side: L, terms: &[], code: "M25.572", description: "Pain in left ankle and joints of left foot" },
    MockDiagnosis { anatomy: "ankle", side: U, terms: &[], code: "M25.579", description: "Pain in unspecified ankle and joints of unspecified foot" },
    MockDiagnosis { anatomy: "lumbar", side: None, terms: &["radicul", "sciatica", "radiating"], code: "M54.16", description: "Radiculopathy, lumbar region" },
    MockDiagnosis { anatomy: "lumbar", side: None, terms: &[], code: "M54.50", description: "Low back pain, unspecified" },
    MockDiagnosis { anatomy: "cervical", side: None, terms: &["radicul", "radiating"], code: "M54.12", description: "Radiculopathy, cervical region" },
    MockDiagnosis { anatomy: "cervical", side: None, terms: &[], code: "M54.2", description: "Cervicalgia" },
    MockDiagnosis { anatomy: "head", side: None, terms: &["concussion", "head injury", "fall"], code: "S06.0X0A", description: "Concussion without loss of consciousness, initial encounter" },
    MockDiagnosis { anatomy: "head", side: None, terms: &[], code: "R51.9", description: "Headache, unspecified" },
    MockDiagnosis { anatomy: "brain", side: None, terms: &[], code: "R51.9", description: "Headache, unspecified" },
    MockDiagnosis { anatomy: "chest", side: None, terms: &["nodule"], code: "R91.1", description: "Solitary pulmonary nodule" },
    MockDiagnosis { anatomy: "chest", side: None, terms: &[], code: "R07.9", description: "Chest pain, unspecified" },
    MockDiagnosis { anatomy: "abdomen", side: None, terms: &["right lower quadrant", "rlq", "appendic"], code: "R10.31", description: "Right lower quadrant pain" },
    MockDiagnosis { anatomy: "abdomen", side: None, terms: &[], code: "R10.9", description: "Unspecified abdominal pain" },
];

/// First matching row per (modality, anatomy) pair wins.
static MOCK_PROCEDURES: &[MockProcedure] = &[
    MockProcedure { modality: "mri", anatomy: "shoulder", terms: &["labral", "labrum", "arthrogra"], code: "73222", description: "MRI any joint of upper extremity; with contrast material(s)" },
    MockProcedure { modality: "mri", anatomy: "shoulder", terms: &[], code: "73221", description: "MRI any joint of upper extremity; without contrast material" },
    MockProcedure { modality: "arthrogram", anatomy: "shoulder", terms: &[], code: "23350", description: "Injection procedure for shoulder arthrography" },
    MockProcedure { modality: "xray", anatomy: "shoulder", terms: &[], code: "73030", description: "Radiologic examination, shoulder; complete, minimum of 2 views" },
    MockProcedure { modality: "ct", anatomy: "shoulder", terms: &[], code: "73200", description: "CT upper extremity; without contrast material" },
    MockProcedure { modality: "mri", anatomy: "knee", terms: &[], code: "73721", description: "MRI any joint of lower extremity; without contrast material" },
    MockProcedure { modality: "mri", anatomy: "hip", terms: &[], code: "73721", description: "MRI any joint of lower extremity; without contrast material" },
    MockProcedure { modality: "mri", anatomy: "ankle", terms: &[], code: "73721", description: "MRI any joint of lower extremity; without contrast material" },
    MockProcedure { modality: "xray", anatomy: "knee", terms: &[], code: "73562", description: "Radiologic examination, knee; 3 views" },
    MockProcedure { modality: "xray", anatomy: "hip", terms: &[], code: "73502", description: "Radiologic examination, hip, unilateral; 2-3 views" },
    MockProcedure { modality: "mri", anatomy: "lumbar", terms: &[], code: "72148", description: "MRI spinal canal and contents, lumbar; without contrast material" },
    MockProcedure { modality: "xray", anatomy: "lumbar", terms: &[], code: "72100", description: "Radiologic examination, spine, lumbosacral; 2 or 3 views" },
    MockProcedure { modality: "mri", anatomy: "cervical", terms: &[], code: "72141", description: "MRI spinal canal and contents, cervical; without contrast material" },
    MockProcedure { modality: "mri", anatomy: "brain", terms: &[], code: "70551", description: "MRI brain (including brain stem); without contrast material" },
    MockProcedure { modality: "mri", anatomy: "head", terms: &[], code: "70551", description: "MRI brain (including brain stem); without contrast material" },
    MockProcedure { modality: "ct", anatomy: "head", terms: &[], code: "70450", description: "CT head or brain; without contrast material" },
    MockProcedure { modality: "ct", anatomy: "brain", terms: &[], code: "70450", description: "CT head or brain; without contrast material" },
    MockProcedure { modality: "xray", anatomy: "chest", terms: &[], code: "71046", description: "Radiologic examination, chest; 2 views" },
    MockProcedure { modality: "ct", anatomy: "chest", terms: &[], code: "71250", description: "CT thorax (chest); without contrast material" },
    MockProcedure { modality: "ct", anatomy: "abdomen", terms: &[], code: "74177", description: "CT abdomen and pelvis; with contrast material(s)" },
    MockProcedure { modality: "ct", anatomy: "pelvis", terms: &[], code: "74177", description: "CT abdomen and pelvis; with contrast material(s)" },
    MockProcedure { modality: "ultrasound", anatomy: "abdomen", terms: &[], code: "76700", description: "Ultrasound, abdominal, real time with image documentation; complete" },
];

fn terms_match(terms: &[&str], lowered: &str) -> bool {
    terms.is_empty() || terms.iter().any(|t| lowered.contains(t))
}

fn mock_diagnoses(context: &ClinicalContext, lowered: &str) -> Vec<DiagnosisCode> {
    let sides = match context.laterality {
        Laterality::Bilateral => vec![Laterality::Right, Laterality::Left],
        side => vec![side],
    };
    let mut out: Vec<DiagnosisCode> = Vec::new();
    for (site, side) in context.anatomy.iter().flat_map(|a| sides.iter().map(move |s| (a, *s))) {
        let hit = MOCK_DIAGNOSES.iter().find(|row| {
            row.anatomy == site
                && row.side.map_or(true, |s| s == side)
                && terms_match(row.terms, lowered)
        });
        if let Some(row) = hit {
            if !out.iter().any(|d| d.code == row.code) {
                out.push(DiagnosisCode {
                    code: row.code.to_string(),
                    description: row.description.to_string(),
                    confidence: Some(MOCK_CONFIDENCE),
                    is_primary: false,
                });
            }
        }
    }
    repair_primary(out)
}

fn mock_procedures(context: &ClinicalContext, lowered: &str) -> Vec<ProcedureCode> {
    let mut out: Vec<ProcedureCode> = Vec::new();
    for modality in &context.modalities {
        for site in &context.anatomy {
            let hit = MOCK_PROCEDURES.iter().find(|row| {
                row.modality == modality && row.anatomy == site && terms_match(row.terms, lowered)
            });
            if let Some(row) = hit {
                if !out.iter().any(|p| p.code == row.code) {
                    out.push(ProcedureCode {
                        code: row.code.to_string(),
                        description: row.description.to_string(),
                        confidence: Some(MOCK_CONFIDENCE),
                    });
                }
            }
        }
    }
    out
}

/// Cut text to at most `max_words` words.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    let mut cut = words[..max_words].join(" ");
    cut = cut.trim_end_matches([',', ';', ':']).to_string();
    if !cut.ends_with('.') {
        cut.push('.');
    }
    cut
}

fn feedback_for(context: &ClinicalContext, status: ValidationStatus, word_count: usize) -> String {
    match status {
        ValidationStatus::Valid => {
            let side = match context.laterality {
                Laterality::Unspecified => String::new(),
                other => format!("{} ", other.as_str()),
            };
            let indication = context
                .conditions
                .first()
                .map(String::as_str)
                .unwrap_or("the documented indication");
            format!(
                "Automated review: {} of the {side}{} for {indication} appears supported. \
                 Codes were assigned from the reference table without AI review; \
                 confirm the primary diagnosis and document prior imaging or conservative care before signing.",
                context.modalities[0].to_uppercase(),
                context.anatomy[0],
            )
        }
        _ => {
            let mut missing = Vec::new();
            if context.modalities.is_empty() {
                missing.push("the imaging modality");
            }
            if context.anatomy.is_empty() {
                missing.push("the body part");
            }
            if word_count < MOCK_MIN_WORDS {
                missing.push("the clinical indication and symptom history");
            }
            format!(
                "Automated review: please clarify {} so the order can be validated. \
                 Include laterality, symptom duration and relevant prior imaging.",
                missing.join(" and ")
            )
        }
    }
}

/// Deterministic fallback result for a dictation.
pub fn generate_mock_validation(dictation: &str, specialty: Option<&str>) -> ValidationResult {
    let context = extract_clinical_context(dictation);
    let lowered = dictation.to_lowercase();
    let word_count = dictation.split_whitespace().count();

    let complete = !context.modalities.is_empty()
        && !context.anatomy.is_empty()
        && word_count >= MOCK_MIN_WORDS;
    let (validation_status, compliance_score) = if complete {
        (ValidationStatus::Valid, 7)
    } else {
        (ValidationStatus::NeedsClarification, 4)
    };

    let feedback = truncate_words(
        &feedback_for(&context, validation_status, word_count),
        target_word_count(specialty),
    );

    ValidationResult {
        validation_status,
        compliance_score,
        feedback,
        diagnosis_codes: mock_diagnoses(&context, &lowered),
        procedure_codes: mock_procedures(&context, &lowered),
        internal_reasoning: Some(format!(
            "Rule-based fallback: modalities={:?}, anatomy={:?}, laterality={}, words={word_count}",
            context.modalities,
            context.anatomy,
            context.laterality.as_str()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOULDER: &str =
        "45 year old pitcher with right shoulder pain for three months, MRI to evaluate labral tear";

    #[test]
    fn complete_dictation_is_valid() {
        let result = generate_mock_validation(SHOULDER, Some("Orthopedics"));
        assert_eq!(result.validation_status, ValidationStatus::Valid);
        assert_eq!(result.compliance_score, 7);
        assert_eq!(result.diagnosis_codes[0].code, "S43.431A");
        assert!(result.diagnosis_codes[0].is_primary);
        assert_eq!(result.procedure_codes[0].code, "73222");
        assert!(result.feedback.split_whitespace().count() <= 30);
    }

    #[test]
    fn repeated_calls_match() {
        for specialty in [None, Some("Neurology"), Some("Emergency Medicine")] {
            let a = generate_mock_validation(SHOULDER, specialty);
            let b = generate_mock_validation(SHOULDER, specialty);
            assert_eq!(a.validation_status, b.validation_status);
            assert_eq!(a.diagnosis_codes, b.diagnosis_codes);
            assert_eq!(a.procedure_codes, b.procedure_codes);
        }
    }

    #[test]
    fn short_dictation_needs_clarification() {
        let result = generate_mock_validation("MRI right knee", None);
        assert_eq!(result.validation_status, ValidationStatus::NeedsClarification);
        assert_eq!(result.compliance_score, 4);
        assert_eq!(result.diagnosis_codes[0].code, "M25.561");
        assert_eq!(result.procedure_codes[0].code, "73721");
        assert!(result.feedback.contains("clinical indication"));
    }

    #[test]
    fn missing_modality_needs_clarification() {
        let result = generate_mock_validation(
            "patient with persistent low back pain radiating down the left leg for six weeks",
            None,
        );
        assert_eq!(result.validation_status, ValidationStatus::NeedsClarification);
        assert!(result.feedback.contains("imaging modality"));
        assert_eq!(result.diagnosis_codes[0].code, "M54.16");
        assert!(result.procedure_codes.is_empty());
    }

    #[test]
    fn unspecified_side_uses_unspecified_code() {
        let result = generate_mock_validation("shoulder x-ray for chronic pain after lifting injury at work", None);
        assert_eq!(result.diagnosis_codes[0].code, "M25.519");
        assert_eq!(result.procedure_codes[0].code, "73030");
    }

    #[test]
    fn bilateral_codes_each_side() {
        let result = generate_mock_validation("bilateral shoulder pain for two months, MRI requested to evaluate", None);
        let codes: Vec<&str> = result.diagnosis_codes.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, vec!["M25.511", "M25.512"]);
        assert_eq!(result.diagnosis_codes.iter().filter(|d| d.is_primary).count(), 1);
    }

    #[test]
    fn paired_joints_without_side_still_coded() {
        for (dictation, code) in [
            ("knee MRI for pain after twisting injury playing soccer", "M25.569"),
            ("hip x-ray for pain with walking over the last month", "M25.559"),
            ("ankle MRI for pain and swelling after a fall last week", "M25.579"),
        ] {
            let result = generate_mock_validation(dictation, None);
            assert_eq!(result.diagnosis_codes[0].code, code, "input: {dictation}");
        }
    }

    #[test]
    fn nothing_recognized_yields_empty_codes() {
        let result = generate_mock_validation("please see patient", None);
        assert!(result.diagnosis_codes.is_empty());
        assert!(result.procedure_codes.is_empty());
        assert_eq!(result.validation_status, ValidationStatus::NeedsClarification);
    }

    #[test]
    fn exactly_one_primary() {
        let result = generate_mock_validation(
            "CT chest and abdomen for chest pain and abdominal pain after a car accident today",
            None,
        );
        assert!(result.diagnosis_codes.len() >= 2);
        assert_eq!(result.diagnosis_codes.iter().filter(|d| d.is_primary).count(), 1);
    }

    #[test]
    fn truncation() {
        assert_eq!(truncate_words("one two three", 5), "one two three");
        assert_eq!(truncate_words("one two, three four", 2), "one two.");
        assert_eq!(truncate_words("  a   b  ", 5), "a b");
    }
}
