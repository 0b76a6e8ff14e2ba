//! Diagnosis → procedure appropriateness mappings (ACR 1–9 scale).
//!
//! Sources, in order: the named rule table below, then the persisted
//! `icd10_cpt_mappings` join. A final anatomy-consistency filter removes
//! procedures for a body region the dictation never mentions.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{params_from_iter, Connection};

use super::types::{
    AppropriatenessMapping, CandidateDiagnosisCode, CandidateProcedureCode, ClinicalContext,
};
use super::ValidationError;

pub struct MappingOutcome {
    pub cpt_code: &'static str,
    pub score: u8,
    pub justification: &'static str,
}

/// Condition → synthesized mappings.
pub struct MappingRule {
    pub name: &'static str,
    /// Anatomy token the context must contain.
    pub anatomy: &'static str,
    /// At least one must appear in the dictation (case-insensitive).
    pub keywords: &'static [&'static str],
    /// Diagnosis code that must be among the candidates.
    pub icd10_code: &'static str,
    pub evidence: &'static str,
    /// Emitted only for procedure codes present among the candidates.
    pub outcomes: &'static [MappingOutcome],
}

pub static MAPPING_RULES: &[MappingRule] = &[
    MappingRule {
        name: "right_shoulder_labral_tear",
        anatomy: "shoulder",
        keywords: &["labral", "labrum"],
        icd10_code: "S43.431A",
        evidence: "ACR Appropriateness Criteria: Shoulder Pain-Traumatic",
        outcomes: &[
            MappingOutcome {
                cpt_code: "73222",
                score: 9,
                justification: "MR arthrography is the reference standard for suspected labral tear.",
            },
            MappingOutcome {
                cpt_code: "73221",
                score: 7,
                justification: "Noncontrast MRI can detect labral tear when arthrography is not available.",
            },
        ],
    },
    MappingRule {
        name: "left_shoulder_labral_tear",
        anatomy: "shoulder",
        keywords: &["labral", "labrum"],
        icd10_code: "S43.432A",
        evidence: "ACR Appropriateness Criteria: Shoulder Pain-Traumatic",
        outcomes: &[
            MappingOutcome {
                cpt_code: "73222",
                score: 9,
                justification: "MR arthrography is the reference standard for suspected labral tear.",
            },
            MappingOutcome {
                cpt_code: "73221",
                score: 7,
                justification: "Noncontrast MRI can detect labral tear when arthrography is not available.",
            },
        ],
    },
];

/// Mutually exclusive body regions. `context` lists the extractor's anatomy
/// tokens in the region; `description` recognizes the region in CPT text.
struct AnatomyGroup {
    name: &'static str,
    context: &'static [&'static str],
    description: Regex,
}

fn group(name: &'static str, context: &'static [&'static str], regex_str: &str) -> AnatomyGroup {
    AnatomyGroup {
        name,
        context,
        description: Regex::new(regex_str).expect("Invalid anatomy group regex"),
    }
}

static ANATOMY_GROUPS: LazyLock<Vec<AnatomyGroup>> = LazyLock::new(|| {
    vec![
        group(
            "upper_extremity",
            &["shoulder", "elbow", "wrist", "hand"],
            r"(?i)\b(?:upper\s+extremity|shoulder|elbow|wrist|hand|finger|humerus|forearm)\b",
        ),
        group(
            "lower_extremity",
            &["hip", "knee", "ankle", "foot"],
            r"(?i)\b(?:lower\s+extremity|hip|knee|ankle|foot|femur|tibia|leg)\b",
        ),
        group("head", &["brain", "head"], r"(?i)\b(?:head|brain|skull|orbits?)\b"),
        group(
            "spine",
            &["lumbar", "cervical", "thoracic"],
            r"(?i)\b(?:spine|spinal|lumbar|lumbosacral|cervical|thoracic)\b",
        ),
        group("chest", &["chest"], r"(?i)\b(?:chest|thorax|lungs?)\b"),
        group(
            "abdomen_pelvis",
            &["abdomen", "pelvis"],
            r"(?i)\b(?:abdomen|abdominal|pelvis|pelvic)\b",
        ),
    ]
});

/// Build the mapping list for the candidate codes of one dictation.
pub fn find_appropriateness_mappings(
    conn: &Connection,
    diagnoses: &[CandidateDiagnosisCode],
    procedures: &[CandidateProcedureCode],
    dictation: &str,
    context: &ClinicalContext,
) -> Result<Vec<AppropriatenessMapping>, ValidationError> {
    let mut mappings = synthesize_mappings(MAPPING_RULES, diagnoses, procedures, dictation, context);
    let mut seen: HashSet<(String, String)> = mappings
        .iter()
        .map(|m| (m.icd10_code.clone(), m.cpt_code.clone()))
        .collect();

    for row in persisted_mappings(conn, diagnoses, procedures)? {
        if seen.insert((row.icd10_code.clone(), row.cpt_code.clone())) {
            mappings.push(row);
        }
    }

    let before = mappings.len();
    let kept = filter_by_anatomy(mappings, context);
    if kept.len() < before {
        tracing::debug!(dropped = before - kept.len(), "Dropped anatomically inconsistent mappings");
    }
    Ok(kept)
}

pub fn synthesize_mappings(
    rules: &[MappingRule],
    diagnoses: &[CandidateDiagnosisCode],
    procedures: &[CandidateProcedureCode],
    dictation: &str,
    context: &ClinicalContext,
) -> Vec<AppropriatenessMapping> {
    let lowered = dictation.to_lowercase();
    let mut out = Vec::new();

    for rule in rules {
        let applies = context.anatomy.iter().any(|a| a == rule.anatomy)
            && rule.keywords.iter().any(|k| lowered.contains(k))
            && diagnoses.iter().any(|d| d.code == rule.icd10_code);
        if !applies {
            continue;
        }
        tracing::debug!(rule = rule.name, "Mapping rule matched");

        for outcome in rule.outcomes {
            if let Some(proc) = procedures.iter().find(|p| p.code == outcome.cpt_code) {
                out.push(AppropriatenessMapping {
                    icd10_code: rule.icd10_code.to_string(),
                    cpt_code: outcome.cpt_code.to_string(),
                    cpt_description: proc.description.clone(),
                    score: outcome.score,
                    evidence: rule.evidence.to_string(),
                    justification: outcome.justification.to_string(),
                });
            }
        }
    }
    out
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn persisted_mappings(
    conn: &Connection,
    diagnoses: &[CandidateDiagnosisCode],
    procedures: &[CandidateProcedureCode],
) -> Result<Vec<AppropriatenessMapping>, ValidationError> {
    if diagnoses.is_empty() || procedures.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT m.icd10_code, m.cpt_code, c.description, m.appropriateness,
                COALESCE(m.evidence_source, ''), COALESCE(m.refined_justification, '')
         FROM icd10_cpt_mappings m
         JOIN cpt_codes c ON c.code = m.cpt_code
         WHERE m.icd10_code IN ({}) AND m.cpt_code IN ({})
         ORDER BY m.appropriateness DESC, m.id",
        placeholders(1, diagnoses.len()),
        placeholders(1 + diagnoses.len(), procedures.len()),
    );
    let codes = diagnoses
        .iter()
        .map(|d| d.code.as_str())
        .chain(procedures.iter().map(|p| p.code.as_str()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(codes), |row| {
            let score: i64 = row.get(3)?;
            Ok(AppropriatenessMapping {
                icd10_code: row.get(0)?,
                cpt_code: row.get(1)?,
                cpt_description: row.get(2)?,
                score: score.clamp(1, 9) as u8,
                evidence: row.get(4)?,
                justification: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn context_groups(context: &ClinicalContext) -> HashSet<&'static str> {
    ANATOMY_GROUPS
        .iter()
        .filter(|g| context.anatomy.iter().any(|a| g.context.contains(&a.as_str())))
        .map(|g| g.name)
        .collect()
}

fn description_groups(description: &str) -> HashSet<&'static str> {
    ANATOMY_GROUPS
        .iter()
        .filter(|g| g.description.is_match(description))
        .map(|g| g.name)
        .collect()
}

/// Drop mappings whose procedure names only regions outside the context.
/// Procedures naming no region, and contexts with no anatomy, keep everything.
pub fn filter_by_anatomy(
    mappings: Vec<AppropriatenessMapping>,
    context: &ClinicalContext,
) -> Vec<AppropriatenessMapping> {
    let wanted = context_groups(context);
    if wanted.is_empty() {
        return mappings;
    }
    mappings
        .into_iter()
        .filter(|m| {
            let named = description_groups(&m.cpt_description);
            named.is_empty() || !named.is_disjoint(&wanted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_code_database;
    use crate::pipeline::validation::context::extract_clinical_context;

    fn dx(code: &str) -> CandidateDiagnosisCode {
        CandidateDiagnosisCode {
            code: code.into(),
            description: String::new(),
            confidence: 0.9,
        }
    }

    fn px(code: &str, description: &str) -> CandidateProcedureCode {
        CandidateProcedureCode {
            code: code.into(),
            description: description.into(),
            modality: Some("MRI".into()),
            confidence: 0.9,
        }
    }

    const MRI_UE_CONTRAST: &str =
        "MRI any joint of upper extremity (shoulder, elbow, wrist); with contrast material(s)";
    const MRI_UE_PLAIN: &str =
        "MRI any joint of upper extremity (shoulder, elbow, wrist); without contrast material";
    const MRI_LE_PLAIN: &str =
        "MRI any joint of lower extremity (hip, knee, ankle); without contrast material";

    #[test]
    fn labral_rule_synthesizes_both_shoulder_mris() {
        let conn = open_memory_code_database().unwrap();
        let dictation = "Right shoulder MRI for suspected labral tear";
        let ctx = extract_clinical_context(dictation);
        let found = find_appropriateness_mappings(
            &conn,
            &[dx("S43.431A")],
            &[px("73222", MRI_UE_CONTRAST), px("73221", MRI_UE_PLAIN)],
            dictation,
            &ctx,
        )
        .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].cpt_code, "73222");
        assert_eq!(found[0].score, 9);
        assert_eq!(found[1].cpt_code, "73221");
        assert!(found.iter().all(|m| m.evidence.starts_with("ACR Appropriateness Criteria")));
    }

    #[test]
    fn labral_rule_needs_keyword() {
        let ctx = extract_clinical_context("Right shoulder pain, MRI");
        let found = synthesize_mappings(
            MAPPING_RULES,
            &[dx("S43.431A")],
            &[px("73222", MRI_UE_CONTRAST)],
            "Right shoulder pain, MRI",
            &ctx,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn persisted_mappings_ordered_by_score() {
        let conn = open_memory_code_database().unwrap();
        let dictation = "right shoulder pain";
        let ctx = extract_clinical_context(dictation);
        let found = find_appropriateness_mappings(
            &conn,
            &[dx("M25.511")],
            &[
                px("73222", MRI_UE_CONTRAST),
                px("73221", MRI_UE_PLAIN),
                px("73030", "Radiologic examination, shoulder; complete, minimum of 2 views"),
            ],
            dictation,
            &ctx,
        )
        .unwrap();

        let codes: Vec<&str> = found.iter().map(|m| m.cpt_code.as_str()).collect();
        assert_eq!(codes, vec!["73030", "73221", "73222"]);
        assert!(found.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn synthesized_mapping_wins_over_persisted_duplicate() {
        let conn = open_memory_code_database().unwrap();
        conn.execute(
            "INSERT INTO icd10_cpt_mappings (icd10_code, cpt_code, appropriateness, evidence_source)
             VALUES ('S43.431A', '73222', 5, 'local')",
            [],
        )
        .unwrap();
        let dictation = "shoulder labrum injury";
        let ctx = extract_clinical_context(dictation);
        let found = find_appropriateness_mappings(
            &conn,
            &[dx("S43.431A")],
            &[px("73222", MRI_UE_CONTRAST)],
            dictation,
            &ctx,
        )
        .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].score, 9);
    }

    #[test]
    fn lower_extremity_dropped_for_shoulder_context() {
        let conn = open_memory_code_database().unwrap();
        conn.execute(
            "INSERT INTO icd10_cpt_mappings (icd10_code, cpt_code, appropriateness, evidence_source)
             VALUES ('M25.511', '73721', 8, 'test')",
            [],
        )
        .unwrap();
        let dictation = "right shoulder pain, MRI";
        let ctx = extract_clinical_context(dictation);
        assert_eq!(ctx.anatomy, vec!["shoulder"]);

        let found = find_appropriateness_mappings(
            &conn,
            &[dx("M25.511")],
            &[px("73221", MRI_UE_PLAIN), px("73721", MRI_LE_PLAIN)],
            dictation,
            &ctx,
        )
        .unwrap();

        assert!(found.iter().any(|m| m.cpt_code == "73221"));
        assert!(!found.iter().any(|m| m.cpt_description.contains("lower extremity")));
    }

    #[test]
    fn empty_context_anatomy_keeps_everything() {
        let mapping = AppropriatenessMapping {
            icd10_code: "M25.511".into(),
            cpt_code: "73721".into(),
            cpt_description: MRI_LE_PLAIN.into(),
            score: 8,
            evidence: String::new(),
            justification: String::new(),
        };
        let kept = filter_by_anatomy(vec![mapping], &ClinicalContext::default());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn region_neutral_procedure_kept() {
        let mapping = AppropriatenessMapping {
            icd10_code: "M25.511".into(),
            cpt_code: "99999".into(),
            cpt_description: "Unlisted diagnostic radiographic procedure".into(),
            score: 4,
            evidence: String::new(),
            justification: String::new(),
        };
        let ctx = extract_clinical_context("shoulder pain");
        assert_eq!(filter_by_anatomy(vec![mapping], &ctx).len(), 1);
    }

    #[test]
    fn no_candidates_means_no_sql_rows() {
        let conn = open_memory_code_database().unwrap();
        let found =
            find_appropriateness_mappings(&conn, &[], &[], "knee", &ClinicalContext::default()).unwrap();
        assert!(found.is_empty());
    }
}
