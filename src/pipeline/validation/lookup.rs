//! Candidate ICD-10 / CPT lookup against the reference code database.
//!
//! Two stages: hand-curated targeted queries keyed on recognized
//! anatomy/laterality/modality combinations, then a scored substring search
//! that only runs when no targeted query produced anything.

use std::collections::{BTreeSet, HashSet};

use rusqlite::{params_from_iter, Connection};

use super::context::is_stopword;
use super::types::{CandidateCodes, CandidateDiagnosisCode, CandidateProcedureCode, LookupStrategy};
use super::ValidationError;

/// Confidence assigned to every targeted hit.
pub const TARGETED_CONFIDENCE: f32 = 0.9;

/// Row cap for each generic search.
pub const GENERIC_RESULT_LIMIT: usize = 12;

pub enum TargetedQuery {
    /// Codes starting with one of the prefixes whose description contains
    /// one of the terms.
    Diagnosis {
        code_prefixes: &'static [&'static str],
        description_terms: &'static [&'static str],
    },
    /// Procedures of the given modalities naming one of the anatomy terms.
    /// When any contrast trigger keyword is present only contrast or
    /// arthrography studies are kept.
    Procedure {
        modalities: &'static [&'static str],
        anatomy_terms: &'static [&'static str],
        contrast_triggers: &'static [&'static str],
    },
}

pub struct TargetedRule {
    pub name: &'static str,
    /// Every group must have at least one keyword present.
    pub requires: &'static [&'static [&'static str]],
    pub query: TargetedQuery,
}

impl TargetedRule {
    pub fn applies(&self, keywords: &BTreeSet<String>) -> bool {
        self.requires
            .iter()
            .all(|group| group.iter().any(|k| keywords.contains(*k)))
    }
}

const SHOULDER_DX_PREFIXES: &[&str] = &["M25.51", "M25.31", "M75.", "S43."];
const KNEE_DX_PREFIXES: &[&str] = &["M25.56", "M25.46", "M23.", "S83."];
const CONTRAST_TRIGGERS: &[&str] = &["labral", "labrum"];

pub static TARGETED_RULES: &[TargetedRule] = &[
    TargetedRule {
        name: "right_shoulder_diagnoses",
        requires: &[&["shoulder"], &["right"]],
        query: TargetedQuery::Diagnosis {
            code_prefixes: SHOULDER_DX_PREFIXES,
            description_terms: &["right shoulder"],
        },
    },
    TargetedRule {
        name: "left_shoulder_diagnoses",
        requires: &[&["shoulder"], &["left"]],
        query: TargetedQuery::Diagnosis {
            code_prefixes: SHOULDER_DX_PREFIXES,
            description_terms: &["left shoulder"],
        },
    },
    TargetedRule {
        name: "right_knee_diagnoses",
        requires: &[&["knee"], &["right"]],
        query: TargetedQuery::Diagnosis {
            code_prefixes: KNEE_DX_PREFIXES,
            description_terms: &["right knee"],
        },
    },
    TargetedRule {
        name: "left_knee_diagnoses",
        requires: &[&["knee"], &["left"]],
        query: TargetedQuery::Diagnosis {
            code_prefixes: KNEE_DX_PREFIXES,
            description_terms: &["left knee"],
        },
    },
    TargetedRule {
        name: "right_hip_diagnoses",
        requires: &[&["hip"], &["right"]],
        query: TargetedQuery::Diagnosis {
            code_prefixes: &["M25.55"],
            description_terms: &["right hip"],
        },
    },
    TargetedRule {
        name: "left_hip_diagnoses",
        requires: &[&["hip"], &["left"]],
        query: TargetedQuery::Diagnosis {
            code_prefixes: &["M25.55"],
            description_terms: &["left hip"],
        },
    },
    TargetedRule {
        name: "shoulder_mri",
        requires: &[&["shoulder"], &["mri"]],
        query: TargetedQuery::Procedure {
            modalities: &["MRI"],
            anatomy_terms: &["shoulder", "upper extremity"],
            contrast_triggers: CONTRAST_TRIGGERS,
        },
    },
    TargetedRule {
        name: "shoulder_arthrogram",
        requires: &[&["shoulder"], &["arthrogram"]],
        query: TargetedQuery::Procedure {
            modalities: &["MRI", "Arthrogram"],
            anatomy_terms: &["shoulder"],
            contrast_triggers: &["arthrogram"],
        },
    },
    TargetedRule {
        name: "knee_mri",
        requires: &[&["knee"], &["mri"]],
        query: TargetedQuery::Procedure {
            modalities: &["MRI"],
            anatomy_terms: &["knee", "lower extremity"],
            contrast_triggers: &[],
        },
    },
    TargetedRule {
        name: "lumbar_mri",
        requires: &[&["lumbar"], &["mri"]],
        query: TargetedQuery::Procedure {
            modalities: &["MRI"],
            anatomy_terms: &["lumbar"],
            contrast_triggers: &[],
        },
    },
    TargetedRule {
        name: "brain_mri",
        requires: &[&["brain", "head"], &["mri"]],
        query: TargetedQuery::Procedure {
            modalities: &["MRI"],
            anatomy_terms: &["brain"],
            contrast_triggers: &[],
        },
    },
    TargetedRule {
        name: "head_ct",
        requires: &[&["head", "brain"], &["ct"]],
        query: TargetedQuery::Procedure {
            modalities: &["CT"],
            anatomy_terms: &["head"],
            contrast_triggers: &[],
        },
    },
    TargetedRule {
        name: "chest_ct",
        requires: &[&["chest"], &["ct"]],
        query: TargetedQuery::Procedure {
            modalities: &["CT"],
            anatomy_terms: &["chest", "thorax"],
            contrast_triggers: &[],
        },
    },
];

/// Find candidate diagnosis and procedure codes for a keyword set.
pub fn lookup_candidate_codes(
    conn: &Connection,
    keywords: &BTreeSet<String>,
) -> Result<CandidateCodes, ValidationError> {
    let (diagnoses, procedures) = run_targeted_rules(conn, keywords, TARGETED_RULES);

    if !diagnoses.is_empty() || !procedures.is_empty() {
        tracing::debug!(
            diagnoses = diagnoses.len(),
            procedures = procedures.len(),
            "Targeted code lookup matched"
        );
        return Ok(CandidateCodes {
            diagnoses,
            procedures,
            strategy: LookupStrategy::Targeted,
        });
    }

    let terms = search_terms(keywords);
    let diagnoses = generic_diagnosis_search(conn, &terms)?;
    let procedures = generic_procedure_search(conn, &terms)?;

    tracing::debug!(
        terms = terms.len(),
        diagnoses = diagnoses.len(),
        procedures = procedures.len(),
        "Generic code lookup"
    );

    Ok(CandidateCodes {
        diagnoses,
        procedures,
        strategy: LookupStrategy::Generic,
    })
}

/// Run every applicable rule. A failing query is logged and skipped.
pub fn run_targeted_rules(
    conn: &Connection,
    keywords: &BTreeSet<String>,
    rules: &[TargetedRule],
) -> (Vec<CandidateDiagnosisCode>, Vec<CandidateProcedureCode>) {
    let mut diagnoses: Vec<CandidateDiagnosisCode> = Vec::new();
    let mut procedures: Vec<CandidateProcedureCode> = Vec::new();
    let mut seen_dx: HashSet<String> = HashSet::new();
    let mut seen_px: HashSet<String> = HashSet::new();

    for rule in rules.iter().filter(|r| r.applies(keywords)) {
        match &rule.query {
            TargetedQuery::Diagnosis {
                code_prefixes,
                description_terms,
            } => match targeted_diagnoses(conn, code_prefixes, description_terms) {
                Ok(rows) => {
                    for row in rows {
                        if seen_dx.insert(row.code.clone()) {
                            diagnoses.push(row);
                        }
                    }
                }
                Err(e) => tracing::warn!(rule = rule.name, error = %e, "Targeted diagnosis query failed"),
            },
            TargetedQuery::Procedure {
                modalities,
                anatomy_terms,
                contrast_triggers,
            } => {
                let contrast_only = contrast_triggers.iter().any(|k| keywords.contains(*k));
                match targeted_procedures(conn, modalities, anatomy_terms, contrast_only) {
                    Ok(rows) => {
                        for row in rows {
                            if seen_px.insert(row.code.clone()) {
                                procedures.push(row);
                            }
                        }
                    }
                    Err(e) => tracing::warn!(rule = rule.name, error = %e, "Targeted procedure query failed"),
                }
            }
        }
    }

    (diagnoses, procedures)
}

fn like(term: &str) -> String {
    format!("%{term}%")
}

fn or_clause(column: &str, count: usize, first_param: usize) -> String {
    let parts: Vec<String> = (0..count)
        .map(|i| format!("{column} LIKE ?{}", first_param + i))
        .collect();
    format!("({})", parts.join(" OR "))
}

fn targeted_diagnoses(
    conn: &Connection,
    code_prefixes: &[&str],
    description_terms: &[&str],
) -> Result<Vec<CandidateDiagnosisCode>, rusqlite::Error> {
    let sql = format!(
        "SELECT code, description FROM icd10_codes WHERE {} AND {} ORDER BY code",
        or_clause("code", code_prefixes.len(), 1),
        or_clause("description", description_terms.len(), 1 + code_prefixes.len()),
    );
    let params: Vec<String> = code_prefixes
        .iter()
        .map(|p| format!("{p}%"))
        .chain(description_terms.iter().map(|t| like(t)))
        .collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok(CandidateDiagnosisCode {
                code: row.get(0)?,
                description: row.get(1)?,
                confidence: TARGETED_CONFIDENCE,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn targeted_procedures(
    conn: &Connection,
    modalities: &[&str],
    anatomy_terms: &[&str],
    contrast_only: bool,
) -> Result<Vec<CandidateProcedureCode>, rusqlite::Error> {
    let anatomy_start = 1 + modalities.len();
    let anatomy_parts: Vec<String> = (0..anatomy_terms.len())
        .map(|i| {
            let p = anatomy_start + i;
            format!("description LIKE ?{p} OR body_part LIKE ?{p}")
        })
        .collect();

    let mut sql = format!(
        "SELECT code, description, modality FROM cpt_codes WHERE {} AND ({})",
        or_clause("modality", modalities.len(), 1),
        anatomy_parts.join(" OR "),
    );
    if contrast_only {
        sql.push_str(
            " AND (description LIKE '%with contrast%'
                   OR description LIKE '%followed by contrast%'
                   OR description LIKE '%arthrogra%')",
        );
    }
    sql.push_str(" ORDER BY code");

    let params: Vec<String> = modalities
        .iter()
        .map(|m| m.to_string())
        .chain(anatomy_terms.iter().map(|t| like(t)))
        .collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok(CandidateProcedureCode {
                code: row.get(0)?,
                description: row.get(1)?,
                modality: row.get(2)?,
                confidence: TARGETED_CONFIDENCE,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Keywords worth matching against descriptions.
fn search_terms(keywords: &BTreeSet<String>) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| k.len() > 2 && !is_stopword(k))
        .cloned()
        .collect()
}

/// Map a keyword match count to a confidence value.
pub fn generic_confidence(score: i64) -> f32 {
    (0.5 + score as f32 * 0.1).min(0.9)
}

/// `(CASE WHEN description LIKE ?1 THEN 1 ELSE 0 END) + ...`
fn score_expression(count: usize) -> String {
    (1..=count)
        .map(|i| format!("(CASE WHEN description LIKE ?{i} THEN 1 ELSE 0 END)"))
        .collect::<Vec<_>>()
        .join(" + ")
}

fn generic_diagnosis_search(
    conn: &Connection,
    terms: &[String],
) -> Result<Vec<CandidateDiagnosisCode>, ValidationError> {
    if terms.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT code, description, match_score FROM (
             SELECT code, description, {} AS match_score FROM icd10_codes
         ) WHERE match_score > 0
         ORDER BY match_score DESC, code
         LIMIT {GENERIC_RESULT_LIMIT}",
        score_expression(terms.len()),
    );
    let params: Vec<String> = terms.iter().map(|t| like(t)).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok(CandidateDiagnosisCode {
                code: row.get(0)?,
                description: row.get(1)?,
                confidence: generic_confidence(row.get::<_, i64>(2)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn generic_procedure_search(
    conn: &Connection,
    terms: &[String],
) -> Result<Vec<CandidateProcedureCode>, ValidationError> {
    if terms.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT code, description, modality, match_score FROM (
             SELECT code, description, modality, {} AS match_score FROM cpt_codes
         ) WHERE match_score > 0
         ORDER BY match_score DESC, code
         LIMIT {GENERIC_RESULT_LIMIT}",
        score_expression(terms.len()),
    );
    let params: Vec<String> = terms.iter().map(|t| like(t)).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok(CandidateProcedureCode {
                code: row.get(0)?,
                description: row.get(1)?,
                modality: row.get(2)?,
                confidence: generic_confidence(row.get::<_, i64>(3)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_code_database;
    use crate::pipeline::validation::context::extract_keywords;

    fn keywords(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn right_shoulder_mri_uses_targeted_queries() {
        let conn = open_memory_code_database().unwrap();
        let kw = extract_keywords("Right shoulder pain for 3 months, MRI requested");
        let found = lookup_candidate_codes(&conn, &kw).unwrap();

        assert_eq!(found.strategy, LookupStrategy::Targeted);
        assert!(found.diagnoses.iter().any(|d| d.code == "M25.511"));
        assert!(found.diagnoses.iter().all(|d| d.description.contains("right shoulder")));
        assert!(found.procedures.iter().any(|p| p.code == "73221"));
        assert!(found
            .diagnoses
            .iter()
            .map(|d| d.confidence)
            .chain(found.procedures.iter().map(|p| p.confidence))
            .all(|c| (c - TARGETED_CONFIDENCE).abs() < f32::EPSILON));
    }

    #[test]
    fn labral_keyword_restricts_to_contrast_studies() {
        let conn = open_memory_code_database().unwrap();
        let kw = extract_keywords("Right shoulder MRI to evaluate labral tear in a pitcher");
        let found = lookup_candidate_codes(&conn, &kw).unwrap();

        assert!(found.diagnoses.iter().any(|d| d.code == "S43.431A"));
        let codes: Vec<&str> = found.procedures.iter().map(|p| p.code.as_str()).collect();
        assert!(codes.contains(&"73222"));
        assert!(codes.contains(&"73223"));
        assert!(!codes.contains(&"73221"));
    }

    #[test]
    fn targeted_results_are_deduplicated() {
        let conn = open_memory_code_database().unwrap();
        // shoulder_mri and shoulder_arthrogram both return 73222
        let kw = keywords(&["shoulder", "mri", "arthrogram", "labral"]);
        let found = lookup_candidate_codes(&conn, &kw).unwrap();
        let count = found.procedures.iter().filter(|p| p.code == "73222").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn generic_search_when_no_rule_applies() {
        let conn = open_memory_code_database().unwrap();
        let kw = keywords(&["abdominal", "pain", "ultrasound"]);
        let found = lookup_candidate_codes(&conn, &kw).unwrap();

        assert_eq!(found.strategy, LookupStrategy::Generic);
        assert!(found.diagnoses.iter().any(|d| d.code == "R10.9"));
        assert!(found.procedures.iter().any(|p| p.code == "76700"));
        assert!(found.diagnoses.len() <= GENERIC_RESULT_LIMIT);
        assert!(found.diagnoses.iter().all(|d| d.confidence <= 0.9 && d.confidence > 0.59));
    }

    #[test]
    fn generic_results_ordered_by_match_count() {
        let conn = open_memory_code_database().unwrap();
        let kw = keywords(&["abdominal", "pain"]);
        let found = lookup_candidate_codes(&conn, &kw).unwrap();
        // "Unspecified abdominal pain" matches both terms
        assert_eq!(found.diagnoses[0].code, "R10.9");
        assert!((found.diagnoses[0].confidence - 0.7).abs() < 1e-6);
        assert!(found
            .diagnoses
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn generic_confidence_is_capped() {
        assert!((generic_confidence(1) - 0.6).abs() < 1e-6);
        assert!((generic_confidence(3) - 0.8).abs() < 1e-6);
        assert!((generic_confidence(4) - 0.9).abs() < 1e-6);
        assert!((generic_confidence(10) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn empty_keywords_find_nothing() {
        let conn = open_memory_code_database().unwrap();
        let found = lookup_candidate_codes(&conn, &BTreeSet::new()).unwrap();
        assert_eq!(found.strategy, LookupStrategy::Generic);
        assert!(found.diagnoses.is_empty());
        assert!(found.procedures.is_empty());
    }

    #[test]
    fn failing_targeted_query_is_skipped() {
        let conn = open_memory_code_database().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = OFF; DROP TABLE cpt_codes;").unwrap();
        let kw = keywords(&["shoulder", "right", "mri"]);
        let (diagnoses, procedures) = run_targeted_rules(&conn, &kw, TARGETED_RULES);
        assert!(!diagnoses.is_empty());
        assert!(procedures.is_empty());
    }

    #[test]
    fn missing_tables_propagate_from_generic_search() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let kw = keywords(&["abdominal"]);
        let result = lookup_candidate_codes(&conn, &kw);
        assert!(matches!(result, Err(ValidationError::CodeDatabase(_))));
    }

    #[test]
    fn rule_requires_every_group() {
        let rule = &TARGETED_RULES[0];
        assert!(rule.applies(&keywords(&["shoulder", "right"])));
        assert!(!rule.applies(&keywords(&["shoulder"])));
        assert!(!rule.applies(&keywords(&["right", "knee"])));
    }
}
