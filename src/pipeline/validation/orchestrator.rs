use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;

use super::context::extract;
use super::lookup::lookup_candidate_codes;
use super::mapping::find_appropriateness_mappings;
use super::mock::generate_mock_validation;
use super::parser::parse_validation_response;
use super::prompt::{
    build_database_context, build_system_prompt, build_user_message, REFERENCE_DOC_MAX_CHARS,
    REFERENCE_DOC_TOP_N,
};
use super::types::{
    AppropriatenessMapping, CandidateCodes, ClinicalContext, LlmClient, ResultSource,
    ValidationOutcome, ValidationRequest, ValidationResult,
};
use super::ValidationError;
use crate::db::{fetch_reference_docs, open_code_database, open_memory_code_database, DatabaseError};
use crate::pipeline::phi::strip_phi;

/// Dictations shorter than this (after trimming) are rejected.
pub const MIN_DICTATION_CHARS: usize = 10;

/// Where each pipeline run opens its code database connection.
#[derive(Debug, Clone)]
pub enum CodeDatabase {
    File(PathBuf),
    /// Fresh seeded in-memory database per run (tests, demos).
    InMemory,
}

impl CodeDatabase {
    pub fn open(&self) -> Result<Connection, DatabaseError> {
        match self {
            CodeDatabase::File(path) => open_code_database(path),
            CodeDatabase::InMemory => open_memory_code_database(),
        }
    }
}

pub type SharedLlmClient = Arc<dyn LlmClient + Send + Sync>;

/// Database-side work done before the model call.
struct PreparedPrompt {
    candidates: CandidateCodes,
    mappings: Vec<AppropriatenessMapping>,
    system_prompt: String,
}

/// The dictation validation pipeline.
///
/// scrub → extract → lookup → map → prompt → LLM → parse, with one fallback
/// policy: any failure after input checks yields the rule-based result.
pub struct DictationValidator {
    llm: Option<SharedLlmClient>,
    code_db: CodeDatabase,
}

impl DictationValidator {
    pub fn new(llm: Option<SharedLlmClient>, code_db: CodeDatabase) -> Self {
        Self { llm, code_db }
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Validate and code one dictation. Blocking; call from a blocking thread.
    pub fn validate(&self, request: &ValidationRequest) -> Result<ValidationOutcome, ValidationError> {
        let dictation = request.dictation.trim();
        if dictation.chars().count() < MIN_DICTATION_CHARS {
            return Err(ValidationError::InputTooShort);
        }
        let specialty = request.specialty.as_deref();

        let scrubbed = strip_phi(dictation);
        let (context, keywords) = extract(&scrubbed);

        let Some(llm) = &self.llm else {
            tracing::warn!("LLM credential not configured, using rule-based validation");
            return Ok(fallback(&scrubbed, specialty, context, None, Vec::new()));
        };

        let prepared = match self.prepare(&scrubbed, specialty, &context, &keywords) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Code lookup failed, using rule-based validation");
                return Ok(fallback(&scrubbed, specialty, context, None, Vec::new()));
            }
        };

        let reply = llm
            .complete(&prepared.system_prompt, &build_user_message(&scrubbed))
            .and_then(|text| parse_validation_response(&text));

        match reply {
            Ok(result) => {
                tracing::info!(
                    status = result.validation_status.as_str(),
                    score = result.compliance_score,
                    diagnoses = result.diagnosis_codes.len(),
                    procedures = result.procedure_codes.len(),
                    "Dictation validated"
                );
                Ok(ValidationOutcome {
                    result,
                    source: ResultSource::Llm,
                    context,
                    candidates: Some(prepared.candidates),
                    mappings: prepared.mappings,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM validation failed, using rule-based validation");
                Ok(fallback(
                    &scrubbed,
                    specialty,
                    context,
                    Some(prepared.candidates),
                    prepared.mappings,
                ))
            }
        }
    }

    fn prepare(
        &self,
        scrubbed: &str,
        specialty: Option<&str>,
        context: &ClinicalContext,
        keywords: &std::collections::BTreeSet<String>,
    ) -> Result<PreparedPrompt, ValidationError> {
        let conn = self.code_db.open()?;
        let candidates = lookup_candidate_codes(&conn, keywords)?;
        let mappings = find_appropriateness_mappings(
            &conn,
            &candidates.diagnoses,
            &candidates.procedures,
            scrubbed,
            context,
        )?;

        let top: Vec<&str> = candidates
            .diagnoses
            .iter()
            .take(REFERENCE_DOC_TOP_N)
            .map(|d| d.code.as_str())
            .collect();
        let docs = fetch_reference_docs(&conn, &top, REFERENCE_DOC_MAX_CHARS)?;

        tracing::debug!(
            strategy = ?candidates.strategy,
            diagnoses = candidates.diagnoses.len(),
            procedures = candidates.procedures.len(),
            mappings = mappings.len(),
            docs = docs.len(),
            "Prompt context assembled"
        );

        let database_context = build_database_context(&candidates, &mappings, &docs);
        Ok(PreparedPrompt {
            system_prompt: build_system_prompt(&database_context, specialty),
            candidates,
            mappings,
        })
    }
}

fn fallback(
    scrubbed: &str,
    specialty: Option<&str>,
    context: ClinicalContext,
    candidates: Option<CandidateCodes>,
    mappings: Vec<AppropriatenessMapping>,
) -> ValidationOutcome {
    let result: ValidationResult = generate_mock_validation(scrubbed, specialty);
    tracing::info!(
        status = result.validation_status.as_str(),
        score = result.compliance_score,
        "Dictation validated by fallback"
    );
    ValidationOutcome {
        result,
        source: ResultSource::Fallback,
        context,
        candidates,
        mappings,
    }
}
