use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Anatomical side named in the dictation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Laterality {
    Right,
    Left,
    Bilateral,
    #[default]
    Unspecified,
}

impl Laterality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Laterality::Right => "right",
            Laterality::Left => "left",
            Laterality::Bilateral => "bilateral",
            Laterality::Unspecified => "unspecified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PatientAttributes {
    pub approximate_age: Option<u32>,
    pub athlete: bool,
}

/// Structured reading of one dictation. Recomputed per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClinicalContext {
    pub modalities: Vec<String>,
    pub anatomy: Vec<String>,
    pub laterality: Laterality,
    pub conditions: Vec<String>,
    pub patient: PatientAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDiagnosisCode {
    pub code: String,
    pub description: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProcedureCode {
    pub code: String,
    pub description: String,
    pub modality: Option<String>,
    pub confidence: f32,
}

/// Which search produced the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStrategy {
    Targeted,
    Generic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateCodes {
    pub diagnoses: Vec<CandidateDiagnosisCode>,
    pub procedures: Vec<CandidateProcedureCode>,
    pub strategy: LookupStrategy,
}

/// ACR bucket for a 1–9 appropriateness score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppropriatenessCategory {
    UsuallyAppropriate,
    MayBeAppropriate,
    RarelyAppropriate,
}

impl AppropriatenessCategory {
    pub fn from_score(score: u8) -> Self {
        if score >= 7 {
            AppropriatenessCategory::UsuallyAppropriate
        } else if score >= 4 {
            AppropriatenessCategory::MayBeAppropriate
        } else {
            AppropriatenessCategory::RarelyAppropriate
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AppropriatenessCategory::UsuallyAppropriate => "Usually appropriate",
            AppropriatenessCategory::MayBeAppropriate => "May be appropriate",
            AppropriatenessCategory::RarelyAppropriate => "Usually not appropriate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppropriatenessMapping {
    pub icd10_code: String,
    pub cpt_code: String,
    pub cpt_description: String,
    /// ACR scale, 1–9.
    pub score: u8,
    pub evidence: String,
    pub justification: String,
}

impl AppropriatenessMapping {
    pub fn category(&self) -> AppropriatenessCategory {
        AppropriatenessCategory::from_score(self.score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[serde(alias = "appropriate")]
    Valid,
    #[serde(alias = "inappropriate")]
    Invalid,
    #[serde(alias = "needs-clarification", alias = "needsClarification")]
    NeedsClarification,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Invalid => "invalid",
            ValidationStatus::NeedsClarification => "needs_clarification",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisCode {
    pub code: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureCode {
    pub code: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Validated coding result, on the single 1–9 compliance scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub validation_status: ValidationStatus,
    pub compliance_score: u8,
    pub feedback: String,
    pub diagnosis_codes: Vec<DiagnosisCode>,
    pub procedure_codes: Vec<ProcedureCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_reasoning: Option<String>,
}

impl ValidationResult {
    pub fn primary_diagnosis(&self) -> Option<&DiagnosisCode> {
        self.diagnosis_codes.iter().find(|d| d.is_primary)
    }
}

/// Whether the result came from the LLM or from the rule-based fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub dictation: String,
    pub specialty: Option<String>,
}

/// Everything the pipeline produced for one dictation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub result: ValidationResult,
    pub source: ResultSource,
    pub context: ClinicalContext,
    pub candidates: Option<CandidateCodes>,
    pub mappings: Vec<AppropriatenessMapping>,
}

/// LLM provider abstraction (allows mocking).
pub trait LlmClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, ValidationError>;
}
