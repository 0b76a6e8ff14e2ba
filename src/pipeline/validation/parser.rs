//! LLM response → `ValidationResult`.
//!
//! The provider's reply is untrusted text. Everything that turns it into a
//! result goes through `validate_llm_response`, which rejects replies without
//! the required fields and repairs the rest into the documented shape.

use serde::Deserialize;
use serde_json::Value;

use super::types::{DiagnosisCode, ProcedureCode, ValidationResult, ValidationStatus};
use super::ValidationError;

const REQUIRED_FIELDS: &[&str] = &["validationStatus", "diagnosisCodes", "procedureCodes"];

/// Locate the JSON object in a model reply.
///
/// Tries a ```json fence, then any ``` fence whose body is an object, then
/// the span from the first `{` to the last `}`.
pub fn extract_json_block(response: &str) -> Option<&str> {
    if let Some(start) = response.find("```json") {
        let body_start = start + "```json".len();
        if let Some(len) = response[body_start..].find("```") {
            return Some(response[body_start..body_start + len].trim());
        }
    }

    if let Some(start) = response.find("```") {
        let body_start = start + 3;
        if let Some(len) = response[body_start..].find("```") {
            let body = response[body_start..body_start + len].trim();
            if body.starts_with('{') {
                return Some(body);
            }
        }
    }

    let open = response.find('{')?;
    let close = response.rfind('}')?;
    (close > open).then(|| &response[open..=close])
}

/// Extract, decode and validate a model reply.
pub fn parse_validation_response(response: &str) -> Result<ValidationResult, ValidationError> {
    let block = extract_json_block(response)
        .ok_or_else(|| ValidationError::JsonParsing("No JSON object in response".into()))?;
    let raw: Value =
        serde_json::from_str(block).map_err(|e| ValidationError::JsonParsing(e.to_string()))?;
    validate_llm_response(raw)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiagnosis {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default, alias = "primary")]
    is_primary: Option<bool>,
}

#[derive(Deserialize)]
struct RawProcedure {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// The one schema check for LLM output.
pub fn validate_llm_response(raw: Value) -> Result<ValidationResult, ValidationError> {
    let Value::Object(obj) = raw else {
        return Err(ValidationError::SchemaViolation(
            "response is not a JSON object".into(),
        ));
    };

    for field in REQUIRED_FIELDS {
        if !obj.contains_key(*field) {
            return Err(ValidationError::SchemaViolation(format!(
                "missing required field '{field}'"
            )));
        }
    }

    let validation_status: ValidationStatus =
        serde_json::from_value(obj["validationStatus"].clone()).map_err(|_| {
            ValidationError::SchemaViolation(format!(
                "unknown validationStatus {}",
                obj["validationStatus"]
            ))
        })?;

    let compliance_score = match obj.get("complianceScore") {
        None | Some(Value::Null) => default_score(validation_status),
        Some(v) => {
            let n = score_value(v).ok_or_else(|| {
                ValidationError::SchemaViolation(format!("complianceScore is not a number: {v}"))
            })?;
            normalize_compliance_score(n)
        }
    };

    let feedback = obj
        .get("feedback")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let diagnosis_codes = repair_primary(
        array_field(&obj, "diagnosisCodes")?
            .iter()
            .filter_map(|v| serde_json::from_value::<RawDiagnosis>(v.clone()).ok())
            .filter_map(|d| {
                let code = normalize_code(d.code?)?;
                Some(DiagnosisCode {
                    code,
                    description: d.description.unwrap_or_default(),
                    confidence: d.confidence.map(|c| c.clamp(0.0, 1.0)),
                    is_primary: d.is_primary.unwrap_or(false),
                })
            })
            .collect(),
    );

    let procedure_codes = array_field(&obj, "procedureCodes")?
        .iter()
        .filter_map(|v| serde_json::from_value::<RawProcedure>(v.clone()).ok())
        .filter_map(|p| {
            let code = normalize_code(p.code?)?;
            Some(ProcedureCode {
                code,
                description: p.description.unwrap_or_default(),
                confidence: p.confidence.map(|c| c.clamp(0.0, 1.0)),
            })
        })
        .collect();

    let internal_reasoning = obj
        .get("internalReasoning")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ValidationResult {
        validation_status,
        compliance_score,
        feedback,
        diagnosis_codes,
        procedure_codes,
        internal_reasoning,
    })
}

fn array_field<'a>(
    obj: &'a serde_json::Map<String, Value>,
    field: &str,
) -> Result<&'a Vec<Value>, ValidationError> {
    obj[field]
        .as_array()
        .ok_or_else(|| ValidationError::SchemaViolation(format!("'{field}' is not an array")))
}

/// Finite numeric score, from a JSON number or a numeric string. "NaN" and
/// "inf" parse as `f64` but are not scores.
fn score_value(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Bring a score onto the ACR 1–9 scale. Values above 9 are read as
/// percentages.
pub fn normalize_compliance_score(value: f64) -> u8 {
    let scaled = if value > 9.0 { value / 100.0 * 9.0 } else { value };
    scaled.round().clamp(1.0, 9.0) as u8
}

fn default_score(status: ValidationStatus) -> u8 {
    match status {
        ValidationStatus::Valid => 7,
        ValidationStatus::NeedsClarification => 4,
        ValidationStatus::Invalid => 2,
    }
}

fn normalize_code(code: String) -> Option<String> {
    let code = code.trim().to_uppercase();
    (!code.is_empty()).then_some(code)
}

/// Exactly one primary when any diagnosis exists: the first flagged one, or
/// the first code when none is flagged.
pub fn repair_primary(mut codes: Vec<DiagnosisCode>) -> Vec<DiagnosisCode> {
    let primary = codes.iter().position(|d| d.is_primary).unwrap_or(0);
    for (i, d) in codes.iter_mut().enumerate() {
        d.is_primary = i == primary;
    }
    codes
}
