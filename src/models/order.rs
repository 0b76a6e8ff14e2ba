use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::OrderStatus;

/// Imaging order. ICD-10 codes are stored comma-joined with the primary
/// diagnosis first; their descriptions as a JSON array in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub patient_id: Uuid,
    pub referring_organization_id: Uuid,
    pub radiology_organization_id: Option<Uuid>,
    pub created_by: Uuid,
    pub dictation: String,
    pub modality: Option<String>,
    pub body_part: Option<String>,
    pub laterality: Option<String>,
    pub icd10_codes: String,
    pub icd10_descriptions: String,
    pub cpt_code: Option<String>,
    pub cpt_description: Option<String>,
    pub compliance_score: Option<u8>,
    pub validation_status: Option<String>,
    pub validation_notes: Option<String>,
    pub status: OrderStatus,
    pub signed_by: Option<Uuid>,
    pub signed_at: Option<NaiveDateTime>,
    pub signature_name: Option<String>,
    pub patient_info_completed_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Order {
    pub fn icd10_code_list(&self) -> Vec<&str> {
        self.icd10_codes
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Descriptions aligned with [`Order::icd10_code_list`]. Empty when the
    /// stored value is not a JSON string array.
    pub fn icd10_description_list(&self) -> Vec<String> {
        serde_json::from_str(&self.icd10_descriptions).unwrap_or_default()
    }

    /// Encode descriptions for storage in `icd10_descriptions`.
    pub fn encode_descriptions<'a>(descriptions: impl IntoIterator<Item = &'a str>) -> String {
        serde_json::Value::from(descriptions.into_iter().collect::<Vec<_>>()).to_string()
    }
}

/// Which orders a listing should return.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub patient_id: Option<Uuid>,
    pub limit: Option<u32>,
}
