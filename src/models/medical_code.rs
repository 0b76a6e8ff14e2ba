use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icd10Code {
    pub code: String,
    pub description: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CptCode {
    pub code: String,
    pub description: String,
    pub modality: Option<String>,
    pub body_part: Option<String>,
}
