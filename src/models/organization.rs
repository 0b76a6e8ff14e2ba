use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{OrgStatus, OrgType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub org_type: OrgType,
    pub npi: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub status: OrgStatus,
    pub created_at: NaiveDateTime,
}
