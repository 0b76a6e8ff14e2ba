use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::RelationshipStatus;

/// Link between a referring and a radiology organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRelationship {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub related_organization_id: Uuid,
    pub status: RelationshipStatus,
    pub initiated_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl OrganizationRelationship {
    pub fn involves(&self, org_id: &Uuid) -> bool {
        self.organization_id == *org_id || self.related_organization_id == *org_id
    }

    /// The organization on the other side from `org_id`.
    pub fn counterpart(&self, org_id: &Uuid) -> Uuid {
        if self.organization_id == *org_id {
            self.related_organization_id
        } else {
            self.organization_id
        }
    }
}
