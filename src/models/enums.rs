use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(OrgType {
    Referring => "referring",
    Radiology => "radiology",
});

str_enum!(OrgStatus {
    Active => "active",
    Suspended => "suspended",
});

str_enum!(UserRole {
    Admin => "admin",
    Physician => "physician",
    AdminStaff => "admin_staff",
    Radiologist => "radiologist",
});

str_enum!(OrderStatus {
    PendingSignature => "pending_signature",
    PendingPatientInfo => "pending_patient_info",
    Complete => "complete",
    Cancelled => "cancelled",
});

str_enum!(RelationshipStatus {
    Pending => "pending",
    Active => "active",
    Rejected => "rejected",
});

impl UserRole {
    /// Physicians dictate, validate and sign orders.
    pub fn can_order(&self) -> bool {
        matches!(self, UserRole::Physician)
    }

    /// Front-desk roles complete patient demographics.
    pub fn can_complete_patient_info(&self) -> bool {
        matches!(self, UserRole::AdminStaff | UserRole::Admin)
    }
}

impl OrderStatus {
    /// pending_signature → pending_patient_info → complete; anything not
    /// complete may be cancelled.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingSignature, PendingPatientInfo)
                | (PendingPatientInfo, Complete)
                | (PendingSignature, Cancelled)
                | (PendingPatientInfo, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Cancelled)
    }
}
