//! Order workflow: turns a validated dictation into a persisted imaging
//! order and walks it through signature and patient-info completion.
//!
//! Role and organization checks live here so every caller (HTTP handlers,
//! tests, future batch jobs) gets the same rules.

use rand::Rng;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::{
    get_order, get_organization, get_patient, has_active_relationship, insert_order,
    order_number_exists, transition_order, update_patient_info, utc_now, OrderTransition,
};
use crate::db::DatabaseError;
use crate::models::{Order, OrderStatus, OrgType, PatientInfoUpdate, User};
use crate::pipeline::validation::{Laterality, ValidationOutcome};

const ORDER_SUFFIX_LEN: usize = 6;
const ORDER_SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ORDER_NUMBER_ATTEMPTS: usize = 8;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Role {role} may not {action}")]
    Forbidden { role: String, action: &'static str },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Organizations are not connected")]
    NotConnected,

    #[error("Invalid order: {0}")]
    Invalid(String),

    #[error("Could not allocate a unique order number")]
    NumberExhausted,
}

impl From<rusqlite::Error> for OrderError {
    fn from(err: rusqlite::Error) -> Self {
        OrderError::Database(DatabaseError::Sqlite(err))
    }
}

/// What the ordering physician submits alongside a validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub patient_id: Uuid,
    pub dictation: String,
    #[serde(default)]
    pub radiology_organization_id: Option<Uuid>,
}

/// `ORD-YYYYMMDD-XXXXXX` with an unambiguous uppercase suffix.
pub fn generate_order_number(date: chrono::NaiveDate) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ORDER_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ORDER_SUFFIX_ALPHABET.len());
            ORDER_SUFFIX_ALPHABET[idx] as char
        })
        .collect();
    format!("ORD-{}-{suffix}", date.format("%Y%m%d"))
}

fn allocate_order_number(conn: &Connection, date: chrono::NaiveDate) -> Result<String, OrderError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = generate_order_number(date);
        if !order_number_exists(conn, &candidate)? {
            return Ok(candidate);
        }
    }
    Err(OrderError::NumberExhausted)
}

fn forbidden(user: &User, action: &'static str) -> OrderError {
    OrderError::Forbidden {
        role: user.role.as_str().to_string(),
        action,
    }
}

fn load_order(conn: &Connection, order_id: &Uuid) -> Result<Order, OrderError> {
    get_order(conn, order_id)?.ok_or_else(|| OrderError::NotFound {
        entity: "Order",
        id: order_id.to_string(),
    })
}

/// Whether the user's organization may see this order at all.
pub fn order_visible_to(order: &Order, user: &User) -> bool {
    order.referring_organization_id == user.organization_id
        || order.radiology_organization_id == Some(user.organization_id)
}

/// Persist the validation result as a new order awaiting signature.
pub fn create_order_from_validation(
    conn: &Connection,
    creator: &User,
    new_order: &NewOrder,
    outcome: &ValidationOutcome,
) -> Result<Order, OrderError> {
    if !creator.role.can_order() {
        return Err(forbidden(creator, "create orders"));
    }
    if new_order.dictation.trim().is_empty() {
        return Err(OrderError::Invalid("dictation is empty".into()));
    }

    let patient = get_patient(conn, &new_order.patient_id)?
        .filter(|p| p.organization_id == creator.organization_id)
        .ok_or_else(|| OrderError::NotFound {
            entity: "Patient",
            id: new_order.patient_id.to_string(),
        })?;

    if let Some(radiology_id) = new_order.radiology_organization_id {
        let radiology = get_organization(conn, &radiology_id)?
            .filter(|o| o.org_type == OrgType::Radiology)
            .ok_or_else(|| OrderError::NotFound {
                entity: "Radiology organization",
                id: radiology_id.to_string(),
            })?;
        if !has_active_relationship(conn, &creator.organization_id, &radiology.id)? {
            return Err(OrderError::NotConnected);
        }
    }

    let result = &outcome.result;
    let now = utc_now();
    let procedure = result.procedure_codes.first();
    // Primary diagnosis leads; the rest keep their returned order.
    let mut diagnoses: Vec<_> = result.diagnosis_codes.iter().collect();
    diagnoses.sort_by_key(|d| !d.is_primary);
    let order = Order {
        id: Uuid::new_v4(),
        order_number: allocate_order_number(conn, now.date())?,
        patient_id: patient.id,
        referring_organization_id: creator.organization_id,
        radiology_organization_id: new_order.radiology_organization_id,
        created_by: creator.id,
        dictation: new_order.dictation.trim().to_string(),
        modality: outcome.context.modalities.first().cloned(),
        body_part: outcome.context.anatomy.first().cloned(),
        laterality: match outcome.context.laterality {
            Laterality::Unspecified => None,
            side => Some(side.as_str().to_string()),
        },
        icd10_codes: diagnoses
            .iter()
            .map(|d| d.code.as_str())
            .collect::<Vec<_>>()
            .join(","),
        icd10_descriptions: Order::encode_descriptions(diagnoses.iter().map(|d| d.description.as_str())),
        cpt_code: procedure.map(|p| p.code.clone()),
        cpt_description: procedure.map(|p| p.description.clone()),
        compliance_score: Some(result.compliance_score.clamp(1, 9)),
        validation_status: Some(result.validation_status.as_str().to_string()),
        validation_notes: Some(result.feedback.clone()),
        status: OrderStatus::PendingSignature,
        signed_by: None,
        signed_at: None,
        signature_name: None,
        patient_info_completed_by: None,
        created_at: now,
        updated_at: now,
    };
    insert_order(conn, &order)?;

    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        score = result.compliance_score,
        "Order created"
    );
    Ok(order)
}

/// The ordering organization's physician signs the order.
pub fn sign_order(
    conn: &Connection,
    order_id: &Uuid,
    signer: &User,
    signature_name: &str,
) -> Result<Order, OrderError> {
    if !signer.role.can_order() {
        return Err(forbidden(signer, "sign orders"));
    }
    let signature_name = signature_name.trim();
    if signature_name.is_empty() {
        return Err(OrderError::Invalid("signature name is required".into()));
    }

    let order = load_order(conn, order_id)?;
    if order.referring_organization_id != signer.organization_id {
        return Err(OrderError::NotFound {
            entity: "Order",
            id: order_id.to_string(),
        });
    }

    let signed = transition_order(
        conn,
        order_id,
        OrderStatus::PendingPatientInfo,
        &OrderTransition {
            signed_by: Some(signer.id),
            signature_name: Some(signature_name.to_string()),
            ..Default::default()
        },
        &utc_now(),
    )?;
    tracing::info!(order_id = %order_id, "Order signed");
    Ok(signed)
}

/// Record patient demographics and close the order, atomically.
pub fn complete_patient_info(
    conn: &Connection,
    order_id: &Uuid,
    update: &PatientInfoUpdate,
    user: &User,
) -> Result<Order, OrderError> {
    if !user.role.can_complete_patient_info() {
        return Err(forbidden(user, "complete patient information"));
    }

    let order = load_order(conn, order_id)?;
    if !order_visible_to(&order, user) {
        return Err(OrderError::NotFound {
            entity: "Order",
            id: order_id.to_string(),
        });
    }
    if order.status != OrderStatus::PendingPatientInfo {
        return Err(DatabaseError::InvalidTransition {
            entity_type: "Order".into(),
            from: order.status.as_str().into(),
            to: OrderStatus::Complete.as_str().into(),
        }
        .into());
    }

    let now = utc_now();
    let tx = conn.unchecked_transaction()?;
    update_patient_info(&tx, &order.patient_id, update, &now)?;
    let completed = transition_order(
        &tx,
        order_id,
        OrderStatus::Complete,
        &OrderTransition {
            patient_info_completed_by: Some(user.id),
            ..Default::default()
        },
        &now,
    )?;
    tx.commit()?;

    tracing::info!(order_id = %order_id, "Order patient information completed");
    Ok(completed)
}

/// Cancel an order that has not completed. Only the referring organization's
/// physicians and admins may cancel.
pub fn cancel_order(conn: &Connection, order_id: &Uuid, user: &User) -> Result<Order, OrderError> {
    if !matches!(
        user.role,
        crate::models::UserRole::Physician | crate::models::UserRole::Admin
    ) {
        return Err(forbidden(user, "cancel orders"));
    }
    let order = load_order(conn, order_id)?;
    if order.referring_organization_id != user.organization_id {
        return Err(OrderError::NotFound {
            entity: "Order",
            id: order_id.to_string(),
        });
    }

    let cancelled = transition_order(
        conn,
        order_id,
        OrderStatus::Cancelled,
        &OrderTransition::default(),
        &utc_now(),
    )?;
    tracing::info!(order_id = %order_id, "Order cancelled");
    Ok(cancelled)
}
