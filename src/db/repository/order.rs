use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_id};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_order(conn: &Connection, order: &Order) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO orders (id, order_number, patient_id, referring_organization_id,
         radiology_organization_id, created_by, dictation, modality, body_part, laterality,
         icd10_codes, icd10_descriptions, cpt_code, cpt_description, compliance_score,
         validation_status, validation_notes, status, signed_by, signed_at, signature_name,
         patient_info_completed_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
        params![
            order.id.to_string(),
            order.order_number,
            order.patient_id.to_string(),
            order.referring_organization_id.to_string(),
            order.radiology_organization_id.map(|id| id.to_string()),
            order.created_by.to_string(),
            order.dictation,
            order.modality,
            order.body_part,
            order.laterality,
            order.icd10_codes,
            order.icd10_descriptions,
            order.cpt_code,
            order.cpt_description,
            order.compliance_score,
            order.validation_status,
            order.validation_notes,
            order.status.as_str(),
            order.signed_by.map(|id| id.to_string()),
            order.signed_at.as_ref().map(format_datetime),
            order.signature_name,
            order.patient_info_completed_by.map(|id| id.to_string()),
            format_datetime(&order.created_at),
            format_datetime(&order.updated_at),
        ],
    )?;
    Ok(())
}

const ORDER_COLUMNS: &str = "id, order_number, patient_id, referring_organization_id, \
    radiology_organization_id, created_by, dictation, modality, body_part, laterality, \
    icd10_codes, icd10_descriptions, cpt_code, cpt_description, compliance_score, \
    validation_status, validation_notes, status, signed_by, signed_at, signature_name, \
    patient_info_completed_by, created_at, updated_at";

struct OrderRow {
    id: String,
    order_number: String,
    patient_id: String,
    referring_organization_id: String,
    radiology_organization_id: Option<String>,
    created_by: String,
    dictation: String,
    modality: Option<String>,
    body_part: Option<String>,
    laterality: Option<String>,
    icd10_codes: String,
    icd10_descriptions: String,
    cpt_code: Option<String>,
    cpt_description: Option<String>,
    compliance_score: Option<u8>,
    validation_status: Option<String>,
    validation_notes: Option<String>,
    status: String,
    signed_by: Option<String>,
    signed_at: Option<String>,
    signature_name: Option<String>,
    patient_info_completed_by: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        id: row.get(0)?,
        order_number: row.get(1)?,
        patient_id: row.get(2)?,
        referring_organization_id: row.get(3)?,
        radiology_organization_id: row.get(4)?,
        created_by: row.get(5)?,
        dictation: row.get(6)?,
        modality: row.get(7)?,
        body_part: row.get(8)?,
        laterality: row.get(9)?,
        icd10_codes: row.get(10)?,
        icd10_descriptions: row.get(11)?,
        cpt_code: row.get(12)?,
        cpt_description: row.get(13)?,
        compliance_score: row.get(14)?,
        validation_status: row.get(15)?,
        validation_notes: row.get(16)?,
        status: row.get(17)?,
        signed_by: row.get(18)?,
        signed_at: row.get(19)?,
        signature_name: row.get(20)?,
        patient_info_completed_by: row.get(21)?,
        created_at: row.get(22)?,
        updated_at: row.get(23)?,
    })
}

fn optional_id(value: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    value.as_deref().map(parse_id).transpose()
}

fn order_from_row(row: OrderRow) -> Result<Order, DatabaseError> {
    Ok(Order {
        id: parse_id(&row.id)?,
        order_number: row.order_number,
        patient_id: parse_id(&row.patient_id)?,
        referring_organization_id: parse_id(&row.referring_organization_id)?,
        radiology_organization_id: optional_id(row.radiology_organization_id)?,
        created_by: parse_id(&row.created_by)?,
        dictation: row.dictation,
        modality: row.modality,
        body_part: row.body_part,
        laterality: row.laterality,
        icd10_codes: row.icd10_codes,
        icd10_descriptions: row.icd10_descriptions,
        cpt_code: row.cpt_code,
        cpt_description: row.cpt_description,
        compliance_score: row.compliance_score,
        validation_status: row.validation_status,
        validation_notes: row.validation_notes,
        status: OrderStatus::from_str(&row.status)?,
        signed_by: optional_id(row.signed_by)?,
        signed_at: row.signed_at.as_deref().map(parse_datetime),
        signature_name: row.signature_name,
        patient_info_completed_by: optional_id(row.patient_info_completed_by)?,
        created_at: parse_datetime(&row.created_at),
        updated_at: parse_datetime(&row.updated_at),
    })
}

pub fn get_order(conn: &Connection, id: &Uuid) -> Result<Option<Order>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(order_from_row).transpose()
}

pub fn get_order_by_number(conn: &Connection, order_number: &str) -> Result<Option<Order>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = ?1"),
            params![order_number],
            read_row,
        )
        .optional()?;
    row.map(order_from_row).transpose()
}

pub fn order_number_exists(conn: &Connection, order_number: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM orders WHERE order_number = ?1",
        params![order_number],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Orders visible to an organization: the ones it referred and the ones
/// routed to it. Newest first.
pub fn list_orders_for_organization(
    conn: &Connection,
    organization_id: &Uuid,
    filter: &OrderFilter,
) -> Result<Vec<Order>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE (referring_organization_id = ?1 OR radiology_organization_id = ?1)
           AND (?2 IS NULL OR status = ?2)
           AND (?3 IS NULL OR patient_id = ?3)
         ORDER BY created_at DESC, order_number DESC
         LIMIT ?4"
    ))?;
    let rows = stmt
        .query_map(
            params![
                organization_id.to_string(),
                filter.status.map(|s| s.as_str()),
                filter.patient_id.map(|id| id.to_string()),
                filter.limit.map(i64::from).unwrap_or(-1),
            ],
            read_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(order_from_row).collect()
}

/// Fields recorded alongside a status change.
#[derive(Debug, Clone, Default)]
pub struct OrderTransition {
    pub signed_by: Option<Uuid>,
    pub signature_name: Option<String>,
    pub patient_info_completed_by: Option<Uuid>,
}

/// Move an order to `next`, rejecting transitions the lifecycle forbids.
///
/// The update is conditional on the status read, so two concurrent
/// transitions cannot both succeed.
pub fn transition_order(
    conn: &Connection,
    id: &Uuid,
    next: OrderStatus,
    changes: &OrderTransition,
    now: &NaiveDateTime,
) -> Result<Order, DatabaseError> {
    let current = get_order(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Order".into(),
        id: id.to_string(),
    })?;

    let invalid = || DatabaseError::InvalidTransition {
        entity_type: "Order".into(),
        from: current.status.as_str().into(),
        to: next.as_str().into(),
    };
    if !current.status.can_transition_to(next) {
        return Err(invalid());
    }

    let stamp = format_datetime(now);
    let changed = conn.execute(
        "UPDATE orders SET
            status = ?2,
            signed_by = COALESCE(?3, signed_by),
            signed_at = CASE WHEN ?3 IS NULL THEN signed_at ELSE ?6 END,
            signature_name = COALESCE(?4, signature_name),
            patient_info_completed_by = COALESCE(?5, patient_info_completed_by),
            updated_at = ?6
         WHERE id = ?1 AND status = ?7",
        params![
            id.to_string(),
            next.as_str(),
            changes.signed_by.map(|u| u.to_string()),
            changes.signature_name,
            changes.patient_info_completed_by.map(|u| u.to_string()),
            stamp,
            current.status.as_str(),
        ],
    )?;
    if changed == 0 {
        return Err(invalid());
    }

    get_order(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Order".into(),
        id: id.to_string(),
    })
}

/// Route an order to a radiology organization.
pub fn assign_radiology_organization(
    conn: &Connection,
    id: &Uuid,
    radiology_organization_id: &Uuid,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE orders SET radiology_organization_id = ?2, updated_at = ?3 WHERE id = ?1",
        params![
            id.to_string(),
            radiology_organization_id.to_string(),
            format_datetime(now)
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Order".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
