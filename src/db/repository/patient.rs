use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_id};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, organization_id, mrn, first_name, last_name, date_of_birth,
         gender, phone, email, address, city, state, zip, insurance_provider,
         insurance_policy_number, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            patient.id.to_string(),
            patient.organization_id.to_string(),
            patient.mrn,
            patient.first_name,
            patient.last_name,
            patient.date_of_birth.map(|d| d.to_string()),
            patient.gender,
            patient.phone,
            patient.email,
            patient.address,
            patient.city,
            patient.state,
            patient.zip,
            patient.insurance_provider,
            patient.insurance_policy_number,
            format_datetime(&patient.created_at),
            format_datetime(&patient.updated_at),
        ],
    )?;
    Ok(())
}

const PATIENT_COLUMNS: &str = "id, organization_id, mrn, first_name, last_name, date_of_birth, \
                               gender, phone, email, address, city, state, zip, \
                               insurance_provider, insurance_policy_number, created_at, updated_at";

struct PatientRow {
    id: String,
    organization_id: String,
    mrn: Option<String>,
    first_name: String,
    last_name: String,
    date_of_birth: Option<String>,
    gender: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip: Option<String>,
    insurance_provider: Option<String>,
    insurance_policy_number: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        mrn: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        date_of_birth: row.get(5)?,
        gender: row.get(6)?,
        phone: row.get(7)?,
        email: row.get(8)?,
        address: row.get(9)?,
        city: row.get(10)?,
        state: row.get(11)?,
        zip: row.get(12)?,
        insurance_provider: row.get(13)?,
        insurance_policy_number: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    Ok(Patient {
        id: parse_id(&row.id)?,
        organization_id: parse_id(&row.organization_id)?,
        mrn: row.mrn,
        first_name: row.first_name,
        last_name: row.last_name,
        date_of_birth: row
            .date_of_birth
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        gender: row.gender,
        phone: row.phone,
        email: row.email,
        address: row.address,
        city: row.city,
        state: row.state,
        zip: row.zip,
        insurance_provider: row.insurance_provider,
        insurance_policy_number: row.insurance_policy_number,
        created_at: parse_datetime(&row.created_at),
        updated_at: parse_datetime(&row.updated_at),
    })
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(patient_from_row).transpose()
}

/// Patients owned by an organization, optionally filtered by a name or MRN
/// substring.
pub fn list_patients_by_organization(
    conn: &Connection,
    organization_id: &Uuid,
    search: Option<&str>,
) -> Result<Vec<Patient>, DatabaseError> {
    let pattern = format!("%{}%", search.unwrap_or("").trim());
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         WHERE organization_id = ?1
           AND (first_name LIKE ?2 OR last_name LIKE ?2 OR COALESCE(mrn, '') LIKE ?2)
         ORDER BY last_name, first_name"
    ))?;
    let rows = stmt
        .query_map(params![organization_id.to_string(), pattern], read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(patient_from_row).collect()
}

/// Overwrite demographics with the provided values; `None` keeps the stored
/// value.
pub fn update_patient_info(
    conn: &Connection,
    id: &Uuid,
    update: &PatientInfoUpdate,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET
            date_of_birth = COALESCE(?2, date_of_birth),
            gender = COALESCE(?3, gender),
            phone = COALESCE(?4, phone),
            email = COALESCE(?5, email),
            address = COALESCE(?6, address),
            city = COALESCE(?7, city),
            state = COALESCE(?8, state),
            zip = COALESCE(?9, zip),
            insurance_provider = COALESCE(?10, insurance_provider),
            insurance_policy_number = COALESCE(?11, insurance_policy_number),
            updated_at = ?12
         WHERE id = ?1",
        params![
            id.to_string(),
            update.date_of_birth.map(|d| d.to_string()),
            update.gender,
            update.phone,
            update.email,
            update.address,
            update.city,
            update.state,
            update.zip,
            update.insurance_provider,
            update.insurance_policy_number,
            format_datetime(now),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
