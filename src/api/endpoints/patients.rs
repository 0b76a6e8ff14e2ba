//! Patient endpoints. Patients belong to the organization that created them.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::{ApiError, FieldErrors};
use crate::api::types::{ApiContext, ApiJson, AuthUser};
use crate::db::repository::{get_patient, insert_patient, list_patients_by_organization, utc_now};
use crate::models::{Patient, UserRole};

#[derive(Debug, Deserialize)]
pub struct PatientSearch {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub mrn: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub insurance_provider: Option<String>,
    #[serde(default)]
    pub insurance_policy_number: Option<String>,
}

/// `GET /api/patients?search=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<PatientSearch>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    let conn = ctx.db()?;
    let patients = list_patients_by_organization(
        &conn,
        &auth.organization_id(),
        query.search.as_deref().filter(|s| !s.trim().is_empty()),
    )?;
    Ok(Json(patients))
}

/// `POST /api/patients`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(req): ApiJson<NewPatient>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    auth.require_role(
        &[UserRole::Physician, UserRole::Admin, UserRole::AdminStaff],
        "register patients",
    )?;
    let mut errors = FieldErrors::new();
    errors.require("first_name", &req.first_name);
    errors.require("last_name", &req.last_name);
    if let Some(dob) = req.date_of_birth {
        if dob > utc_now().date() {
            errors.add("date_of_birth", "cannot be in the future");
        }
    }
    errors.finish()?;

    let now = utc_now();
    let patient = Patient {
        id: Uuid::new_v4(),
        organization_id: auth.organization_id(),
        mrn: req.mrn,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        date_of_birth: req.date_of_birth,
        gender: req.gender,
        phone: req.phone,
        email: req.email,
        address: req.address,
        city: req.city,
        state: req.state,
        zip: req.zip,
        insurance_provider: req.insurance_provider,
        insurance_policy_number: req.insurance_policy_number,
        created_at: now,
        updated_at: now,
    };
    let conn = ctx.db()?;
    insert_patient(&conn, &patient)?;
    tracing::info!(patient_id = %patient.id, "Patient registered");
    Ok((StatusCode::CREATED, Json(patient)))
}

/// `GET /api/patients/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Patient>, ApiError> {
    let conn = ctx.db()?;
    let patient = get_patient(&conn, &id)?
        .filter(|p| p.organization_id == auth.organization_id())
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))?;
    Ok(Json(patient))
}
