//! Order endpoints.
//!
//! Validation runs the blocking pipeline (code database + LLM call) on the
//! blocking pool. Orders are always coded server-side, so a client cannot
//! submit its own score.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, FieldErrors};
use crate::api::types::{ApiContext, ApiJson, AuthUser};
use crate::db::repository::{get_order, list_orders_for_organization};
use crate::models::{Order, OrderFilter, OrderStatus, PatientInfoUpdate, UserRole};
use crate::orders::{self, order_visible_to, NewOrder};
use crate::pipeline::validation::{ValidationOutcome, ValidationRequest};

const MAX_LIST_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub dictation: String,
    #[serde(default)]
    pub specialty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub patient_id: Uuid,
    pub dictation: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub radiology_organization_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order: Order,
    pub validation: ValidationOutcome,
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub signature_name: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub patient_id: Option<Uuid>,
    pub limit: Option<u32>,
}

/// Run the validation pipeline for the caller, defaulting the specialty to
/// the caller's own.
async fn run_validation(
    ctx: &ApiContext,
    auth: &AuthUser,
    dictation: String,
    specialty: Option<String>,
) -> Result<ValidationOutcome, ApiError> {
    let request = ValidationRequest {
        dictation,
        specialty: specialty
            .filter(|s| !s.trim().is_empty())
            .or_else(|| auth.user.specialty.clone()),
    };
    let validator = ctx.core.validator();
    let outcome = tokio::task::spawn_blocking(move || validator.validate(&request)).await??;
    Ok(outcome)
}

fn visible_order(ctx: &ApiContext, auth: &AuthUser, id: &Uuid) -> Result<Order, ApiError> {
    let conn = ctx.db()?;
    get_order(&conn, id)?
        .filter(|o| order_visible_to(o, &auth.user))
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))
}

/// `POST /api/orders/validate`: preview coding for a dictation.
pub async fn validate(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(req): ApiJson<ValidateRequest>,
) -> Result<Json<ValidationOutcome>, ApiError> {
    auth.require_role(&[UserRole::Physician], "validate dictations")?;
    let outcome = run_validation(&ctx, &auth, req.dictation, req.specialty).await?;
    Ok(Json(outcome))
}

/// `POST /api/orders`: validate and persist a new order.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    auth.require_role(&[UserRole::Physician], "create orders")?;
    let mut errors = FieldErrors::new();
    errors.require("dictation", &req.dictation);
    errors.finish()?;

    let outcome = run_validation(&ctx, &auth, req.dictation.clone(), req.specialty).await?;
    let new_order = NewOrder {
        patient_id: req.patient_id,
        dictation: req.dictation,
        radiology_organization_id: req.radiology_organization_id,
    };

    let conn = ctx.db()?;
    let order = orders::create_order_from_validation(&conn, &auth.user, &new_order, &outcome)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order,
            validation: outcome,
        }),
    ))
}

/// `GET /api/orders`: orders referred by or routed to the caller's organization.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let filter = OrderFilter {
        status: query.status,
        patient_id: query.patient_id,
        limit: Some(query.limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT)),
    };
    let conn = ctx.db()?;
    let orders = list_orders_for_organization(&conn, &auth.organization_id(), &filter)?;
    Ok(Json(orders))
}

/// `GET /api/orders/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(visible_order(&ctx, &auth, &id)?))
}

/// `POST /api/orders/:id/sign`
pub async fn sign(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<SignRequest>,
) -> Result<Json<Order>, ApiError> {
    let mut errors = FieldErrors::new();
    errors.require("signature_name", &req.signature_name);
    errors.finish()?;

    let conn = ctx.db()?;
    let order = orders::sign_order(&conn, &id, &auth.user, &req.signature_name)?;
    Ok(Json(order))
}

/// `POST /api/orders/:id/patient-info`
pub async fn patient_info(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ApiJson(update): ApiJson<PatientInfoUpdate>,
) -> Result<Json<Order>, ApiError> {
    let conn = ctx.db()?;
    let order = orders::complete_patient_info(&conn, &id, &update, &auth.user)?;
    Ok(Json(order))
}

/// `POST /api/orders/:id/cancel`
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    let conn = ctx.db()?;
    let order = orders::cancel_order(&conn, &id, &auth.user)?;
    Ok(Json(order))
}
