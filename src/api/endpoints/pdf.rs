//! `GET /api/pdf/orders/:id`: printable order document.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Extension;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db::repository::{get_order, get_organization, get_patient};
use crate::orders::order_visible_to;
use crate::report::render_order_pdf;

pub async fn order_pdf(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (order, patient, referring) = {
        let conn = ctx.db()?;
        let order = get_order(&conn, &id)?
            .filter(|o| order_visible_to(o, &auth.user))
            .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;
        let patient = get_patient(&conn, &order.patient_id)?
            .ok_or_else(|| ApiError::NotFound("Patient not found".into()))?;
        let referring = get_organization(&conn, &order.referring_organization_id)?
            .ok_or_else(|| ApiError::NotFound("Organization not found".into()))?;
        (order, patient, referring)
    };

    let filename = format!("{}.pdf", order.order_number);
    let bytes = tokio::task::spawn_blocking(move || render_order_pdf(&order, &patient, &referring))
        .await??;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}
