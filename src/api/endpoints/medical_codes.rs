//! Read-only lookups against the medical code database.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db::code_db::{get_icd10, search_cpt, search_icd10};
use crate::models::{CptCode, Icd10Code};

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct CodeSearch {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

impl CodeSearch {
    fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

fn code_db(ctx: &ApiContext) -> Result<rusqlite::Connection, ApiError> {
    ctx.core.open_code_db().map_err(ApiError::from)
}

/// `GET /api/medical-codes/icd10?q=`
pub async fn icd10_search(
    State(ctx): State<ApiContext>,
    Extension(_auth): Extension<AuthUser>,
    Query(query): Query<CodeSearch>,
) -> Result<Json<Vec<Icd10Code>>, ApiError> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let conn = code_db(&ctx)?;
    Ok(Json(search_icd10(&conn, q, query.limit())?))
}

/// `GET /api/medical-codes/cpt?q=`
pub async fn cpt_search(
    State(ctx): State<ApiContext>,
    Extension(_auth): Extension<AuthUser>,
    Query(query): Query<CodeSearch>,
) -> Result<Json<Vec<CptCode>>, ApiError> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let conn = code_db(&ctx)?;
    Ok(Json(search_cpt(&conn, q, query.limit())?))
}

/// `GET /api/medical-codes/icd10/:code`
pub async fn icd10_detail(
    State(ctx): State<ApiContext>,
    Extension(_auth): Extension<AuthUser>,
    Path(code): Path<String>,
) -> Result<Json<Icd10Code>, ApiError> {
    let conn = code_db(&ctx)?;
    get_icd10(&conn, code.trim())?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("ICD-10 code {code} not found")))
}
