//! Organization endpoints: the caller's organization, the directory of
//! counterparts, and referring↔radiology relationships.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, AuthUser};
use crate::db::repository::{
    find_relationship_between, get_organization, get_relationship, insert_relationship,
    list_organizations_by_type, list_relationships_for_organization, update_relationship_status,
    utc_now,
};
use crate::models::{
    OrgStatus, OrgType, Organization, OrganizationRelationship, RelationshipStatus, UserRole,
};

#[derive(Debug, Deserialize)]
pub struct DirectoryQuery {
    pub org_type: Option<OrgType>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub related_organization_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub accept: bool,
}

/// A relationship as seen from the caller's side.
#[derive(Debug, Serialize)]
pub struct RelationshipView {
    #[serde(flatten)]
    pub relationship: OrganizationRelationship,
    pub counterpart: Organization,
    /// Whether the caller's organization sent the request.
    pub outgoing: bool,
}

fn counterpart_type(org_type: OrgType) -> OrgType {
    match org_type {
        OrgType::Referring => OrgType::Radiology,
        OrgType::Radiology => OrgType::Referring,
    }
}

fn own_organization(conn: &rusqlite::Connection, auth: &AuthUser) -> Result<Organization, ApiError> {
    get_organization(conn, &auth.organization_id())?
        .ok_or_else(|| ApiError::NotFound("Organization not found".into()))
}

/// `GET /api/organizations/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Organization>, ApiError> {
    let conn = ctx.db()?;
    Ok(Json(own_organization(&conn, &auth)?))
}

/// `GET /api/organizations/directory?org_type=`: active organizations the
/// caller could connect with. Defaults to the opposite type.
pub async fn directory(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<DirectoryQuery>,
) -> Result<Json<Vec<Organization>>, ApiError> {
    let conn = ctx.db()?;
    let own = own_organization(&conn, &auth)?;
    let wanted = query.org_type.unwrap_or_else(|| counterpart_type(own.org_type));
    let orgs = list_organizations_by_type(&conn, wanted)?
        .into_iter()
        .filter(|o| o.id != own.id)
        .collect();
    Ok(Json(orgs))
}

/// `GET /api/organizations/relationships`
pub async fn relationships(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<RelationshipView>>, ApiError> {
    let conn = ctx.db()?;
    let own_id = auth.organization_id();
    let mut views = Vec::new();
    for relationship in list_relationships_for_organization(&conn, &own_id)? {
        let other_id = relationship.counterpart(&own_id);
        let Some(counterpart) = get_organization(&conn, &other_id)? else {
            tracing::warn!(relationship_id = %relationship.id, "Relationship counterpart missing");
            continue;
        };
        views.push(RelationshipView {
            outgoing: relationship.organization_id == own_id,
            relationship,
            counterpart,
        });
    }
    Ok(Json(views))
}

/// `POST /api/organizations/relationships`: request a connection with an
/// organization of the opposite type.
pub async fn connect(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(req): ApiJson<ConnectRequest>,
) -> Result<(StatusCode, Json<OrganizationRelationship>), ApiError> {
    auth.require_role(&[UserRole::Admin], "manage organization relationships")?;
    let conn = ctx.db()?;
    let own = own_organization(&conn, &auth)?;
    let other = get_organization(&conn, &req.related_organization_id)?
        .filter(|o| o.status == OrgStatus::Active && o.id != own.id)
        .ok_or_else(|| ApiError::NotFound("Organization not found".into()))?;

    if other.org_type != counterpart_type(own.org_type) {
        return Err(ApiError::BadRequest(
            "Relationships connect a referring organization with a radiology organization".into(),
        ));
    }
    if let Some(existing) = find_relationship_between(&conn, &own.id, &other.id)? {
        return Err(ApiError::Conflict(format!(
            "Relationship already exists with status {}",
            existing.status
        )));
    }

    let now = utc_now();
    let relationship = OrganizationRelationship {
        id: Uuid::new_v4(),
        organization_id: own.id,
        related_organization_id: other.id,
        status: RelationshipStatus::Pending,
        initiated_by: auth.id(),
        created_at: now,
        updated_at: now,
    };
    insert_relationship(&conn, &relationship)?;
    tracing::info!(relationship_id = %relationship.id, "Relationship requested");
    Ok((StatusCode::CREATED, Json(relationship)))
}

/// `POST /api/organizations/relationships/:id/respond`: only the receiving
/// organization's admin may accept or reject a pending request.
pub async fn respond(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<RespondRequest>,
) -> Result<Json<OrganizationRelationship>, ApiError> {
    auth.require_role(&[UserRole::Admin], "manage organization relationships")?;
    let conn = ctx.db()?;
    let relationship = get_relationship(&conn, &id)?
        .filter(|r| r.related_organization_id == auth.organization_id())
        .ok_or_else(|| ApiError::NotFound("Relationship not found".into()))?;
    if relationship.status != RelationshipStatus::Pending {
        return Err(ApiError::Conflict(format!(
            "Relationship already {}",
            relationship.status
        )));
    }

    let status = if req.accept {
        RelationshipStatus::Active
    } else {
        RelationshipStatus::Rejected
    };
    let now = utc_now();
    update_relationship_status(&conn, &id, status, &now)?;
    tracing::info!(relationship_id = %id, status = %status, "Relationship answered");
    Ok(Json(OrganizationRelationship {
        status,
        updated_at: now,
        ..relationship
    }))
}
