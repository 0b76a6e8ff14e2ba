use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_id};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_relationship(
    conn: &Connection,
    rel: &OrganizationRelationship,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO organization_relationships (id, organization_id, related_organization_id,
         status, initiated_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            rel.id.to_string(),
            rel.organization_id.to_string(),
            rel.related_organization_id.to_string(),
            rel.status.as_str(),
            rel.initiated_by.to_string(),
            format_datetime(&rel.created_at),
            format_datetime(&rel.updated_at),
        ],
    )?;
    Ok(())
}

const REL_COLUMNS: &str =
    "id, organization_id, related_organization_id, status, initiated_by, created_at, updated_at";

type RelationshipRow = (String, String, String, String, String, String, String);

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<RelationshipRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn relationship_from_row(row: RelationshipRow) -> Result<OrganizationRelationship, DatabaseError> {
    let (id, org, related, status, initiated_by, created_at, updated_at) = row;
    Ok(OrganizationRelationship {
        id: parse_id(&id)?,
        organization_id: parse_id(&org)?,
        related_organization_id: parse_id(&related)?,
        status: RelationshipStatus::from_str(&status)?,
        initiated_by: parse_id(&initiated_by)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

pub fn get_relationship(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<OrganizationRelationship>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {REL_COLUMNS} FROM organization_relationships WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(relationship_from_row).transpose()
}

/// The relationship between two organizations in either direction.
pub fn find_relationship_between(
    conn: &Connection,
    a: &Uuid,
    b: &Uuid,
) -> Result<Option<OrganizationRelationship>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {REL_COLUMNS} FROM organization_relationships
                 WHERE (organization_id = ?1 AND related_organization_id = ?2)
                    OR (organization_id = ?2 AND related_organization_id = ?1)
                 LIMIT 1"
            ),
            params![a.to_string(), b.to_string()],
            read_row,
        )
        .optional()?;
    row.map(relationship_from_row).transpose()
}

pub fn has_active_relationship(conn: &Connection, a: &Uuid, b: &Uuid) -> Result<bool, DatabaseError> {
    Ok(find_relationship_between(conn, a, b)?
        .is_some_and(|r| r.status == RelationshipStatus::Active))
}

/// Every relationship the organization is part of, on either side.
pub fn list_relationships_for_organization(
    conn: &Connection,
    organization_id: &Uuid,
) -> Result<Vec<OrganizationRelationship>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REL_COLUMNS} FROM organization_relationships
         WHERE organization_id = ?1 OR related_organization_id = ?1
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt
        .query_map(params![organization_id.to_string()], read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(relationship_from_row).collect()
}

pub fn update_relationship_status(
    conn: &Connection,
    id: &Uuid,
    status: RelationshipStatus,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE organization_relationships SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), format_datetime(now)],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "OrganizationRelationship".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
