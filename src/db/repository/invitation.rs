use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_id};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_invitation(conn: &Connection, inv: &Invitation) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO invitations (id, organization_id, email, role, token_hash, invited_by,
         created_at, expires_at, accepted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            inv.id.to_string(),
            inv.organization_id.to_string(),
            inv.email,
            inv.role.as_str(),
            inv.token_hash,
            inv.invited_by.to_string(),
            format_datetime(&inv.created_at),
            format_datetime(&inv.expires_at),
            inv.accepted_at.as_ref().map(format_datetime),
        ],
    )?;
    Ok(())
}

const INVITATION_COLUMNS: &str =
    "id, organization_id, email, role, token_hash, invited_by, created_at, expires_at, accepted_at";

struct InvitationRow {
    id: String,
    organization_id: String,
    email: String,
    role: String,
    token_hash: String,
    invited_by: String,
    created_at: String,
    expires_at: String,
    accepted_at: Option<String>,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<InvitationRow> {
    Ok(InvitationRow {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        token_hash: row.get(4)?,
        invited_by: row.get(5)?,
        created_at: row.get(6)?,
        expires_at: row.get(7)?,
        accepted_at: row.get(8)?,
    })
}

fn invitation_from_row(row: InvitationRow) -> Result<Invitation, DatabaseError> {
    Ok(Invitation {
        id: parse_id(&row.id)?,
        organization_id: parse_id(&row.organization_id)?,
        email: row.email,
        role: UserRole::from_str(&row.role)?,
        token_hash: row.token_hash,
        invited_by: parse_id(&row.invited_by)?,
        created_at: parse_datetime(&row.created_at),
        expires_at: parse_datetime(&row.expires_at),
        accepted_at: row.accepted_at.as_deref().map(parse_datetime),
    })
}

pub fn get_invitation_by_token_hash(
    conn: &Connection,
    token_hash: &str,
) -> Result<Option<Invitation>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE token_hash = ?1"),
            params![token_hash],
            read_row,
        )
        .optional()?;
    row.map(invitation_from_row).transpose()
}

pub fn list_invitations_by_organization(
    conn: &Connection,
    organization_id: &Uuid,
) -> Result<Vec<Invitation>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVITATION_COLUMNS} FROM invitations WHERE organization_id = ?1
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt
        .query_map(params![organization_id.to_string()], read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(invitation_from_row).collect()
}

/// Mark accepted. Fails if the invitation was already used.
pub fn mark_invitation_accepted(
    conn: &Connection,
    id: &Uuid,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE invitations SET accepted_at = ?2 WHERE id = ?1 AND accepted_at IS NULL",
        params![id.to_string(), format_datetime(now)],
    )?;
    if changed == 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "invitation {id} is unknown or already accepted"
        )));
    }
    Ok(())
}
