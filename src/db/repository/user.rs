use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_id};
use crate::db::DatabaseError;
use crate::models::*;

/// Insert a user with its password hash. Duplicate e-mail (case-insensitive)
/// is a constraint violation.
pub fn insert_user(conn: &Connection, user: &User, password_hash: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, organization_id, email, first_name, last_name, role, npi,
         specialty, password_hash, is_active, created_at, last_login_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            user.id.to_string(),
            user.organization_id.to_string(),
            user.email,
            user.first_name,
            user.last_name,
            user.role.as_str(),
            user.npi,
            user.specialty,
            password_hash,
            user.is_active as i32,
            format_datetime(&user.created_at),
            user.last_login_at.as_ref().map(format_datetime),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DatabaseError::ConstraintViolation(format!("user e-mail already registered: {}", user.email))
        }
        other => other.into(),
    })?;
    Ok(())
}

const USER_COLUMNS: &str = "id, organization_id, email, first_name, last_name, role, npi, \
                            specialty, is_active, created_at, last_login_at";

struct UserRow {
    id: String,
    organization_id: String,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
    npi: Option<String>,
    specialty: Option<String>,
    is_active: i32,
    created_at: String,
    last_login_at: Option<String>,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        role: row.get(5)?,
        npi: row.get(6)?,
        specialty: row.get(7)?,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
        last_login_at: row.get(10)?,
    })
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: parse_id(&row.id)?,
        organization_id: parse_id(&row.organization_id)?,
        email: row.email,
        first_name: row.first_name,
        last_name: row.last_name,
        role: UserRole::from_str(&row.role)?,
        npi: row.npi,
        specialty: row.specialty,
        is_active: row.is_active != 0,
        created_at: parse_datetime(&row.created_at),
        last_login_at: row.last_login_at.as_deref().map(parse_datetime),
    })
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    Ok(get_user_credentials(conn, email)?.map(|(user, _)| user))
}

/// User plus stored password hash, looked up by e-mail (case-insensitive).
pub fn get_user_credentials(
    conn: &Connection,
    email: &str,
) -> Result<Option<(User, String)>, DatabaseError> {
    let found = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
            params![email.trim()],
            |row| Ok((read_row(row)?, row.get::<_, String>(11)?)),
        )
        .optional()?;
    match found {
        Some((row, hash)) => Ok(Some((user_from_row(row)?, hash))),
        None => Ok(None),
    }
}

pub fn list_users_by_organization(
    conn: &Connection,
    organization_id: &Uuid,
) -> Result<Vec<User>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE organization_id = ?1
         ORDER BY last_name, first_name"
    ))?;
    let rows = stmt
        .query_map(params![organization_id.to_string()], read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(user_from_row).collect()
}

pub fn update_last_login(conn: &Connection, id: &Uuid, at: &NaiveDateTime) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET last_login_at = ?2 WHERE id = ?1",
        params![id.to_string(), format_datetime(at)],
    )?;
    Ok(())
}

pub fn set_user_active(conn: &Connection, id: &Uuid, active: bool) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET is_active = ?2 WHERE id = ?1",
        params![id.to_string(), active as i32],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "User".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
