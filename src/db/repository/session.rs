use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_id};
use crate::db::DatabaseError;
use crate::models::Session;

pub fn insert_session(conn: &Connection, session: &Session) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            session.token_hash,
            session.user_id.to_string(),
            format_datetime(&session.created_at),
            format_datetime(&session.expires_at),
        ],
    )?;
    Ok(())
}

/// The session for a token hash, if it has not expired at `now`.
pub fn get_active_session(
    conn: &Connection,
    token_hash: &str,
    now: &NaiveDateTime,
) -> Result<Option<Session>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT token_hash, user_id, created_at, expires_at FROM sessions
             WHERE token_hash = ?1 AND expires_at > ?2",
            params![token_hash, format_datetime(now)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((token_hash, user_id, created_at, expires_at)) => Ok(Some(Session {
            token_hash,
            user_id: parse_id(&user_id)?,
            created_at: parse_datetime(&created_at),
            expires_at: parse_datetime(&expires_at),
        })),
        None => Ok(None),
    }
}

/// Returns whether a session was removed.
pub fn delete_session(conn: &Connection, token_hash: &str) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?;
    Ok(deleted > 0)
}

pub fn delete_user_sessions(conn: &Connection, user_id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE user_id = ?1",
        params![user_id.to_string()],
    )?;
    Ok(deleted)
}

pub fn prune_expired_sessions(conn: &Connection, now: &NaiveDateTime) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![format_datetime(now)],
    )?;
    Ok(deleted)
}
