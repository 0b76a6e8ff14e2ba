//! Reference code database: ICD-10, CPT, appropriateness mappings and
//! per-code coding notes.
//!
//! Separate SQLite file from the workflow database with its own migration
//! chain. The validation pipeline opens one connection per run and only
//! reads from it; the seed scripts populate it on first open.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use super::sqlite::{apply_migrations, configure_pragmas};
use super::DatabaseError;
use crate::models::{CptCode, Icd10Code};

/// Open (or create) the reference code database and run migrations.
pub fn open_code_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_code_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory code database with the seed data (for testing).
pub fn open_memory_code_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_code_migrations(&conn)?;
    Ok(conn)
}

fn run_code_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/codes/001_schema.sql")),
        (2, include_str!("../../resources/codes/002_reference_data.sql")),
    ];

    apply_migrations(conn, "code", &migrations)
}

/// Substring search over ICD-10 code and description.
pub fn search_icd10(conn: &Connection, query: &str, limit: u32) -> Result<Vec<Icd10Code>, DatabaseError> {
    let pattern = format!("%{}%", query.trim());
    let mut stmt = conn.prepare(
        "SELECT code, description, category FROM icd10_codes
         WHERE code LIKE ?1 OR description LIKE ?1
         ORDER BY code LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![pattern, limit], |row| {
            Ok(Icd10Code {
                code: row.get(0)?,
                description: row.get(1)?,
                category: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Substring search over CPT code, description and modality.
pub fn search_cpt(conn: &Connection, query: &str, limit: u32) -> Result<Vec<CptCode>, DatabaseError> {
    let pattern = format!("%{}%", query.trim());
    let mut stmt = conn.prepare(
        "SELECT code, description, modality, body_part FROM cpt_codes
         WHERE code LIKE ?1 OR description LIKE ?1 OR modality LIKE ?1
         ORDER BY code LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![pattern, limit], |row| {
            Ok(CptCode {
                code: row.get(0)?,
                description: row.get(1)?,
                modality: row.get(2)?,
                body_part: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_icd10(conn: &Connection, code: &str) -> Result<Option<Icd10Code>, DatabaseError> {
    let found = conn
        .query_row(
            "SELECT code, description, category FROM icd10_codes WHERE code = ?1",
            params![code.trim().to_uppercase()],
            |row| {
                Ok(Icd10Code {
                    code: row.get(0)?,
                    description: row.get(1)?,
                    category: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}

/// Coding notes for the given ICD-10 codes, in the order requested.
/// Each document is cut to `max_chars` characters.
pub fn fetch_reference_docs(
    conn: &Connection,
    codes: &[&str],
    max_chars: usize,
) -> Result<Vec<(String, String)>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT content FROM icd10_markdown_docs WHERE icd10_code = ?1")?;
    let mut docs = Vec::new();
    for code in codes {
        let content: Option<String> = stmt
            .query_row(params![code], |row| row.get(0))
            .optional()?;
        if let Some(content) = content {
            let cut: String = content.chars().take(max_chars).collect();
            docs.push((code.to_string(), cut));
        }
    }
    Ok(docs)
}
