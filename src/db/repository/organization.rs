use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_id};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_organization(conn: &Connection, org: &Organization) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO organizations (id, name, org_type, npi, address, phone, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            org.id.to_string(),
            org.name,
            org.org_type.as_str(),
            org.npi,
            org.address,
            org.phone,
            org.status.as_str(),
            format_datetime(&org.created_at),
        ],
    )?;
    Ok(())
}

const ORG_COLUMNS: &str = "id, name, org_type, npi, address, phone, status, created_at";

struct OrganizationRow {
    id: String,
    name: String,
    org_type: String,
    npi: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    status: String,
    created_at: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<OrganizationRow> {
    Ok(OrganizationRow {
        id: row.get(0)?,
        name: row.get(1)?,
        org_type: row.get(2)?,
        npi: row.get(3)?,
        address: row.get(4)?,
        phone: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn organization_from_row(row: OrganizationRow) -> Result<Organization, DatabaseError> {
    Ok(Organization {
        id: parse_id(&row.id)?,
        name: row.name,
        org_type: OrgType::from_str(&row.org_type)?,
        npi: row.npi,
        address: row.address,
        phone: row.phone,
        status: OrgStatus::from_str(&row.status)?,
        created_at: parse_datetime(&row.created_at),
    })
}

pub fn get_organization(conn: &Connection, id: &Uuid) -> Result<Option<Organization>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(organization_from_row).transpose()
}

/// Organizations of one type, by name. Used to discover partners.
pub fn list_organizations_by_type(
    conn: &Connection,
    org_type: OrgType,
) -> Result<Vec<Organization>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ORG_COLUMNS} FROM organizations
         WHERE org_type = ?1 AND status = 'active' ORDER BY name"
    ))?;
    let rows = stmt
        .query_map(params![org_type.as_str()], read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(organization_from_row).collect()
}

pub fn update_organization_status(
    conn: &Connection,
    id: &Uuid,
    status: OrgStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE organizations SET status = ?2 WHERE id = ?1",
        params![id.to_string(), status.as_str()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Organization".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
