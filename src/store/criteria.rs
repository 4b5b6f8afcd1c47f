use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{new_id, rubrics, to_db_time, Store};
use crate::error::{Error, Result, ValidationCode};
use crate::models::{Criteria, CriteriaCreate, CriteriaUpdate};

const COLUMNS: &str = "id, name, description, definition";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Criteria> {
    Ok(Criteria {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        definition: row.get(3)?,
    })
}

fn require_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(
            ValidationCode::InvalidName,
            "criteria name is required",
        ));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn fetch(conn: &Connection, id: &str) -> Result<Option<Criteria>> {
    let sql = format!("SELECT {} FROM criteria WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![id], from_row).optional()?)
}

/// Insert a criterion using an open connection or transaction.
pub(crate) fn insert(conn: &Connection, payload: &CriteriaCreate) -> Result<Criteria> {
    let criteria = Criteria {
        id: new_id(),
        name: require_name(&payload.name)?,
        description: payload.description.clone(),
        definition: payload.definition.clone(),
    };
    conn.execute(
        "INSERT INTO criteria (id, name, description, definition, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            criteria.id,
            criteria.name,
            criteria.description,
            criteria.definition,
            to_db_time(&Utc::now())
        ],
    )?;
    Ok(criteria)
}

impl Store {
    pub fn list_criteria(&self) -> Result<Vec<Criteria>> {
        let conn = self.conn();
        let sql = format!("SELECT {} FROM criteria ORDER BY created_at, rowid", COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_criteria(&self, id: &str) -> Result<Criteria> {
        fetch(&self.conn(), id)?.ok_or_else(|| Error::not_found("Criteria"))
    }

    pub fn create_criteria(&self, payload: CriteriaCreate) -> Result<Criteria> {
        let criteria = insert(&self.conn(), &payload)?;
        tracing::info!(id = %criteria.id, name = %criteria.name, "criteria created");
        Ok(criteria)
    }

    /// Apply the present fields of `payload`.
    pub fn update_criteria(&self, id: &str, payload: CriteriaUpdate) -> Result<Criteria> {
        let conn = self.conn();
        let mut criteria = fetch(&conn, id)?.ok_or_else(|| Error::not_found("Criteria"))?;
        if payload.is_empty() {
            return Ok(criteria);
        }
        if let Some(name) = payload.name {
            criteria.name = require_name(&name)?;
        }
        if let Some(description) = payload.description {
            criteria.description = description;
        }
        if let Some(definition) = payload.definition {
            criteria.definition = definition;
        }
        conn.execute(
            "UPDATE criteria SET name = ?2, description = ?3, definition = ?4 WHERE id = ?1",
            params![criteria.id, criteria.name, criteria.description, criteria.definition],
        )?;
        Ok(criteria)
    }

    /// A criterion referenced by any rubric cannot be deleted.
    pub fn delete_criteria(&self, id: &str) -> Result<()> {
        let conn = self.conn();
        if fetch(&conn, id)?.is_none() {
            return Err(Error::not_found("Criteria"));
        }
        let users = rubrics::referencing(&conn, id)?;
        if !users.is_empty() {
            return Err(Error::Conflict(format!(
                "Criteria is used by rubric(s): {}",
                users.join(", ")
            )));
        }
        conn.execute("DELETE FROM criteria WHERE id = ?1", params![id])?;
        tracing::info!(id, "criteria deleted");
        Ok(())
    }
}
