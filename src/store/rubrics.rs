use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{criteria, new_id, parse_json, parse_time, to_db_time, Store};
use crate::error::{Error, Result, ValidationCode};
use crate::models::rubric::INITIAL_RUBRIC_VERSION;
use crate::models::{
    Criteria, CriteriaCreate, Rubric, RubricCreate, RubricCriterionEntry, RubricCriterionInput,
    RubricUpdate,
};
use crate::validation::{
    normalize_name, resolve_weight, validate_entry_weights, validate_rubric_name,
    validate_weight_sum,
};

const COLUMNS: &str =
    "id, name, description, criteria_json, version, published, published_at, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Rubric> {
    let criteria_json: String = row.get(3)?;
    let published_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(Rubric {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        criteria: parse_json(3, &criteria_json)?,
        version: row.get(4)?,
        published: row.get(5)?,
        published_at: published_at.map(|s| parse_time(6, &s)).transpose()?,
        created_at: parse_time(7, &created_at)?,
        updated_at: parse_time(8, &updated_at)?,
    })
}

pub(crate) fn fetch(conn: &Connection, id: &str) -> Result<Option<Rubric>> {
    let sql = format!("SELECT {} FROM rubrics WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![id], from_row).optional()?)
}

/// Fill each entry's text from the criteria table where the criterion
/// still exists.
pub(crate) fn enrich(conn: &Connection, rubric: &mut Rubric) -> Result<()> {
    let mut lookup: HashMap<String, Criteria> = HashMap::new();
    for entry in &rubric.criteria {
        if lookup.contains_key(&entry.criteria_id) {
            continue;
        }
        if let Some(c) = criteria::fetch(conn, &entry.criteria_id)? {
            lookup.insert(c.id.clone(), c);
        }
    }
    for entry in &mut rubric.criteria {
        if let Some(c) = lookup.get(&entry.criteria_id) {
            entry.name = Some(c.name.clone());
            entry.description = Some(c.description.clone());
            entry.definition = Some(c.definition.clone());
        }
    }
    Ok(())
}

/// Names of the rubrics whose entries reference `criteria_id`.
pub(crate) fn referencing(conn: &Connection, criteria_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name, criteria_json FROM rubrics ORDER BY created_at, rowid")?;
    let rows = stmt.query_map([], |row| {
        let name: String = row.get(0)?;
        let raw: String = row.get(1)?;
        let entries: Vec<RubricCriterionEntry> = parse_json(1, &raw)?;
        Ok((name, entries))
    })?;
    let mut names = Vec::new();
    for row in rows {
        let (name, entries) = row?;
        if entries.iter().any(|e| e.criteria_id == criteria_id) {
            names.push(name);
        }
    }
    Ok(names)
}

fn name_taken(conn: &Connection, normalized: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM rubrics WHERE name_normalized = ?1",
            params![normalized],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Turn submitted inputs into stored entries.
///
/// Inputs without an id but with a name create their criterion inline.
/// Validation runs in a fixed order: per-weight rules, duplicates, unknown
/// ids, then the sum.
fn resolve_entries(
    store: &Store,
    conn: &Connection,
    inputs: &[RubricCriterionInput],
    existing: &[RubricCriterionEntry],
) -> Result<Vec<RubricCriterionEntry>> {
    let mut entries = Vec::with_capacity(inputs.len());
    for input in inputs {
        let criteria_id = match (&input.criteria_id, &input.name) {
            (Some(id), _) if !id.trim().is_empty() => id.trim().to_string(),
            (_, Some(name)) if !name.trim().is_empty() => {
                let created = criteria::insert(
                    conn,
                    &CriteriaCreate {
                        name: name.clone(),
                        description: input.description.clone().unwrap_or_default(),
                        definition: input.definition.clone().unwrap_or_default(),
                    },
                )?;
                tracing::debug!(id = %created.id, name = %created.name, "criteria created inline");
                created.id
            }
            _ => {
                return Err(Error::validation(
                    ValidationCode::InvalidCriteria,
                    "each criterion needs a criteriaId or a name",
                ))
            }
        };
        let weight = resolve_weight(&store.policy, input.weight, &criteria_id, existing);
        entries.push(RubricCriterionEntry::new(criteria_id, weight));
    }

    validate_entry_weights(&store.policy, &entries)?;

    let mut missing = Vec::new();
    for entry in &entries {
        if criteria::fetch(conn, &entry.criteria_id)?.is_none() {
            missing.push(entry.criteria_id.clone());
        }
    }
    if !missing.is_empty() {
        return Err(Error::validation(
            ValidationCode::InvalidCriteria,
            format!("unknown criteria ids: {}", missing.join(", ")),
        ));
    }

    validate_weight_sum(&entries)?;
    Ok(entries)
}

impl Store {
    /// Newest first.
    pub fn list_rubrics(&self) -> Result<Vec<Rubric>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM rubrics ORDER BY created_at DESC, rowid DESC",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rubrics = stmt
            .query_map([], from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for rubric in &mut rubrics {
            enrich(&conn, rubric)?;
        }
        Ok(rubrics)
    }

    pub fn get_rubric(&self, id: &str) -> Result<Rubric> {
        let conn = self.conn();
        let mut rubric = fetch(&conn, id)?.ok_or_else(|| Error::not_found("Rubric"))?;
        enrich(&conn, &mut rubric)?;
        Ok(rubric)
    }

    pub fn create_rubric(&self, payload: RubricCreate) -> Result<Rubric> {
        let name = payload.name.trim().to_string();
        validate_rubric_name(&name)?;
        let normalized = normalize_name(&name);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if name_taken(&tx, &normalized)? {
            return Err(Error::Conflict("Rubric name already exists".to_string()));
        }
        let entries = resolve_entries(self, &tx, &payload.criteria, &[])?;

        let now = Utc::now();
        let mut rubric = Rubric {
            id: new_id(),
            name,
            description: payload.description,
            criteria: entries,
            version: INITIAL_RUBRIC_VERSION.to_string(),
            published: false,
            published_at: None,
            created_at: now,
            updated_at: now,
        };
        tx.execute(
            "INSERT INTO rubrics (id, name, name_normalized, description, criteria_json, version,
                                  published, published_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, ?7)",
            params![
                rubric.id,
                rubric.name,
                normalized,
                rubric.description,
                serde_json::to_string(&rubric.criteria)?,
                rubric.version,
                to_db_time(&now)
            ],
        )?;
        enrich(&tx, &mut rubric)?;
        tx.commit()?;

        tracing::info!(id = %rubric.id, name = %rubric.name, criteria = rubric.criteria.len(), "rubric created");
        Ok(rubric)
    }

    /// Replace the description and/or criteria of an unpublished rubric.
    pub fn update_rubric(&self, id: &str, payload: RubricUpdate) -> Result<Rubric> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut rubric = fetch(&tx, id)?.ok_or_else(|| Error::not_found("Rubric"))?;
        if rubric.published {
            return Err(Error::Conflict(
                "Published rubric cannot be modified".to_string(),
            ));
        }

        if let Some(description) = payload.description {
            rubric.description = description;
        }
        if let Some(inputs) = payload.criteria {
            rubric.criteria = resolve_entries(self, &tx, &inputs, &rubric.criteria)?;
        }
        rubric.updated_at = Utc::now();

        tx.execute(
            "UPDATE rubrics SET description = ?2, criteria_json = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                rubric.id,
                rubric.description,
                serde_json::to_string(&rubric.criteria)?,
                to_db_time(&rubric.updated_at)
            ],
        )?;
        enrich(&tx, &mut rubric)?;
        tx.commit()?;
        Ok(rubric)
    }

    /// Freeze a rubric. Publishing twice keeps the first timestamp.
    pub fn publish_rubric(&self, id: &str) -> Result<Rubric> {
        {
            let conn = self.conn();
            let rubric = fetch(&conn, id)?.ok_or_else(|| Error::not_found("Rubric"))?;
            if !rubric.published {
                let now = to_db_time(&Utc::now());
                conn.execute(
                    "UPDATE rubrics SET published = 1, published_at = ?2, updated_at = ?2 WHERE id = ?1",
                    params![id, now],
                )?;
                tracing::info!(id, "rubric published");
            }
        }
        self.get_rubric(id)
    }

    pub fn delete_rubric(&self, id: &str) -> Result<()> {
        let conn = self.conn();
        let rubric = fetch(&conn, id)?.ok_or_else(|| Error::not_found("Rubric"))?;
        if rubric.published {
            return Err(Error::Conflict(
                "Published rubric cannot be deleted".to_string(),
            ));
        }
        let in_use: i64 = conn.query_row(
            "SELECT COUNT(*) FROM decision_kits WHERE rubric_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Err(Error::Conflict(
                "Rubric is attached to a decision kit".to_string(),
            ));
        }
        conn.execute("DELETE FROM rubrics WHERE id = ?1", params![id])?;
        tracing::info!(id, "rubric deleted");
        Ok(())
    }
}
