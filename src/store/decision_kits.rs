use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{new_id, parse_time, rubrics, to_db_time, Store};
use crate::error::{Error, Result};
use crate::models::{
    DecisionKit, DecisionKitCandidateRef, DecisionKitCreate, DecisionKitStatus, Rubric,
};
use crate::validation::{normalize_name, validate_kit_description, validate_kit_name};

const COLUMNS: &str = "id, name, description, rubric_id, rubric_version, rubric_published, \
                       status, evaluation_id, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<DecisionKit> {
    let status: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(DecisionKit {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        rubric_id: row.get(3)?,
        rubric_version: row.get(4)?,
        rubric_published: row.get(5)?,
        status: DecisionKitStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("unknown decision kit status '{}'", status).into(),
            )
        })?,
        evaluation_id: row.get(7)?,
        candidates: Vec::new(),
        created_at: parse_time(8, &created_at)?,
        updated_at: parse_time(9, &updated_at)?,
    })
}

fn load_candidates(conn: &Connection, kit_id: &str) -> Result<Vec<DecisionKitCandidateRef>> {
    let mut stmt = conn.prepare(
        "SELECT id, candidate_id, candidate_name, position FROM decision_kit_candidates
         WHERE decision_kit_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![kit_id], |row| {
        let position: i64 = row.get(3)?;
        Ok(DecisionKitCandidateRef {
            id: row.get(0)?,
            candidate_id: row.get(1)?,
            candidate_name: row.get(2)?,
            position: position as usize,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn fetch(conn: &Connection, id: &str) -> Result<Option<DecisionKit>> {
    let sql = format!("SELECT {} FROM decision_kits WHERE id = ?1", COLUMNS);
    let kit = conn.query_row(&sql, params![id], from_row).optional()?;
    match kit {
        Some(mut kit) => {
            kit.candidates = load_candidates(conn, &kit.id)?;
            Ok(Some(kit))
        }
        None => Ok(None),
    }
}

fn fetch_open(conn: &Connection, id: &str) -> Result<DecisionKit> {
    let kit = fetch(conn, id)?.ok_or_else(|| Error::not_found("Decision kit"))?;
    if !kit.is_open() {
        return Err(Error::Conflict(format!(
            "Decision kit is {} and can no longer be modified",
            kit.status.as_str()
        )));
    }
    Ok(kit)
}

fn fetch_rubric_for_kit(conn: &Connection, rubric_id: &str) -> Result<Rubric> {
    rubrics::fetch(conn, rubric_id)?
        .ok_or_else(|| Error::Unprocessable("Invalid rubric id".to_string()))
}

/// Check candidate ids and return `(id, name)` pairs in the given order.
fn resolve_candidates(conn: &Connection, ids: &[String]) -> Result<Vec<(String, String)>> {
    let mut seen = HashSet::new();
    if ids.iter().any(|id| !seen.insert(id.as_str())) {
        return Err(Error::BadRequest("Duplicate candidate ids".to_string()));
    }

    let mut resolved = Vec::with_capacity(ids.len());
    let mut missing = Vec::new();
    for id in ids {
        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM candidates WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match name {
            Some(name) => resolved.push((id.clone(), name)),
            None => missing.push(id.as_str()),
        }
    }
    if !missing.is_empty() {
        return Err(Error::Unprocessable(format!(
            "Unknown candidate ids: {}",
            missing.join(", ")
        )));
    }
    Ok(resolved)
}

fn write_candidates(conn: &Connection, kit_id: &str, candidates: &[(String, String)]) -> Result<()> {
    conn.execute(
        "DELETE FROM decision_kit_candidates WHERE decision_kit_id = ?1",
        params![kit_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO decision_kit_candidates (id, decision_kit_id, candidate_id, candidate_name, position)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, (candidate_id, name)) in candidates.iter().enumerate() {
        stmt.execute(params![new_id(), kit_id, candidate_id, name, position as i64])?;
    }
    Ok(())
}

fn touch(conn: &Connection, kit_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE decision_kits SET updated_at = ?2 WHERE id = ?1",
        params![kit_id, to_db_time(&Utc::now())],
    )?;
    Ok(())
}

impl Store {
    /// Newest first. `name` filters by case-insensitive substring.
    pub fn list_decision_kits(&self, name: Option<&str>) -> Result<Vec<DecisionKit>> {
        let conn = self.conn();
        let filter = name.map(normalize_name).filter(|n| !n.is_empty());
        let sql = format!(
            "SELECT {} FROM decision_kits
             WHERE ?1 IS NULL OR instr(name_normalized, ?1) > 0
             ORDER BY created_at DESC, rowid DESC",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut kits = stmt
            .query_map(params![filter], from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for kit in &mut kits {
            kit.candidates = load_candidates(&conn, &kit.id)?;
        }
        Ok(kits)
    }

    pub fn get_decision_kit(&self, id: &str) -> Result<DecisionKit> {
        fetch(&self.conn(), id)?.ok_or_else(|| Error::not_found("Decision kit"))
    }

    pub fn create_decision_kit(&self, payload: DecisionKitCreate) -> Result<DecisionKit> {
        let name = payload.name.trim().to_string();
        validate_kit_name(&name)?;
        validate_kit_description(payload.description.as_deref())?;
        let normalized = normalize_name(&name);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let taken: Option<String> = tx
            .query_row(
                "SELECT id FROM decision_kits WHERE name_normalized = ?1",
                params![normalized],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(Error::Conflict("Decision kit name already exists".to_string()));
        }
        let rubric = fetch_rubric_for_kit(&tx, &payload.rubric_id)?;
        let candidates = resolve_candidates(&tx, &payload.candidate_ids)?;

        let id = new_id();
        let now = to_db_time(&Utc::now());
        tx.execute(
            "INSERT INTO decision_kits (id, name, name_normalized, description, rubric_id,
                                        rubric_version, rubric_published, status, evaluation_id,
                                        created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?9)",
            params![
                id,
                name,
                normalized,
                payload.description,
                rubric.id,
                rubric.version,
                rubric.published,
                DecisionKitStatus::Open.as_str(),
                now
            ],
        )?;
        write_candidates(&tx, &id, &candidates)?;
        let kit = fetch(&tx, &id)?.ok_or_else(|| Error::Internal("decision kit vanished".into()))?;
        tx.commit()?;

        tracing::info!(id = %kit.id, name = %kit.name, candidates = kit.candidates.len(), "decision kit created");
        Ok(kit)
    }

    /// Replace the kit's candidate list. Positions follow the given order.
    pub fn replace_decision_kit_candidates(
        &self,
        id: &str,
        candidate_ids: &[String],
    ) -> Result<DecisionKit> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        fetch_open(&tx, id)?;
        let candidates = resolve_candidates(&tx, candidate_ids)?;
        write_candidates(&tx, id, &candidates)?;
        touch(&tx, id)?;
        let kit = fetch(&tx, id)?.ok_or_else(|| Error::not_found("Decision kit"))?;
        tx.commit()?;
        Ok(kit)
    }

    /// Point the kit at another rubric, snapshotting its version and
    /// published flag.
    pub fn attach_rubric(&self, id: &str, rubric_id: &str) -> Result<DecisionKit> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        fetch_open(&tx, id)?;
        let rubric = fetch_rubric_for_kit(&tx, rubric_id)?;
        tx.execute(
            "UPDATE decision_kits
             SET rubric_id = ?2, rubric_version = ?3, rubric_published = ?4, updated_at = ?5
             WHERE id = ?1",
            params![id, rubric.id, rubric.version, rubric.published, to_db_time(&Utc::now())],
        )?;
        let kit = fetch(&tx, id)?.ok_or_else(|| Error::not_found("Decision kit"))?;
        tx.commit()?;
        tracing::info!(id, rubric_id, "rubric attached to decision kit");
        Ok(kit)
    }

    /// Lock an open kit with the evaluation that scored it.
    pub fn mark_decision_kit_evaluated(&self, id: &str, evaluation_id: &str) -> Result<DecisionKit> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        fetch_open(&tx, id)?;
        tx.execute(
            "UPDATE decision_kits SET status = ?2, evaluation_id = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                DecisionKitStatus::Evaluated.as_str(),
                evaluation_id,
                to_db_time(&Utc::now())
            ],
        )?;
        let kit = fetch(&tx, id)?.ok_or_else(|| Error::not_found("Decision kit"))?;
        tx.commit()?;
        tracing::info!(id, evaluation_id, "decision kit evaluated");
        Ok(kit)
    }

    /// Delete an open kit. Its candidates survive; only the links go.
    pub fn delete_decision_kit(&self, id: &str) -> Result<()> {
        let conn = self.conn();
        fetch_open(&conn, id)?;
        conn.execute("DELETE FROM decision_kits WHERE id = ?1", params![id])?;
        tracing::info!(id, "decision kit deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use super::*;

    fn create(name: &str, rubric_id: &str, candidate_ids: Vec<String>) -> DecisionKitCreate {
        DecisionKitCreate {
            name: name.to_string(),
            description: Some("Quarterly review".to_string()),
            rubric_id: rubric_id.to_string(),
            candidate_ids,
        }
    }

    #[test]
    fn test_create_snapshots_rubric() {
        let (store, _) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        store.publish_rubric(&rubric.id).unwrap();

        let kit = store
            .create_decision_kit(create("Q3 Vendors", &rubric.id, Vec::new()))
            .unwrap();
        assert_eq!(kit.status, DecisionKitStatus::Open);
        assert_eq!(kit.rubric_version, "1.0.0");
        assert!(kit.rubric_published);
        assert!(kit.evaluation_id.is_none());
    }

    #[test]
    fn test_create_rejections() {
        let (store, _) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        test_support::kit(&store, "Q3 Vendors", &rubric.id);

        let dup = store.create_decision_kit(create("q3 VENDORS", &rubric.id, Vec::new()));
        assert!(matches!(dup, Err(Error::Conflict(_))));

        let bad_rubric = store.create_decision_kit(create("Other", "missing", Vec::new()));
        match bad_rubric {
            Err(Error::Unprocessable(msg)) => assert_eq!(msg, "Invalid rubric id"),
            other => panic!("unexpected {:?}", other),
        }

        let unknown = store.create_decision_kit(create("Other", &rubric.id, vec!["ghost".into()]));
        assert!(matches!(unknown, Err(Error::Unprocessable(_))));

        let bad_name = store.create_decision_kit(create("No/Slash", &rubric.id, Vec::new()));
        assert!(matches!(bad_name, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_replace_candidates_sets_positions() {
        let (store, _) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        let kit = test_support::kit(&store, "Q3 Vendors", &rubric.id);
        let a = test_support::candidate(&store, &kit.id, "Acme");
        let b = test_support::candidate(&store, &kit.id, "Globex");

        let kit = store
            .replace_decision_kit_candidates(&kit.id, &[b.id.clone(), a.id.clone()])
            .unwrap();
        let order: Vec<_> = kit
            .candidates
            .iter()
            .map(|c| (c.candidate_name.as_str(), c.position))
            .collect();
        assert_eq!(order, vec![("Globex", 0), ("Acme", 1)]);

        let dup = store.replace_decision_kit_candidates(&kit.id, &[a.id.clone(), a.id.clone()]);
        assert!(matches!(dup, Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_name_filter() {
        let (store, _) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        test_support::kit(&store, "Q3 Vendors", &rubric.id);
        test_support::kit(&store, "Hiring Round", &rubric.id);

        assert_eq!(store.list_decision_kits(None).unwrap().len(), 2);
        let found = store.list_decision_kits(Some("VEND")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Q3 Vendors");
        assert_eq!(store.list_decision_kits(Some("  ")).unwrap().len(), 2);
    }

    #[test]
    fn test_evaluated_kit_is_locked() {
        let (store, _) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        let other = test_support::rubric(&store, "Other Fit", &[("B", 1.0)]);
        let kit = test_support::kit(&store, "Q3 Vendors", &rubric.id);

        let kit = store.attach_rubric(&kit.id, &other.id).unwrap();
        assert_eq!(kit.rubric_id, other.id);

        let kit = store.mark_decision_kit_evaluated(&kit.id, "eval-1").unwrap();
        assert_eq!(kit.status, DecisionKitStatus::Evaluated);
        assert_eq!(kit.evaluation_id.as_deref(), Some("eval-1"));

        assert!(matches!(store.attach_rubric(&kit.id, &rubric.id), Err(Error::Conflict(_))));
        assert!(matches!(
            store.replace_decision_kit_candidates(&kit.id, &[]),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(store.delete_decision_kit(&kit.id), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_delete_keeps_candidates() {
        let (store, _) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        let kit = test_support::kit(&store, "Q3 Vendors", &rubric.id);
        let candidate = test_support::candidate(&store, &kit.id, "Acme");

        store.delete_decision_kit(&kit.id).unwrap();
        assert!(matches!(store.get_decision_kit(&kit.id), Err(Error::NotFound(_))));
        assert!(store.get_candidate(&candidate.id).is_ok());
    }
}
