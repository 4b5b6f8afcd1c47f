use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{decision_kits, new_id, parse_time, to_db_time, Store};
use crate::error::{Error, Result};
use crate::models::{Candidate, CandidateCreate, CandidateUpdate};
use crate::validation::{normalize_name, validate_candidate_name};

const COLUMNS: &str = "id, name, name_normalized, description, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Candidate> {
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(Candidate {
        id: row.get(0)?,
        name: row.get(1)?,
        name_normalized: row.get(2)?,
        description: row.get(3)?,
        created_at: parse_time(4, &created_at)?,
        updated_at: parse_time(5, &updated_at)?,
    })
}

pub(crate) fn fetch(conn: &Connection, id: &str) -> Result<Option<Candidate>> {
    let sql = format!("SELECT {} FROM candidates WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![id], from_row).optional()?)
}

/// Whether another candidate in `kit_id` already uses `normalized`.
fn name_taken_in_kit(
    conn: &Connection,
    kit_id: &str,
    normalized: &str,
    exclude_id: Option<&str>,
) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT c.id FROM candidates c
             JOIN decision_kit_candidates dkc ON dkc.candidate_id = c.id
             WHERE dkc.decision_kit_id = ?1 AND c.name_normalized = ?2
               AND (?3 IS NULL OR c.id != ?3)
             LIMIT 1",
            params![kit_id, normalized, exclude_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn kits_of(conn: &Connection, candidate_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT decision_kit_id FROM decision_kit_candidates WHERE candidate_id = ?1",
    )?;
    let rows = stmt.query_map(params![candidate_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
}

/// Renumber a kit's candidates to 0..n keeping their relative order.
fn compact_positions(conn: &Connection, kit_id: &str) -> Result<()> {
    let ids: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM decision_kit_candidates WHERE decision_kit_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![kit_id], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for (position, link_id) in ids.iter().enumerate() {
        conn.execute(
            "UPDATE decision_kit_candidates SET position = ?2 WHERE id = ?1",
            params![link_id, position as i64],
        )?;
    }
    Ok(())
}

fn conflict() -> Error {
    Error::Conflict("Candidate name already exists in this decision kit".to_string())
}

impl Store {
    /// Newest first.
    pub fn list_candidates(&self) -> Result<Vec<Candidate>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM candidates ORDER BY created_at DESC, rowid DESC",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_candidate(&self, id: &str) -> Result<Candidate> {
        fetch(&self.conn(), id)?.ok_or_else(|| Error::not_found("Candidate"))
    }

    /// Create a candidate and append it to its decision kit.
    pub fn create_candidate(&self, payload: CandidateCreate) -> Result<Candidate> {
        let name = payload.name.trim().to_string();
        validate_candidate_name(&name)?;
        let normalized = normalize_name(&name);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let kit = decision_kits::fetch(&tx, &payload.decision_kit_id)?
            .ok_or_else(|| Error::BadRequest("invalid decision kit id".to_string()))?;
        if !kit.is_open() {
            return Err(Error::Conflict(format!(
                "Decision kit is {} and can no longer be modified",
                kit.status.as_str()
            )));
        }
        if name_taken_in_kit(&tx, &kit.id, &normalized, None)? {
            return Err(conflict());
        }

        let now = Utc::now();
        let candidate = Candidate {
            id: new_id(),
            name,
            name_normalized: normalized,
            description: payload.description,
            created_at: now,
            updated_at: now,
        };
        tx.execute(
            "INSERT INTO candidates (id, name, name_normalized, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                candidate.id,
                candidate.name,
                candidate.name_normalized,
                candidate.description,
                to_db_time(&now)
            ],
        )?;
        tx.execute(
            "INSERT INTO decision_kit_candidates (id, decision_kit_id, candidate_id, candidate_name, position)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new_id(),
                kit.id,
                candidate.id,
                candidate.name,
                kit.candidates.len() as i64
            ],
        )?;
        tx.commit()?;

        tracing::info!(id = %candidate.id, kit = %kit.id, "candidate created");
        Ok(candidate)
    }

    /// Rename or re-describe a candidate.
    ///
    /// Uniqueness is checked in `decision_kit_id` when given, otherwise in
    /// every kit the candidate belongs to.
    pub fn update_candidate(&self, id: &str, payload: CandidateUpdate) -> Result<Candidate> {
        let name = payload.name.trim().to_string();
        validate_candidate_name(&name)?;
        let normalized = normalize_name(&name);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut candidate = fetch(&tx, id)?.ok_or_else(|| Error::not_found("Candidate"))?;

        let scope = match payload.decision_kit_id {
            Some(kit_id) => vec![kit_id],
            None => kits_of(&tx, id)?,
        };
        for kit_id in &scope {
            if name_taken_in_kit(&tx, kit_id, &normalized, Some(id))? {
                return Err(conflict());
            }
        }

        candidate.name = name;
        candidate.name_normalized = normalized;
        if payload.description.is_some() {
            candidate.description = payload.description;
        }
        candidate.updated_at = Utc::now();
        tx.execute(
            "UPDATE candidates SET name = ?2, name_normalized = ?3, description = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                candidate.id,
                candidate.name,
                candidate.name_normalized,
                candidate.description,
                to_db_time(&candidate.updated_at)
            ],
        )?;
        tx.execute(
            "UPDATE decision_kit_candidates SET candidate_name = ?2 WHERE candidate_id = ?1",
            params![candidate.id, candidate.name],
        )?;
        tx.commit()?;
        Ok(candidate)
    }

    /// Delete a candidate with its materials and kit links, then close the
    /// gaps in the affected kits' positions.
    pub fn delete_candidate(&self, id: &str) -> Result<()> {
        let blob_paths = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            if fetch(&tx, id)?.is_none() {
                return Err(Error::not_found("Candidate"));
            }
            let kits = kits_of(&tx, id)?;
            let blob_paths: Vec<String> = {
                let mut stmt =
                    tx.prepare("SELECT blob_path FROM candidate_materials WHERE candidate_id = ?1")?;
                let rows = stmt.query_map(params![id], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            tx.execute("DELETE FROM candidates WHERE id = ?1", params![id])?;
            for kit_id in &kits {
                compact_positions(&tx, kit_id)?;
            }
            tx.commit()?;
            blob_paths
        };

        for path in &blob_paths {
            if let Err(e) = self.blobs.delete(path) {
                tracing::warn!(path = %path, error = %e, "failed to delete material blob");
            }
        }
        tracing::info!(id, materials = blob_paths.len(), "candidate deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use super::*;
    use crate::blob::BlobStore;
    use crate::store::NewMaterial;

    #[test]
    fn test_create_appends_to_kit() {
        let (store, _) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        let kit = test_support::kit(&store, "Q3 Vendors", &rubric.id);
        let first = test_support::candidate(&store, &kit.id, "Acme Corp.");
        let second = test_support::candidate(&store, &kit.id, "Globex");

        assert_eq!(first.name_normalized, "acme corp.");
        let kit = store.get_decision_kit(&kit.id).unwrap();
        assert_eq!(kit.candidate_ids(), vec![first.id, second.id]);
        assert_eq!(kit.candidates[1].position, 1);
    }

    #[test]
    fn test_create_rejections() {
        let (store, _) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        let kit = test_support::kit(&store, "Q3 Vendors", &rubric.id);
        test_support::candidate(&store, &kit.id, "Acme");

        let missing_kit = store.create_candidate(CandidateCreate {
            name: "Initech".into(),
            description: None,
            decision_kit_id: "nope".into(),
        });
        match missing_kit {
            Err(Error::BadRequest(msg)) => assert_eq!(msg, "invalid decision kit id"),
            other => panic!("unexpected {:?}", other),
        }

        let dup = store.create_candidate(CandidateCreate {
            name: " ACME ".into(),
            description: None,
            decision_kit_id: kit.id.clone(),
        });
        assert!(matches!(dup, Err(Error::Conflict(_))));

        // Same name is fine in another kit.
        let other = test_support::kit(&store, "Q4 Vendors", &rubric.id);
        test_support::candidate(&store, &other.id, "Acme");
    }

    #[test]
    fn test_update_refreshes_kit_name() {
        let (store, _) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        let kit = test_support::kit(&store, "Q3 Vendors", &rubric.id);
        let acme = test_support::candidate(&store, &kit.id, "Acme");
        test_support::candidate(&store, &kit.id, "Globex");

        let renamed = store
            .update_candidate(
                &acme.id,
                CandidateUpdate {
                    name: "Acme Holdings".into(),
                    description: Some("Parent company".into()),
                    decision_kit_id: None,
                },
            )
            .unwrap();
        assert_eq!(renamed.description.as_deref(), Some("Parent company"));
        let kit_view = store.get_decision_kit(&kit.id).unwrap();
        assert_eq!(kit_view.candidates[0].candidate_name, "Acme Holdings");

        let clash = store.update_candidate(
            &acme.id,
            CandidateUpdate {
                name: "globex".into(),
                description: None,
                decision_kit_id: Some(kit.id.clone()),
            },
        );
        assert!(matches!(clash, Err(Error::Conflict(_))));

        // Renaming to its own name is not a clash.
        store
            .update_candidate(
                &acme.id,
                CandidateUpdate {
                    name: "ACME HOLDINGS".into(),
                    description: None,
                    decision_kit_id: None,
                },
            )
            .unwrap();
    }

    #[test]
    fn test_delete_compacts_and_removes_materials() {
        let (store, blobs) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        let kit = test_support::kit(&store, "Q3 Vendors", &rubric.id);
        let a = test_support::candidate(&store, &kit.id, "Acme");
        let b = test_support::candidate(&store, &kit.id, "Globex");
        let c = test_support::candidate(&store, &kit.id, "Initech");

        let material = store
            .create_material(
                &b.id,
                NewMaterial {
                    filename: "deck.pdf".into(),
                    content_type: "application/pdf".into(),
                    bytes: bytes::Bytes::from_static(b"%PDF"),
                },
            )
            .unwrap();
        assert!(blobs.exists(&material.blob_path));

        store.delete_candidate(&b.id).unwrap();
        assert!(!blobs.exists(&material.blob_path));
        assert!(matches!(store.get_candidate(&b.id), Err(Error::NotFound(_))));

        let kit = store.get_decision_kit(&kit.id).unwrap();
        let positions: Vec<_> = kit
            .candidates
            .iter()
            .map(|r| (r.candidate_id.clone(), r.position))
            .collect();
        assert_eq!(positions, vec![(a.id, 0), (c.id, 1)]);
        assert!(matches!(store.delete_candidate(&b.id), Err(Error::NotFound(_))));
    }
}
