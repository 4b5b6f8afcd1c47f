use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use super::{candidates, new_id, parse_json, parse_time, to_db_time, Store};
use crate::error::{Error, Result, ValidationCode};
use crate::models::{
    EvaluationCandidate, EvaluationResult, EvaluationResultCreate, EvaluationResultList,
    EvaluationResultSummary,
};

pub const MIN_OVERALL_SCORE: f64 = 1.0;
pub const MAX_OVERALL_SCORE: f64 = 5.0;
/// Page size of `list_evaluations` when none is given.
pub const DEFAULT_LIST_LIMIT: usize = 50;

const SUMMARY_COLUMNS: &str =
    "id, rubric_id, rubric_name, overall_score, total_candidates, is_batch, created_at";
const RESULT_COLUMNS: &str = "id, rubric_id, overall_score, rubric_name, total_candidates, \
                              is_batch, individual_results, comparison_summary, \
                              evaluation_metadata, created_at, updated_at";

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<EvaluationResultSummary> {
    let total: i64 = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(EvaluationResultSummary {
        id: row.get(0)?,
        rubric_id: row.get(1)?,
        rubric_name: row.get(2)?,
        overall_score: row.get(3)?,
        total_candidates: total.max(0) as usize,
        is_batch: row.get(5)?,
        created_at: parse_time(6, &created_at)?,
    })
}

fn optional_json(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<Value>> {
    raw.map(|s| parse_json(idx, &s)).transpose()
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<EvaluationResult> {
    let total: i64 = row.get(4)?;
    let individual: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok(EvaluationResult {
        id: row.get(0)?,
        rubric_id: row.get(1)?,
        overall_score: row.get(2)?,
        rubric_name: row.get(3)?,
        total_candidates: total.max(0) as usize,
        is_batch: row.get(5)?,
        individual_results: parse_json(6, &individual)?,
        comparison_summary: optional_json(7, row.get(7)?)?,
        evaluation_metadata: optional_json(8, row.get(8)?)?,
        created_at: parse_time(9, &created_at)?,
        updated_at: parse_time(10, &updated_at)?,
        candidates: Vec::new(),
    })
}

fn candidate_from_row(row: &Row<'_>) -> rusqlite::Result<EvaluationCandidate> {
    let rank: Option<i64> = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(EvaluationCandidate {
        id: row.get(0)?,
        evaluation_id: row.get(1)?,
        candidate_id: row.get(2)?,
        candidate_score: row.get(3)?,
        rank: rank.and_then(|r| u32::try_from(r).ok()),
        created_at: parse_time(5, &created_at)?,
    })
}

/// Score and rank recorded for one candidate of a new evaluation.
///
/// The overall score is the fallback. A matching `individual_results` entry
/// supplies the candidate's own score, and for batch runs a matching
/// `comparison_summary.rankings` entry supplies the rank and may override
/// the score.
pub fn candidate_standing(payload: &EvaluationResultCreate, candidate_id: &str) -> (f64, Option<u32>) {
    let is_candidate = |v: &&Value| v.get("candidate_id").and_then(Value::as_str) == Some(candidate_id);

    let mut score = payload
        .individual_results
        .iter()
        .find(is_candidate)
        .and_then(|r| r.get("overall_score"))
        .and_then(Value::as_f64)
        .unwrap_or(payload.overall_score);
    let mut rank = None;

    if payload.is_batch {
        let ranking = payload
            .comparison_summary
            .as_ref()
            .and_then(|s| s.get("rankings"))
            .and_then(Value::as_array)
            .and_then(|rankings| rankings.iter().find(is_candidate));
        if let Some(ranking) = ranking {
            rank = ranking
                .get("rank")
                .and_then(Value::as_u64)
                .and_then(|r| u32::try_from(r).ok());
            if let Some(s) = ranking.get("overall_score").and_then(Value::as_f64) {
                score = s;
            }
        }
    }
    (score, rank)
}

fn validate_create(payload: &EvaluationResultCreate) -> Result<()> {
    if !(MIN_OVERALL_SCORE..=MAX_OVERALL_SCORE).contains(&payload.overall_score) {
        return Err(Error::validation(
            ValidationCode::InvalidField,
            format!(
                "overall_score must be between {} and {}",
                MIN_OVERALL_SCORE, MAX_OVERALL_SCORE
            ),
        ));
    }
    if payload.total_candidates < 1 {
        return Err(Error::validation(
            ValidationCode::InvalidField,
            "total_candidates must be at least 1",
        ));
    }
    if payload.candidate_ids.is_empty() {
        return Err(Error::validation(
            ValidationCode::InvalidField,
            "candidate_ids must not be empty",
        ));
    }
    Ok(())
}

fn load_candidates(conn: &Connection, evaluation_id: &str) -> Result<Vec<EvaluationCandidate>> {
    let mut stmt = conn.prepare(
        "SELECT id, evaluation_id, candidate_id, candidate_score, rank, created_at
         FROM evaluation_candidates WHERE evaluation_id = ?1
         ORDER BY rank IS NULL, rank, rowid",
    )?;
    let rows = stmt.query_map(params![evaluation_id], candidate_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn query_summaries(conn: &Connection, sql: &str, key: &str) -> Result<Vec<EvaluationResultSummary>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![key], summary_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

impl Store {
    pub fn create_evaluation(&self, payload: EvaluationResultCreate) -> Result<EvaluationResult> {
        validate_create(&payload)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut missing = Vec::new();
        for candidate_id in &payload.candidate_ids {
            if candidates::fetch(&tx, candidate_id)?.is_none() {
                missing.push(candidate_id.as_str());
            }
        }
        if !missing.is_empty() {
            return Err(Error::Unprocessable(format!(
                "Unknown candidate ids: {}",
                missing.join(", ")
            )));
        }

        let id = new_id();
        let now = to_db_time(&Utc::now());
        tx.execute(
            "INSERT INTO evaluation_results (id, rubric_id, overall_score, rubric_name,
                                             total_candidates, is_batch, individual_results,
                                             comparison_summary, evaluation_metadata,
                                             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id,
                payload.rubric_id,
                payload.overall_score,
                payload.rubric_name,
                payload.total_candidates as i64,
                payload.is_batch,
                serde_json::to_string(&payload.individual_results)?,
                payload
                    .comparison_summary
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                payload
                    .evaluation_metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                now
            ],
        )?;

        for candidate_id in &payload.candidate_ids {
            let (score, rank) = candidate_standing(&payload, candidate_id);
            tx.execute(
                "INSERT INTO evaluation_candidates (id, evaluation_id, candidate_id, candidate_score,
                                                    rank, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![new_id(), id, candidate_id, score, rank.map(i64::from), now],
            )?;
        }
        tx.commit()?;
        drop(conn);

        tracing::info!(
            id = %id,
            rubric = %payload.rubric_id,
            candidates = payload.candidate_ids.len(),
            "evaluation stored"
        );
        self.get_evaluation(&id)
    }

    /// Full result with candidates ordered by rank, unranked last.
    pub fn get_evaluation(&self, id: &str) -> Result<EvaluationResult> {
        let conn = self.conn();
        let sql = format!("SELECT {} FROM evaluation_results WHERE id = ?1", RESULT_COLUMNS);
        let mut result = conn
            .query_row(&sql, params![id], result_from_row)
            .optional()?
            .ok_or_else(|| Error::not_found("Evaluation result"))?;
        result.candidates = load_candidates(&conn, id)?;
        Ok(result)
    }

    /// Newest first, paginated. `total` counts every stored result.
    pub fn list_evaluations(&self, limit: usize, offset: usize) -> Result<EvaluationResultList> {
        let conn = self.conn();
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM evaluation_results", [], |row| row.get(0))?;
        let sql = format!(
            "SELECT {} FROM evaluation_results ORDER BY created_at DESC, rowid DESC
             LIMIT ?1 OFFSET ?2",
            SUMMARY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let results = stmt
            .query_map(params![limit as i64, offset as i64], summary_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(EvaluationResultList {
            total: total.max(0) as usize,
            results,
        })
    }

    pub fn list_evaluations_for_rubric(&self, rubric_id: &str) -> Result<Vec<EvaluationResultSummary>> {
        let sql = format!(
            "SELECT {} FROM evaluation_results WHERE rubric_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            SUMMARY_COLUMNS
        );
        query_summaries(&self.conn(), &sql, rubric_id)
    }

    pub fn list_evaluations_for_candidate(
        &self,
        candidate_id: &str,
    ) -> Result<Vec<EvaluationResultSummary>> {
        let columns = SUMMARY_COLUMNS
            .split(", ")
            .map(|c| format!("r.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM evaluation_results r
             JOIN evaluation_candidates ec ON ec.evaluation_id = r.id
             WHERE ec.candidate_id = ?1
             ORDER BY r.created_at DESC, r.rowid DESC",
            columns
        );
        query_summaries(&self.conn(), &sql, candidate_id)
    }

    pub fn delete_evaluation(&self, id: &str) -> Result<()> {
        let removed = self
            .conn()
            .execute("DELETE FROM evaluation_results WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(Error::not_found("Evaluation result"));
        }
        tracing::info!(id, "evaluation deleted");
        Ok(())
    }
}
