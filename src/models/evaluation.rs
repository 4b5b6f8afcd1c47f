//! Persisted evaluation results and the evaluate request/response pair.
//!
//! `individual_results` and `comparison_summary` are stored as loose JSON:
//! their shape depends on which evaluator produced them. Use
//! [`crate::evaluation::normalize`] to read them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for `POST /candidates/evaluations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResultCreate {
    pub rubric_id: String,
    /// Weighted overall score, 1.0 to 5.0.
    pub overall_score: f64,
    pub rubric_name: String,
    pub total_candidates: usize,
    #[serde(default)]
    pub is_batch: bool,
    pub individual_results: Vec<Value>,
    #[serde(default)]
    pub comparison_summary: Option<Value>,
    #[serde(default)]
    pub evaluation_metadata: Option<Value>,
    pub candidate_ids: Vec<String>,
}

/// One candidate's standing within an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCandidate {
    pub id: String,
    pub evaluation_id: String,
    pub candidate_id: String,
    pub candidate_score: f64,
    pub rank: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub id: String,
    pub rubric_id: String,
    pub overall_score: f64,
    pub rubric_name: String,
    pub total_candidates: usize,
    pub is_batch: bool,
    #[serde(default)]
    pub individual_results: Vec<Value>,
    #[serde(default)]
    pub comparison_summary: Option<Value>,
    #[serde(default)]
    pub evaluation_metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub candidates: Vec<EvaluationCandidate>,
}

impl EvaluationResult {
    /// Association row for `candidate_id`, if it took part.
    pub fn candidate(&self, candidate_id: &str) -> Option<&EvaluationCandidate> {
        self.candidates
            .iter()
            .find(|c| c.candidate_id == candidate_id)
    }
}

/// Listing view without the heavy JSON columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResultSummary {
    pub id: String,
    pub rubric_id: String,
    pub rubric_name: String,
    pub overall_score: f64,
    pub total_candidates: usize,
    pub is_batch: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResultList {
    pub total: usize,
    pub results: Vec<EvaluationResultSummary>,
}

/// Payload for `POST /evaluation/evaluate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub rubric_id: String,
    #[serde(default)]
    pub candidate_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Reply of `POST /evaluation/evaluate`. Failures are reported in-band with
/// `status: "error"` rather than through the HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub status: ResponseStatus,
    pub is_batch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResponse {
    pub fn success(evaluation_id: String, is_batch: bool) -> Self {
        Self {
            status: ResponseStatus::Success,
            is_batch,
            evaluation_id: Some(evaluation_id),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, is_batch: bool) -> Self {
        Self {
            status: ResponseStatus::Error,
            is_batch,
            evaluation_id: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_wire_shape() {
        let ok = serde_json::to_value(EvaluationResponse::success("e1".into(), true)).unwrap();
        assert_eq!(
            ok,
            serde_json::json!({"status": "success", "is_batch": true, "evaluation_id": "e1"})
        );

        let err = serde_json::to_value(EvaluationResponse::failure("No candidate IDs provided", false))
            .unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["error"], "No candidate IDs provided");
        assert!(err.get("evaluation_id").is_none());
    }

    #[test]
    fn test_create_payload_defaults() {
        let payload: EvaluationResultCreate = serde_json::from_value(serde_json::json!({
            "rubric_id": "r1",
            "overall_score": 3.5,
            "rubric_name": "Vendor fit",
            "total_candidates": 1,
            "individual_results": [],
            "candidate_ids": ["c1"],
        }))
        .unwrap();
        assert!(!payload.is_batch);
        assert!(payload.comparison_summary.is_none());
    }
}
