//! Per-criterion scores and the weighted overall score.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Candidate, Rubric};

/// Lowest score a criterion can receive.
pub const SCORE_MIN: f64 = 1.0;
/// Highest score a criterion can receive.
pub const SCORE_MAX: f64 = 5.0;
/// Score given by [`StubEvaluator`].
pub const STUB_SCORE: f64 = 3.0;

/// Default guide used when a criterion carries no definition of its own.
pub const SCORING_GUIDE: [(u8, &str); 5] = [
    (5, "Excellent: fully meets the criterion with strong evidence"),
    (4, "Good: meets the criterion with minor gaps"),
    (3, "Adequate: partially meets the criterion"),
    (2, "Weak: significant gaps against the criterion"),
    (1, "Poor: does not meet the criterion"),
];

/// Render [`SCORING_GUIDE`] one level per line, highest first.
pub fn scoring_guide_text() -> String {
    SCORING_GUIDE
        .iter()
        .map(|(score, text)| format!("{} - {}", score, text))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Criterion evaluation
// ---------------------------------------------------------------------------

/// One criterion's score for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionEvaluation {
    pub criterion_id: String,
    pub criterion_name: String,
    #[serde(default)]
    pub criterion_description: String,
    pub weight: f64,
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// `Σ score·weight / Σ weight`, or 0 when there is no weight at all.
pub fn weighted_overall_score(evaluations: &[CriterionEvaluation]) -> f64 {
    let total_weight: f64 = evaluations.iter().map(|e| e.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = evaluations.iter().map(|e| e.score * e.weight).sum();
    weighted / total_weight
}

/// Clamp a raw score into the 1 to 5 band.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return SCORE_MIN;
    }
    score.clamp(SCORE_MIN, SCORE_MAX)
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// What an evaluator gets to see about a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSubject {
    pub candidate: Candidate,
    /// Filenames of the candidate's uploaded materials.
    pub materials: Vec<String>,
}

/// Scores one candidate against every criterion of a rubric.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Short label recorded in evaluation metadata.
    fn name(&self) -> &str;

    async fn evaluate(
        &self,
        rubric: &Rubric,
        subject: &CandidateSubject,
    ) -> Result<Vec<CriterionEvaluation>>;
}

/// Gives every criterion the midpoint score. Used when no scoring model is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubEvaluator;

#[async_trait]
impl Evaluator for StubEvaluator {
    fn name(&self) -> &str {
        "stub"
    }

    async fn evaluate(
        &self,
        rubric: &Rubric,
        _subject: &CandidateSubject,
    ) -> Result<Vec<CriterionEvaluation>> {
        Ok(rubric
            .criteria
            .iter()
            .map(|entry| {
                let name = entry
                    .name
                    .clone()
                    .unwrap_or_else(|| entry.criteria_id.clone());
                CriterionEvaluation {
                    criterion_id: entry.criteria_id.clone(),
                    reasoning: format!("Stub evaluation for {}", name),
                    criterion_name: name,
                    criterion_description: entry.description.clone().unwrap_or_default(),
                    weight: entry.weight,
                    score: STUB_SCORE,
                    evidence: vec!["Placeholder evidence".to_string()],
                }
            })
            .collect())
    }
}
