//! Candidate evaluation.
//!
//! - [`scoring`]: per-criterion scores, the weighted overall score and the
//!   [`Evaluator`] seam.
//! - [`analyzer`]: deterministic comparison of a batch.
//! - [`normalize`]: uniform view over stored `individual_results`.
//! - [`service`]: runs an evaluator and persists the result.

pub mod analyzer;
pub mod normalize;
pub mod scoring;
pub mod service;

pub use analyzer::{analyze, CandidateEvaluation, ComparisonSummary, RankingStrategy};
pub use normalize::{candidate_breakdown, criteria_breakdown, find_individual_result, select_latest, CriterionScoreView};
pub use scoring::{CandidateSubject, CriterionEvaluation, Evaluator, StubEvaluator};
pub use service::{EvaluationService, MAX_BATCH_CANDIDATES};
