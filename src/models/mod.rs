//! Wire and domain types.
//!
//! CRUD entities serialize in camelCase. Evaluation payloads keep the
//! snake_case shape produced by the evaluation agent.

pub mod candidate;
pub mod criteria;
pub mod decision_kit;
pub mod evaluation;
pub mod rubric;

pub use candidate::{
    Candidate, CandidateCreate, CandidateMaterial, CandidateMaterialList, CandidateUpdate,
};
pub use criteria::{Criteria, CriteriaCreate, CriteriaUpdate};
pub use decision_kit::{
    AttachRubric, DecisionKit, DecisionKitCandidateRef, DecisionKitCreate, DecisionKitStatus,
    DecisionKitUpdateCandidates,
};
pub use evaluation::{
    EvaluationCandidate, EvaluationRequest, EvaluationResponse, EvaluationResult,
    EvaluationResultCreate, EvaluationResultList, EvaluationResultSummary,
};
pub use rubric::{Rubric, RubricCreate, RubricCriterionEntry, RubricCriterionInput, RubricUpdate};

/// Anything addressable by a string id. Used by the cache and list helpers.
pub trait Identified {
    fn id(&self) -> &str;
}

macro_rules! impl_identified {
    ($($ty:ty),* $(,)?) => {
        $(impl Identified for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })*
    };
}

impl_identified!(
    Criteria,
    Rubric,
    DecisionKit,
    Candidate,
    CandidateMaterial,
    EvaluationResult,
    EvaluationResultSummary,
);
