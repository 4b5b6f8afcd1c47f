//! Runs an evaluator over candidates and records the result.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use super::analyzer::{analyze, mean, CandidateEvaluation, RankingStrategy};
use super::scoring::{clamp_score, weighted_overall_score, CandidateSubject, Evaluator, STUB_SCORE};
use crate::error::{Error, Result};
use crate::models::{
    DecisionKit, EvaluationRequest, EvaluationResponse, EvaluationResultCreate, Rubric,
};
use crate::store::{blocking, Store};

/// Largest batch accepted by one evaluate call.
pub const MAX_BATCH_CANDIDATES: usize = 20;

/// Ties the store to an [`Evaluator`].
pub struct EvaluationService {
    store: Arc<Store>,
    evaluator: Arc<dyn Evaluator>,
    strategy: RankingStrategy,
}

fn check_candidate_ids(ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Err(Error::BadRequest("No candidate IDs provided".to_string()));
    }
    if ids.len() > MAX_BATCH_CANDIDATES {
        return Err(Error::BadRequest(format!(
            "Too many candidates ({}). Maximum is {} per batch.",
            ids.len(),
            MAX_BATCH_CANDIDATES
        )));
    }
    let mut seen = HashSet::new();
    if ids.iter().any(|id| !seen.insert(id.as_str())) {
        return Err(Error::BadRequest("Candidate IDs must be unique".to_string()));
    }
    Ok(())
}

fn load_inputs(store: &Store, rubric_id: &str, ids: &[String]) -> Result<(Rubric, Vec<CandidateSubject>)> {
    let rubric = match store.get_rubric(rubric_id) {
        Ok(rubric) => rubric,
        Err(Error::NotFound(_)) => {
            return Err(Error::NotFound(format!("Rubric '{}' not found", rubric_id)))
        }
        Err(e) => return Err(e),
    };
    if rubric.criteria.is_empty() {
        return Err(Error::BadRequest(format!(
            "Rubric '{}' has no criteria",
            rubric.name
        )));
    }

    let mut subjects = Vec::with_capacity(ids.len());
    for id in ids {
        let candidate = match store.get_candidate(id) {
            Ok(candidate) => candidate,
            Err(Error::NotFound(_)) => {
                return Err(Error::NotFound(format!("Candidate '{}' not found", id)))
            }
            Err(e) => return Err(e),
        };
        let materials = store
            .list_materials(id)?
            .items
            .into_iter()
            .map(|m| m.filename)
            .collect();
        subjects.push(CandidateSubject { candidate, materials });
    }
    Ok((rubric, subjects))
}

impl EvaluationService {
    pub fn new(store: Arc<Store>, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            store,
            evaluator,
            strategy: RankingStrategy::default(),
        }
    }

    /// Ranking strategy used by [`evaluate_kit`](Self::evaluate_kit) and
    /// [`evaluate_request`](Self::evaluate_request).
    pub fn with_strategy(mut self, strategy: RankingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn evaluator_name(&self) -> &str {
        self.evaluator.name()
    }

    /// Score `candidate_ids` against a rubric and persist the outcome.
    /// Returns the new evaluation id.
    pub async fn evaluate(
        &self,
        rubric_id: &str,
        candidate_ids: &[String],
        strategy: RankingStrategy,
    ) -> Result<String> {
        check_candidate_ids(candidate_ids)?;

        let (rubric, subjects) = {
            let rubric_id = rubric_id.to_string();
            let ids = candidate_ids.to_vec();
            blocking(&self.store, move |store| load_inputs(store, &rubric_id, &ids)).await?
        };

        let mut results = Vec::with_capacity(subjects.len());
        for subject in &subjects {
            let criteria_evaluations = self.evaluator.evaluate(&rubric, subject).await?;
            let overall_score = clamp_score(weighted_overall_score(&criteria_evaluations));
            tracing::debug!(
                candidate = %subject.candidate.id,
                score = overall_score,
                "candidate scored"
            );
            results.push(CandidateEvaluation {
                candidate_id: subject.candidate.id.clone(),
                candidate_name: subject.candidate.name.clone(),
                overall_score,
                criteria_evaluations,
            });
        }

        let is_batch = results.len() > 1;
        let comparison = if is_batch { analyze(&results, strategy) } else { None };
        let overall_score = match (&comparison, results.as_slice()) {
            (Some(summary), _) => summary.best_candidate.overall_score,
            (None, [single]) => single.overall_score,
            (None, []) => STUB_SCORE,
            (None, many) => mean(&many.iter().map(|r| r.overall_score).collect::<Vec<_>>()),
        };

        let payload = EvaluationResultCreate {
            rubric_id: rubric.id.clone(),
            overall_score: clamp_score(overall_score),
            rubric_name: rubric.name.clone(),
            total_candidates: results.len(),
            is_batch,
            individual_results: results
                .iter()
                .map(serde_json::to_value)
                .collect::<serde_json::Result<Vec<_>>>()?,
            comparison_summary: comparison.as_ref().map(serde_json::to_value).transpose()?,
            evaluation_metadata: Some(json!({
                "workflow": if is_batch { "batch" } else { "single" },
                "rubric_id": rubric.id,
                "evaluator": self.evaluator.name(),
                "ranking_strategy": strategy.as_str(),
                "evaluated_at": Utc::now().to_rfc3339(),
            })),
            candidate_ids: candidate_ids.to_vec(),
        };

        let evaluation = blocking(&self.store, move |store| store.create_evaluation(payload)).await?;
        tracing::info!(
            id = %evaluation.id,
            rubric_id = %evaluation.rubric_id,
            candidates = evaluation.total_candidates,
            score = evaluation.overall_score,
            "evaluation recorded"
        );
        Ok(evaluation.id)
    }

    /// Evaluate every candidate of an open kit against its rubric, then lock
    /// the kit with the new evaluation.
    pub async fn evaluate_kit(&self, kit_id: &str) -> Result<DecisionKit> {
        let kit = {
            let kit_id = kit_id.to_string();
            blocking(&self.store, move |store| store.get_decision_kit(&kit_id)).await?
        };
        if !kit.is_open() {
            return Err(Error::Conflict(format!(
                "Decision kit is {} and can no longer be modified",
                kit.status.as_str()
            )));
        }
        if kit.candidates.is_empty() {
            return Err(Error::BadRequest("Decision kit has no candidates".to_string()));
        }

        let evaluation_id = self
            .evaluate(&kit.rubric_id, &kit.candidate_ids(), self.strategy)
            .await?;

        let marked = {
            let kit_id = kit.id.clone();
            let evaluation_id = evaluation_id.clone();
            blocking(&self.store, move |store| {
                store.mark_decision_kit_evaluated(&kit_id, &evaluation_id)
            })
            .await
        };
        match marked {
            Ok(kit) => Ok(kit),
            Err(e) => {
                let cleanup = {
                    let evaluation_id = evaluation_id.clone();
                    blocking(&self.store, move |store| store.delete_evaluation(&evaluation_id)).await
                };
                if let Err(cleanup) = cleanup {
                    tracing::warn!(evaluation_id = %evaluation_id, error = %cleanup, "orphaned evaluation");
                }
                Err(e)
            }
        }
    }

    /// Agent-style entry point: failures are reported in the response body.
    pub async fn evaluate_request(&self, request: EvaluationRequest) -> EvaluationResponse {
        let is_batch = request.candidate_ids.len() > 1;
        match self
            .evaluate(&request.rubric_id, &request.candidate_ids, self.strategy)
            .await
        {
            Ok(id) => EvaluationResponse::success(id, is_batch),
            Err(e) => {
                tracing::warn!(rubric_id = %request.rubric_id, error = %e, "evaluation request failed");
                EvaluationResponse::failure(e.to_string(), is_batch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::scoring::{CriterionEvaluation, StubEvaluator};
    use crate::models::DecisionKitStatus;
    use crate::store::test_support;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Scores every criterion of a candidate with a fixed per-name value.
    struct Scripted(HashMap<String, f64>);

    #[async_trait]
    impl Evaluator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn evaluate(
            &self,
            rubric: &Rubric,
            subject: &CandidateSubject,
        ) -> Result<Vec<CriterionEvaluation>> {
            let score = self.0.get(&subject.candidate.name).copied().unwrap_or(1.0);
            Ok(rubric
                .criteria
                .iter()
                .map(|entry| CriterionEvaluation {
                    criterion_id: entry.criteria_id.clone(),
                    criterion_name: entry.name.clone().unwrap_or_default(),
                    criterion_description: String::new(),
                    weight: entry.weight,
                    score,
                    reasoning: "scripted".to_string(),
                    evidence: Vec::new(),
                })
                .collect())
        }
    }

    fn setup() -> (Arc<Store>, Rubric, DecisionKit) {
        let (store, _) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("Speed", 0.6), ("Cost", 0.4)]);
        let kit = test_support::kit(&store, "Q3 Vendors", &rubric.id);
        (Arc::new(store), rubric, kit)
    }

    #[tokio::test]
    async fn test_single_candidate() {
        let (store, rubric, kit) = setup();
        let acme = test_support::candidate(&store, &kit.id, "Acme");
        let service = EvaluationService::new(store.clone(), Arc::new(StubEvaluator));

        let id = service
            .evaluate(&rubric.id, &[acme.id.clone()], RankingStrategy::OverallScore)
            .await
            .unwrap();
        let evaluation = store.get_evaluation(&id).unwrap();

        assert!(!evaluation.is_batch);
        assert_eq!(evaluation.total_candidates, 1);
        assert!((evaluation.overall_score - STUB_SCORE).abs() < 1e-9);
        assert!(evaluation.comparison_summary.is_none());
        assert_eq!(evaluation.individual_results.len(), 1);
        assert_eq!(evaluation.individual_results[0]["candidate_id"], acme.id.as_str());
        let metadata = evaluation.evaluation_metadata.unwrap();
        assert_eq!(metadata["workflow"], "single");
        assert_eq!(metadata["evaluator"], "stub");
    }

    #[tokio::test]
    async fn test_batch_ranks_candidates() {
        let (store, rubric, kit) = setup();
        let acme = test_support::candidate(&store, &kit.id, "Acme");
        let globex = test_support::candidate(&store, &kit.id, "Globex");
        let scripted = Scripted(HashMap::from([
            ("Acme".to_string(), 2.0),
            ("Globex".to_string(), 4.5),
        ]));
        let service = EvaluationService::new(store.clone(), Arc::new(scripted));

        let id = service
            .evaluate(
                &rubric.id,
                &[acme.id.clone(), globex.id.clone()],
                RankingStrategy::OverallScore,
            )
            .await
            .unwrap();
        let evaluation = store.get_evaluation(&id).unwrap();

        assert!(evaluation.is_batch);
        assert!((evaluation.overall_score - 4.5).abs() < 1e-9);
        let summary = evaluation.comparison_summary.as_ref().unwrap();
        assert_eq!(summary["best_candidate"]["candidate_id"], globex.id.as_str());
        assert_eq!(evaluation.candidates[0].candidate_id, globex.id);
        assert_eq!(evaluation.candidates[0].rank, Some(1));
        assert_eq!(evaluation.candidate(&acme.id).unwrap().rank, Some(2));
        assert!((evaluation.candidate(&acme.id).unwrap().candidate_score - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejects_bad_candidate_lists() {
        let (store, rubric, kit) = setup();
        let acme = test_support::candidate(&store, &kit.id, "Acme");
        let service = EvaluationService::new(store, Arc::new(StubEvaluator));
        let strategy = RankingStrategy::default();

        let err = service.evaluate(&rubric.id, &[], strategy).await.unwrap_err();
        assert_eq!(err.to_string(), "No candidate IDs provided");

        let many: Vec<String> = (0..21).map(|i| format!("c{}", i)).collect();
        let err = service.evaluate(&rubric.id, &many, strategy).await.unwrap_err();
        assert_eq!(err.to_string(), "Too many candidates (21). Maximum is 20 per batch.");

        let dup = vec![acme.id.clone(), acme.id.clone()];
        let err = service.evaluate(&rubric.id, &dup, strategy).await.unwrap_err();
        assert_eq!(err.to_string(), "Candidate IDs must be unique");

        let err = service
            .evaluate("ghost", &[acme.id.clone()], strategy)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Rubric 'ghost' not found");

        let err = service
            .evaluate(&rubric.id, &["ghost".to_string()], strategy)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rubric_without_criteria() {
        let (store, _, kit) = setup();
        let acme = test_support::candidate(&store, &kit.id, "Acme");
        let empty = test_support::rubric(&store, "Empty Rubric", &[]);
        let service = EvaluationService::new(store, Arc::new(StubEvaluator));

        let err = service
            .evaluate(&empty.id, &[acme.id], RankingStrategy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_evaluate_kit_locks_kit() {
        let (store, _, kit) = setup();
        test_support::candidate(&store, &kit.id, "Acme");
        test_support::candidate(&store, &kit.id, "Globex");
        let service = EvaluationService::new(store.clone(), Arc::new(StubEvaluator));

        let evaluated = service.evaluate_kit(&kit.id).await.unwrap();
        assert_eq!(evaluated.status, DecisionKitStatus::Evaluated);
        let evaluation_id = evaluated.evaluation_id.clone().unwrap();
        assert_eq!(store.get_evaluation(&evaluation_id).unwrap().total_candidates, 2);

        assert!(matches!(
            service.evaluate_kit(&kit.id).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_evaluate_kit_without_candidates() {
        let (store, _, kit) = setup();
        let service = EvaluationService::new(store, Arc::new(StubEvaluator));
        assert!(matches!(
            service.evaluate_kit(&kit.id).await,
            Err(Error::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_evaluate_request_reports_in_band() {
        let (store, rubric, kit) = setup();
        let acme = test_support::candidate(&store, &kit.id, "Acme");
        let service = EvaluationService::new(store, Arc::new(StubEvaluator));

        let ok = service
            .evaluate_request(EvaluationRequest {
                rubric_id: rubric.id.clone(),
                candidate_ids: vec![acme.id],
            })
            .await;
        assert!(ok.is_success());
        assert!(!ok.is_batch);
        assert!(ok.evaluation_id.is_some());

        let failed = service
            .evaluate_request(EvaluationRequest {
                rubric_id: rubric.id,
                candidate_ids: Vec::new(),
            })
            .await;
        assert!(!failed.is_success());
        assert_eq!(failed.error.as_deref(), Some("No candidate IDs provided"));
    }
}
