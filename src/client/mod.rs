//! Typed HTTP client for the decision-kit API.
//!
//! [`ApiClient`] wraps every REST endpoint, checks arguments before sending,
//! and keeps the caches from [`cache`] in step with its own writes.
//! [`AgentClient`] talks to the evaluation endpoint, which is slower and gets
//! a longer timeout.

pub mod cache;
pub mod enrich;
pub mod lists;

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::{resolve_api_base, WeightSettings};
use crate::evaluation::normalize::{candidate_breakdown, select_latest, CriterionScoreView};
use crate::models::{
    AttachRubric, Candidate, CandidateCreate, CandidateMaterial, CandidateMaterialList,
    CandidateUpdate, Criteria, CriteriaCreate, CriteriaUpdate, DecisionKit, DecisionKitCreate,
    DecisionKitUpdateCandidates, EvaluationRequest, EvaluationResponse, EvaluationResult,
    EvaluationResultCreate, EvaluationResultList, EvaluationResultSummary, Rubric, RubricCreate,
    RubricUpdate,
};

use self::cache::{EntityCache, ListCache, TtlCache};

pub use self::enrich::{enrich_entries, enrich_rubric};
pub use self::lists::{add_to_list, remove_from_list, replace_in_list};

/// Request timeout for CRUD calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
/// Request timeout for evaluation calls.
pub const AGENT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-success status.
    #[error("{detail} (HTTP {status})")]
    Api { status: u16, detail: String },

    /// The entity can no longer be changed (HTTP 409 on delete).
    #[error("{0}")]
    Locked(String),

    /// Rejected before any request was sent.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

fn require_id<'a>(what: &str, id: &'a str) -> ClientResult<&'a str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ClientError::InvalidArgument(format!("{} id is required", what)));
    }
    Ok(id)
}

fn require_name(name: &str) -> ClientResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ClientError::InvalidArgument("Name is required".to_string()));
    }
    Ok(name.to_string())
}

/// Human-readable message from an error body: `detail` as a string, or
/// `detail.message` for structured validation errors.
fn detail_message(body: &Value) -> Option<String> {
    match body.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        other => Some(other.to_string()),
    }
}

fn build_http(timeout: Duration) -> ClientResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

async fn check(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| detail_message(&v))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                body
            }
        });
    Err(ClientError::Api {
        status: status.as_u16(),
        detail,
    })
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> ClientResult<T> {
    let response = check(request.send().await?).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

async fn send_empty(request: RequestBuilder) -> ClientResult<()> {
    check(request.send().await?).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    kits: EntityCache<DecisionKit>,
    rubrics: EntityCache<Rubric>,
    criteria: EntityCache<Criteria>,
    criteria_list: ListCache<Criteria>,
    candidate_evaluations: TtlCache<Vec<EvaluationResultSummary>>,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> ClientResult<Self> {
        Ok(Self {
            http: build_http(DEFAULT_TIMEOUT)?,
            base: base.into().trim_end_matches('/').to_string(),
            kits: EntityCache::new(),
            rubrics: EntityCache::new(),
            criteria: EntityCache::new(),
            criteria_list: ListCache::new(),
            candidate_evaluations: TtlCache::default(),
        })
    }

    /// Client for the base URL found in the environment.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(resolve_api_base())
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Drop every cached entity.
    pub fn clear_caches(&self) {
        self.kits.clear();
        self.rubrics.clear();
        self.criteria.clear();
        self.criteria_list.invalidate();
        self.candidate_evaluations.clear();
    }

    pub async fn health(&self) -> ClientResult<Value> {
        send_json(self.http.get(self.url("/healthz"))).await
    }

    pub async fn settings(&self) -> ClientResult<WeightSettings> {
        send_json(self.http.get(self.url("/settings"))).await
    }

    // -- criteria ----------------------------------------------------------

    /// All criteria. Served from cache unless `force` is set.
    pub async fn list_criteria(&self, force: bool) -> ClientResult<Vec<Criteria>> {
        let items = self
            .criteria_list
            .get_or_fetch(force, || send_json(self.http.get(self.url("/criteria"))))
            .await?;
        self.criteria.prime_all(&items);
        Ok(items)
    }

    pub async fn get_criteria(&self, id: &str) -> ClientResult<Criteria> {
        let id = require_id("Criteria", id)?;
        if let Some(hit) = self.criteria.get(id) {
            return Ok(hit);
        }
        let criteria: Criteria = send_json(self.http.get(self.url(&format!("/criteria/{}", id)))).await?;
        self.criteria.prime(&criteria);
        Ok(criteria)
    }

    pub async fn create_criteria(&self, mut payload: CriteriaCreate) -> ClientResult<Criteria> {
        payload.name = require_name(&payload.name)?;
        let created: Criteria =
            send_json(self.http.post(self.url("/criteria")).json(&payload)).await?;
        self.criteria.prime(&created);
        self.criteria_list.invalidate();
        Ok(created)
    }

    pub async fn update_criteria(&self, id: &str, payload: CriteriaUpdate) -> ClientResult<Criteria> {
        let id = require_id("Criteria", id)?;
        let updated: Criteria = send_json(
            self.http
                .put(self.url(&format!("/criteria/{}", id)))
                .json(&payload),
        )
        .await?;
        self.criteria.prime(&updated);
        self.criteria_list.invalidate();
        // cached rubrics carry the old criteria text
        self.rubrics.clear();
        Ok(updated)
    }

    pub async fn delete_criteria(&self, id: &str) -> ClientResult<()> {
        let id = require_id("Criteria", id)?;
        send_empty(self.http.delete(self.url(&format!("/criteria/{}", id)))).await?;
        self.criteria.invalidate(id);
        self.criteria_list.invalidate();
        self.rubrics.clear();
        Ok(())
    }

    // -- rubrics -----------------------------------------------------------

    pub async fn list_rubrics(&self) -> ClientResult<Vec<Rubric>> {
        let rubrics: Vec<Rubric> = send_json(self.http.get(self.url("/rubrics"))).await?;
        self.rubrics.prime_all(&rubrics);
        Ok(rubrics)
    }

    pub async fn get_rubric(&self, id: &str) -> ClientResult<Rubric> {
        let id = require_id("Rubric", id)?;
        if let Some(hit) = self.rubrics.get(id) {
            return Ok(hit);
        }
        let rubric: Rubric = send_json(self.http.get(self.url(&format!("/rubrics/{}", id)))).await?;
        self.rubrics.prime(&rubric);
        Ok(rubric)
    }

    /// Rubric with entry text filled from the criteria list.
    pub async fn get_rubric_enriched(&self, id: &str) -> ClientResult<Rubric> {
        let mut rubric = self.get_rubric(id).await?;
        let criteria = self.list_criteria(false).await?;
        enrich_rubric(&mut rubric, &criteria);
        Ok(rubric)
    }

    pub async fn create_rubric(&self, mut payload: RubricCreate) -> ClientResult<Rubric> {
        payload.name = require_name(&payload.name)?;
        let created: Rubric = send_json(self.http.post(self.url("/rubrics")).json(&payload)).await?;
        self.rubrics.prime(&created);
        // inline criteria may have been created
        self.criteria_list.invalidate();
        Ok(created)
    }

    pub async fn update_rubric(&self, id: &str, payload: RubricUpdate) -> ClientResult<Rubric> {
        let id = require_id("Rubric", id)?;
        let updated: Rubric = send_json(
            self.http
                .put(self.url(&format!("/rubrics/{}", id)))
                .json(&payload),
        )
        .await?;
        self.rubrics.prime(&updated);
        self.criteria_list.invalidate();
        Ok(updated)
    }

    pub async fn publish_rubric(&self, id: &str) -> ClientResult<Rubric> {
        let id = require_id("Rubric", id)?;
        let published: Rubric =
            send_json(self.http.post(self.url(&format!("/rubrics/{}/publish", id)))).await?;
        self.rubrics.prime(&published);
        Ok(published)
    }

    pub async fn delete_rubric(&self, id: &str) -> ClientResult<()> {
        let id = require_id("Rubric", id)?;
        send_empty(self.http.delete(self.url(&format!("/rubrics/{}", id)))).await?;
        self.rubrics.invalidate(id);
        Ok(())
    }

    pub async fn rubric_evaluations(&self, id: &str) -> ClientResult<Vec<EvaluationResultSummary>> {
        let id = require_id("Rubric", id)?;
        send_json(self.http.get(self.url(&format!("/rubrics/{}/evaluations", id)))).await
    }

    // -- decision kits -----------------------------------------------------

    pub async fn list_decision_kits(&self, name: Option<&str>) -> ClientResult<Vec<DecisionKit>> {
        let mut request = self.http.get(self.url("/decision-kits"));
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            request = request.query(&[("name", name)]);
        }
        let kits: Vec<DecisionKit> = send_json(request).await?;
        self.kits.prime_all(&kits);
        Ok(kits)
    }

    pub async fn get_decision_kit(&self, id: &str) -> ClientResult<DecisionKit> {
        let id = require_id("Decision kit", id)?;
        if let Some(hit) = self.kits.get(id) {
            return Ok(hit);
        }
        let kit: DecisionKit =
            send_json(self.http.get(self.url(&format!("/decision-kits/{}", id)))).await?;
        self.kits.prime(&kit);
        Ok(kit)
    }

    pub async fn create_decision_kit(&self, mut payload: DecisionKitCreate) -> ClientResult<DecisionKit> {
        payload.name = require_name(&payload.name)?;
        payload.rubric_id = require_id("Rubric", &payload.rubric_id)?.to_string();
        let created: DecisionKit =
            send_json(self.http.post(self.url("/decision-kits")).json(&payload)).await?;
        self.kits.prime(&created);
        Ok(created)
    }

    pub async fn replace_decision_kit_candidates(
        &self,
        id: &str,
        candidate_ids: Vec<String>,
    ) -> ClientResult<DecisionKit> {
        let id = require_id("Decision kit", id)?;
        let updated: DecisionKit = send_json(
            self.http
                .put(self.url(&format!("/decision-kits/{}/candidates", id)))
                .json(&DecisionKitUpdateCandidates { candidate_ids }),
        )
        .await?;
        self.kits.prime(&updated);
        Ok(updated)
    }

    pub async fn attach_rubric(&self, id: &str, rubric_id: &str) -> ClientResult<DecisionKit> {
        let id = require_id("Decision kit", id)?;
        let rubric_id = require_id("Rubric", rubric_id)?.to_string();
        let updated: DecisionKit = send_json(
            self.http
                .put(self.url(&format!("/decision-kits/{}/rubric", id)))
                .json(&AttachRubric { rubric_id }),
        )
        .await?;
        self.kits.prime(&updated);
        Ok(updated)
    }

    pub async fn evaluate_decision_kit(&self, id: &str) -> ClientResult<DecisionKit> {
        let id = require_id("Decision kit", id)?;
        let evaluated: DecisionKit =
            send_json(self.http.post(self.url(&format!("/decision-kits/{}/evaluate", id)))).await?;
        for candidate in &evaluated.candidates {
            self.candidate_evaluations.invalidate(&candidate.candidate_id);
        }
        self.kits.prime(&evaluated);
        Ok(evaluated)
    }

    /// Delete a kit. A kit that is already gone counts as deleted; a kit
    /// that can no longer change is reported as [`ClientError::Locked`].
    pub async fn delete_decision_kit(&self, id: &str) -> ClientResult<()> {
        let id = require_id("Decision kit", id)?;
        let outcome = send_empty(self.http.delete(self.url(&format!("/decision-kits/{}", id)))).await;
        match outcome {
            Ok(()) => {}
            Err(ClientError::Api { status: 404, .. }) => {
                tracing::debug!(id, "decision kit already deleted");
            }
            Err(ClientError::Api { status: 409, detail }) => return Err(ClientError::Locked(detail)),
            Err(e) => return Err(e),
        }
        self.kits.invalidate(id);
        Ok(())
    }

    /// [`delete_decision_kit`](Self::delete_decision_kit), then drop the kit
    /// from a local list.
    pub async fn delete_decision_kit_from(&self, list: &mut Vec<DecisionKit>, id: &str) -> ClientResult<()> {
        self.delete_decision_kit(id).await?;
        remove_from_list(list, id);
        Ok(())
    }

    // -- candidates --------------------------------------------------------

    pub async fn list_candidates(&self) -> ClientResult<Vec<Candidate>> {
        send_json(self.http.get(self.url("/candidates"))).await
    }

    pub async fn get_candidate(&self, id: &str) -> ClientResult<Candidate> {
        let id = require_id("Candidate", id)?;
        send_json(self.http.get(self.url(&format!("/candidates/{}", id)))).await
    }

    pub async fn create_candidate(&self, mut payload: CandidateCreate) -> ClientResult<Candidate> {
        payload.name = require_name(&payload.name)?;
        payload.decision_kit_id = require_id("Decision kit", &payload.decision_kit_id)?.to_string();
        let created: Candidate =
            send_json(self.http.post(self.url("/candidates")).json(&payload)).await?;
        // the kit's candidate list changed
        self.kits.invalidate(&payload.decision_kit_id);
        Ok(created)
    }

    pub async fn update_candidate(&self, id: &str, mut payload: CandidateUpdate) -> ClientResult<Candidate> {
        let id = require_id("Candidate", id)?;
        payload.name = require_name(&payload.name)?;
        let updated: Candidate = send_json(
            self.http
                .put(self.url(&format!("/candidates/{}", id)))
                .json(&payload),
        )
        .await?;
        // cached kits carry the old candidate name
        self.kits.clear();
        Ok(updated)
    }

    pub async fn delete_candidate(&self, id: &str) -> ClientResult<()> {
        let id = require_id("Candidate", id)?;
        send_empty(self.http.delete(self.url(&format!("/candidates/{}", id)))).await?;
        self.kits.clear();
        self.candidate_evaluations.invalidate(id);
        Ok(())
    }

    // -- materials ---------------------------------------------------------

    pub async fn list_materials(&self, candidate_id: &str) -> ClientResult<CandidateMaterialList> {
        let cid = require_id("Candidate", candidate_id)?;
        send_json(self.http.get(self.url(&format!("/candidates/{}/materials", cid)))).await
    }

    pub async fn upload_material(
        &self,
        candidate_id: &str,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> ClientResult<CandidateMaterial> {
        let cid = require_id("Candidate", candidate_id)?;
        if bytes.is_empty() {
            return Err(ClientError::InvalidArgument("Empty file".to_string()));
        }
        let mut part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        if !content_type.trim().is_empty() {
            part = part.mime_str(content_type)?;
        }
        let form = reqwest::multipart::Form::new().part("file", part);
        send_json(
            self.http
                .post(self.url(&format!("/candidates/{}/materials", cid)))
                .multipart(form),
        )
        .await
    }

    pub async fn delete_material(&self, candidate_id: &str, material_id: &str) -> ClientResult<()> {
        let cid = require_id("Candidate", candidate_id)?;
        let mid = require_id("Material", material_id)?;
        send_empty(
            self.http
                .delete(self.url(&format!("/candidates/{}/materials/{}", cid, mid))),
        )
        .await
    }

    // -- evaluations -------------------------------------------------------

    pub async fn list_evaluations(&self, limit: usize, offset: usize) -> ClientResult<EvaluationResultList> {
        send_json(
            self.http
                .get(self.url("/candidates/evaluations"))
                .query(&[("limit", limit), ("offset", offset)]),
        )
        .await
    }

    pub async fn get_evaluation(&self, id: &str) -> ClientResult<EvaluationResult> {
        let id = require_id("Evaluation", id)?;
        send_json(self.http.get(self.url(&format!("/candidates/evaluations/{}", id)))).await
    }

    pub async fn create_evaluation(&self, payload: EvaluationResultCreate) -> ClientResult<EvaluationResult> {
        if payload.candidate_ids.is_empty() {
            return Err(ClientError::InvalidArgument(
                "At least one candidate id is required".to_string(),
            ));
        }
        let created: EvaluationResult = send_json(
            self.http
                .post(self.url("/candidates/evaluations"))
                .json(&payload),
        )
        .await?;
        for cid in &payload.candidate_ids {
            self.candidate_evaluations.invalidate(cid);
        }
        Ok(created)
    }

    pub async fn delete_evaluation(&self, id: &str) -> ClientResult<()> {
        let id = require_id("Evaluation", id)?;
        send_empty(self.http.delete(self.url(&format!("/candidates/evaluations/{}", id)))).await?;
        self.candidate_evaluations.clear();
        Ok(())
    }

    /// Evaluation summaries for a candidate, cached for a minute.
    pub async fn candidate_evaluations(
        &self,
        candidate_id: &str,
        force: bool,
    ) -> ClientResult<Vec<EvaluationResultSummary>> {
        let cid = require_id("Candidate", candidate_id)?;
        if !force {
            if let Some(hit) = self.candidate_evaluations.get(cid) {
                return Ok(hit);
            }
        }
        let summaries: Vec<EvaluationResultSummary> =
            send_json(self.http.get(self.url(&format!("/candidates/{}/evaluations", cid)))).await?;
        self.candidate_evaluations.insert(cid, summaries.clone());
        Ok(summaries)
    }

    pub fn invalidate_candidate_evaluations(&self, candidate_id: &str) {
        self.candidate_evaluations.invalidate(candidate_id);
    }

    /// Most recent full evaluation a candidate took part in.
    pub async fn latest_candidate_evaluation(
        &self,
        candidate_id: &str,
    ) -> ClientResult<Option<EvaluationResult>> {
        let summaries = self.candidate_evaluations(candidate_id, false).await?;
        match select_latest(&summaries) {
            Some(latest) => Ok(Some(self.get_evaluation(&latest.id).await?)),
            None => Ok(None),
        }
    }

    /// Per-criterion rows of a candidate's latest evaluation.
    pub async fn candidate_criteria_breakdown(
        &self,
        candidate_id: &str,
    ) -> ClientResult<Vec<CriterionScoreView>> {
        let latest = self.latest_candidate_evaluation(candidate_id).await?;
        Ok(latest
            .map(|evaluation| candidate_breakdown(&evaluation, candidate_id.trim()))
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// AgentClient
// ---------------------------------------------------------------------------

/// Client for `POST /evaluation/evaluate`.
pub struct AgentClient {
    http: reqwest::Client,
    base: String,
}

impl AgentClient {
    pub fn new(base: impl Into<String>) -> ClientResult<Self> {
        Ok(Self {
            http: build_http(AGENT_TIMEOUT)?,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(resolve_api_base())
    }

    /// Ask the service to evaluate candidates. A reply with
    /// `status: "error"` is returned as-is, not as an `Err`.
    pub async fn evaluate_candidates(
        &self,
        rubric_id: &str,
        candidate_ids: &[String],
    ) -> ClientResult<EvaluationResponse> {
        let rubric_id = require_id("Rubric", rubric_id)?.to_string();
        if candidate_ids.is_empty() {
            return Err(ClientError::InvalidArgument(
                "No candidate IDs provided".to_string(),
            ));
        }
        let request = EvaluationRequest {
            rubric_id,
            candidate_ids: candidate_ids.to_vec(),
        };
        let response: EvaluationResponse = send_json(
            self.http
                .post(format!("{}/evaluation/evaluate", self.base))
                .json(&request),
        )
        .await?;
        if !response.is_success() {
            tracing::warn!(error = ?response.error, "evaluation rejected");
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{app_router, AppState};
    use serde_json::json;

    async fn serve() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = app_router(AppState::in_memory().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn rubric_payload(name: &str) -> RubricCreate {
        serde_json::from_value(json!({
            "name": name,
            "description": "Vendor scoring",
            "criteria": [
                {"name": "Speed", "description": "Delivery speed", "definition": "5 = same day", "weight": 0.5},
                {"name": "Cost", "weight": 0.5}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_detail_message() {
        assert_eq!(
            detail_message(&json!({"detail": "Rubric not found"})).as_deref(),
            Some("Rubric not found")
        );
        assert_eq!(
            detail_message(&json!({"detail": {"error": "INVALID_WEIGHT", "message": "bad weight"}}))
                .as_deref(),
            Some("bad weight")
        );
        assert_eq!(detail_message(&json!({"error": "x"})), None);
    }

    #[tokio::test]
    async fn test_arguments_checked_before_sending() {
        // nothing listens here; an argument error must come first
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            client.get_rubric("  ").await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            client
                .create_candidate(CandidateCreate {
                    name: "   ".into(),
                    description: None,
                    decision_kit_id: "k1".into(),
                })
                .await,
            Err(ClientError::InvalidArgument(_))
        ));
        let agent = AgentClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            agent.evaluate_candidates("r1", &[]).await,
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_round_trip_against_server() {
        let base = serve().await;
        let client = ApiClient::new(format!("{}/", base)).unwrap();
        assert_eq!(client.base_url(), base);

        let rubric = client.create_rubric(rubric_payload("  Vendor Fit ")).await.unwrap();
        assert_eq!(rubric.name, "Vendor Fit");

        let kit = client
            .create_decision_kit(DecisionKitCreate {
                name: "Q3 Vendors".into(),
                description: None,
                rubric_id: rubric.id.clone(),
                candidate_ids: Vec::new(),
            })
            .await
            .unwrap();
        let mut kits = client.list_decision_kits(Some("q3")).await.unwrap();
        assert_eq!(kits.len(), 1);

        let acme = client
            .create_candidate(CandidateCreate {
                name: "Acme".into(),
                description: None,
                decision_kit_id: kit.id.clone(),
            })
            .await
            .unwrap();
        let fresh = client.get_decision_kit(&kit.id).await.unwrap();
        assert_eq!(fresh.candidates.len(), 1);

        let material = client
            .upload_material(&acme.id, "pitch.txt", "text/plain", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(material.size_bytes, 5);
        assert_eq!(client.list_materials(&acme.id).await.unwrap().total, 1);

        let agent = AgentClient::new(&base).unwrap();
        let response = agent
            .evaluate_candidates(&rubric.id, &[acme.id.clone()])
            .await
            .unwrap();
        assert!(response.is_success());

        let breakdown = client.candidate_criteria_breakdown(&acme.id).await.unwrap();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].score, Some(3.0));

        let err = client.get_rubric("missing").await.unwrap_err();
        assert!(err.is_not_found());

        client.delete_decision_kit_from(&mut kits, &kit.id).await.unwrap();
        assert!(kits.is_empty());
        // already gone
        client.delete_decision_kit(&kit.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_evaluated_kit_is_locked() {
        let base = serve().await;
        let client = ApiClient::new(base).unwrap();
        let rubric = client.create_rubric(rubric_payload("Vendor Fit")).await.unwrap();
        let kit = client
            .create_decision_kit(DecisionKitCreate {
                name: "Locked Kit".into(),
                description: None,
                rubric_id: rubric.id.clone(),
                candidate_ids: Vec::new(),
            })
            .await
            .unwrap();
        client
            .create_candidate(CandidateCreate {
                name: "Acme".into(),
                description: None,
                decision_kit_id: kit.id.clone(),
            })
            .await
            .unwrap();
        let evaluated = client.evaluate_decision_kit(&kit.id).await.unwrap();
        assert!(evaluated.evaluation_id.is_some());

        assert!(matches!(
            client.delete_decision_kit(&kit.id).await,
            Err(ClientError::Locked(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_refresh_dependent_caches() {
        let base = serve().await;
        let client = ApiClient::new(base).unwrap();
        let rubric = client.create_rubric(rubric_payload("Vendor Fit")).await.unwrap();
        let kit = client
            .create_decision_kit(DecisionKitCreate {
                name: "Q4 Vendors".into(),
                description: None,
                rubric_id: rubric.id.clone(),
                candidate_ids: Vec::new(),
            })
            .await
            .unwrap();
        assert!(client.get_decision_kit(&kit.id).await.unwrap().candidates.is_empty());

        client
            .create_candidate(CandidateCreate {
                name: "Acme".into(),
                description: None,
                decision_kit_id: format!("  {} ", kit.id),
            })
            .await
            .unwrap();
        assert_eq!(client.get_decision_kit(&kit.id).await.unwrap().candidates.len(), 1);

        let cached = client.get_rubric(&rubric.id).await.unwrap();
        let speed_id = cached.criteria[0].criteria_id.clone();
        client
            .update_criteria(
                &speed_id,
                CriteriaUpdate {
                    name: Some("Velocity".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let reloaded = client.get_rubric(&rubric.id).await.unwrap();
        assert_eq!(reloaded.criteria[0].name.as_deref(), Some("Velocity"));

        let err = client.delete_criteria(&speed_id).await.unwrap_err();
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn test_enriched_rubric() {
        let base = serve().await;
        let client = ApiClient::new(base).unwrap();
        let rubric = client.create_rubric(rubric_payload("Vendor Fit")).await.unwrap();
        client.clear_caches();

        let enriched = client.get_rubric_enriched(&rubric.id).await.unwrap();
        let speed = enriched
            .criteria
            .iter()
            .find(|c| c.name.as_deref() == Some("Speed"))
            .unwrap();
        assert_eq!(speed.definition.as_deref(), Some("5 = same day"));
        assert_eq!(client.list_criteria(false).await.unwrap().len(), 2);
    }
}
