//! Axum route handlers.
//!
//! # Routes
//!
//! - `GET  /`, `/healthz`               liveness
//! - `GET  /settings`                   weight policy
//! - `/criteria`, `/rubrics`, `/decision-kits`, `/candidates` CRUD
//! - `/candidates/:id/materials`        multipart uploads
//! - `/candidates/evaluations`          stored evaluation results
//! - `POST /evaluation/evaluate`        run an evaluation

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use bytes::BytesMut;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::blob::MemoryBlobStore;
use crate::config::WeightSettings;
use crate::error::{Error, Result};
use crate::evaluation::{EvaluationService, Evaluator, StubEvaluator};
use crate::models::{
    AttachRubric, Candidate, CandidateCreate, CandidateMaterial, CandidateMaterialList,
    CandidateUpdate, Criteria, CriteriaCreate, CriteriaUpdate, DecisionKit, DecisionKitCreate,
    DecisionKitUpdateCandidates, EvaluationRequest, EvaluationResponse, EvaluationResult,
    EvaluationResultCreate, EvaluationResultList, EvaluationResultSummary, Rubric, RubricCreate,
    RubricUpdate,
};
use crate::store::{blocking, NewMaterial, Store, DEFAULT_LIST_LIMIT};

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub evaluation: Arc<EvaluationService>,
}

impl AppState {
    pub fn new(store: Arc<Store>, evaluator: Arc<dyn Evaluator>) -> Self {
        let evaluation = Arc::new(EvaluationService::new(store.clone(), evaluator));
        Self { store, evaluation }
    }

    /// In-memory database and blobs with the stub evaluator.
    pub fn in_memory() -> Result<Self> {
        let store = Store::in_memory(Arc::new(MemoryBlobStore::new()))?;
        Ok(Self::new(Arc::new(store), Arc::new(StubEvaluator)))
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    let body_limit = state.store.max_material_bytes() + MULTIPART_OVERHEAD;
    Router::new()
        .route("/", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/settings", get(settings_handler))
        // criteria
        .route("/criteria", get(list_criteria).post(create_criteria))
        .route(
            "/criteria/:id",
            get(get_criteria).put(update_criteria).delete(delete_criteria),
        )
        // rubrics
        .route("/rubrics", get(list_rubrics).post(create_rubric))
        .route(
            "/rubrics/:id",
            get(get_rubric).put(update_rubric).delete(delete_rubric),
        )
        .route("/rubrics/:id/publish", post(publish_rubric))
        .route("/rubrics/:id/evaluations", get(rubric_evaluations))
        // decision kits
        .route("/decision-kits", get(list_decision_kits).post(create_decision_kit))
        .route(
            "/decision-kits/:id",
            get(get_decision_kit).delete(delete_decision_kit),
        )
        .route("/decision-kits/:id/candidates", put(replace_kit_candidates))
        .route("/decision-kits/:id/rubric", put(attach_kit_rubric))
        .route("/decision-kits/:id/evaluate", post(evaluate_kit))
        // evaluation results
        .route(
            "/candidates/evaluations",
            get(list_evaluations).post(create_evaluation),
        )
        .route(
            "/candidates/evaluations/:eid",
            get(get_evaluation).delete(delete_evaluation),
        )
        // candidates
        .route("/candidates", get(list_candidates).post(create_candidate))
        .route(
            "/candidates/:id",
            get(get_candidate).put(update_candidate).delete(delete_candidate),
        )
        .route(
            "/candidates/:id/materials",
            get(list_materials).post(upload_material),
        )
        .route(
            "/candidates/:id/materials/:mid",
            get(get_material).delete(delete_material),
        )
        .route("/candidates/:id/evaluations", get(candidate_evaluations))
        // agent
        .route("/evaluation/evaluate", post(run_evaluation))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// GET / and /healthz
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "decision-kit",
    }))
}

/// GET /settings: the weight bounds clients should validate with.
async fn settings_handler(State(state): State<AppState>) -> Json<WeightSettings> {
    Json(WeightSettings::from(*state.store.policy()))
}

// ---------------------------------------------------------------------------
// Criteria
// ---------------------------------------------------------------------------

async fn list_criteria(State(state): State<AppState>) -> Result<Json<Vec<Criteria>>> {
    Ok(Json(blocking(&state.store, |s| s.list_criteria()).await?))
}

async fn get_criteria(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Criteria>> {
    Ok(Json(blocking(&state.store, move |s| s.get_criteria(&id)).await?))
}

async fn create_criteria(
    State(state): State<AppState>,
    Json(payload): Json<CriteriaCreate>,
) -> Result<(StatusCode, Json<Criteria>)> {
    let created = blocking(&state.store, move |s| s.create_criteria(payload)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_criteria(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CriteriaUpdate>,
) -> Result<Json<Criteria>> {
    Ok(Json(
        blocking(&state.store, move |s| s.update_criteria(&id, payload)).await?,
    ))
}

async fn delete_criteria(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    blocking(&state.store, move |s| s.delete_criteria(&id)).await?;
    Ok(success())
}

// ---------------------------------------------------------------------------
// Rubrics
// ---------------------------------------------------------------------------

async fn list_rubrics(State(state): State<AppState>) -> Result<Json<Vec<Rubric>>> {
    Ok(Json(blocking(&state.store, |s| s.list_rubrics()).await?))
}

async fn get_rubric(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Rubric>> {
    Ok(Json(blocking(&state.store, move |s| s.get_rubric(&id)).await?))
}

async fn create_rubric(
    State(state): State<AppState>,
    Json(payload): Json<RubricCreate>,
) -> Result<(StatusCode, Json<Rubric>)> {
    let created = blocking(&state.store, move |s| s.create_rubric(payload)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_rubric(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<RubricUpdate>,
) -> Result<Json<Rubric>> {
    Ok(Json(
        blocking(&state.store, move |s| s.update_rubric(&id, payload)).await?,
    ))
}

async fn publish_rubric(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Rubric>> {
    Ok(Json(blocking(&state.store, move |s| s.publish_rubric(&id)).await?))
}

async fn delete_rubric(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    blocking(&state.store, move |s| s.delete_rubric(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rubric_evaluations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EvaluationResultSummary>>> {
    Ok(Json(
        blocking(&state.store, move |s| s.list_evaluations_for_rubric(&id)).await?,
    ))
}

// ---------------------------------------------------------------------------
// Decision kits
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct NameFilter {
    name: Option<String>,
}

async fn list_decision_kits(
    State(state): State<AppState>,
    Query(filter): Query<NameFilter>,
) -> Result<Json<Vec<DecisionKit>>> {
    Ok(Json(
        blocking(&state.store, move |s| s.list_decision_kits(filter.name.as_deref())).await?,
    ))
}

async fn get_decision_kit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DecisionKit>> {
    Ok(Json(
        blocking(&state.store, move |s| s.get_decision_kit(&id)).await?,
    ))
}

async fn create_decision_kit(
    State(state): State<AppState>,
    Json(payload): Json<DecisionKitCreate>,
) -> Result<(StatusCode, Json<DecisionKit>)> {
    let created = blocking(&state.store, move |s| s.create_decision_kit(payload)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn replace_kit_candidates(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<DecisionKitUpdateCandidates>,
) -> Result<Json<DecisionKit>> {
    Ok(Json(
        blocking(&state.store, move |s| {
            s.replace_decision_kit_candidates(&id, &payload.candidate_ids)
        })
        .await?,
    ))
}

async fn attach_kit_rubric(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<AttachRubric>,
) -> Result<Json<DecisionKit>> {
    Ok(Json(
        blocking(&state.store, move |s| s.attach_rubric(&id, &payload.rubric_id)).await?,
    ))
}

async fn evaluate_kit(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<DecisionKit>> {
    Ok(Json(state.evaluation.evaluate_kit(&id).await?))
}

async fn delete_decision_kit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    blocking(&state.store, move |s| s.delete_decision_kit(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

async fn list_candidates(State(state): State<AppState>) -> Result<Json<Vec<Candidate>>> {
    Ok(Json(blocking(&state.store, |s| s.list_candidates()).await?))
}

async fn get_candidate(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Candidate>> {
    Ok(Json(blocking(&state.store, move |s| s.get_candidate(&id)).await?))
}

async fn create_candidate(
    State(state): State<AppState>,
    Json(payload): Json<CandidateCreate>,
) -> Result<(StatusCode, Json<Candidate>)> {
    let created = blocking(&state.store, move |s| s.create_candidate(payload)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CandidateUpdate>,
) -> Result<Json<Candidate>> {
    Ok(Json(
        blocking(&state.store, move |s| s.update_candidate(&id, payload)).await?,
    ))
}

async fn delete_candidate(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    blocking(&state.store, move |s| s.delete_candidate(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn candidate_evaluations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EvaluationResultSummary>>> {
    Ok(Json(
        blocking(&state.store, move |s| s.list_evaluations_for_candidate(&id)).await?,
    ))
}

// ---------------------------------------------------------------------------
// Materials
// ---------------------------------------------------------------------------

async fn list_materials(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CandidateMaterialList>> {
    Ok(Json(blocking(&state.store, move |s| s.list_materials(&id)).await?))
}

async fn get_material(
    State(state): State<AppState>,
    Path((id, mid)): Path<(String, String)>,
) -> Result<Json<CandidateMaterial>> {
    Ok(Json(
        blocking(&state.store, move |s| s.get_material(&id, &mid)).await?,
    ))
}

fn too_large() -> Error {
    Error::BadRequest("File exceeds max size".to_string())
}

/// A body cut off by [`DefaultBodyLimit`] reports the size error.
fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large();
    }
    Error::BadRequest(format!("Invalid multipart body: {}", e))
}

/// POST /candidates/:id/materials: multipart form with a `file` field.
async fn upload_material(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CandidateMaterial>)> {
    let max = state.store.max_material_bytes();
    let mut upload = None;
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("file").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if buf.len() + chunk.len() > max {
                return Err(too_large());
            }
            buf.extend_from_slice(&chunk);
        }
        upload = Some(NewMaterial {
            filename,
            content_type,
            bytes: buf.freeze(),
        });
        break;
    }
    let upload = upload.ok_or_else(|| Error::BadRequest("Missing file field".to_string()))?;

    let created = blocking(&state.store, move |s| s.create_material(&id, upload)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_material(
    State(state): State<AppState>,
    Path((id, mid)): Path<(String, String)>,
) -> Result<Json<Value>> {
    blocking(&state.store, move |s| s.delete_material(&id, &mid)).await?;
    Ok(success())
}

// ---------------------------------------------------------------------------
// Evaluation results
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct Page {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_evaluations(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<EvaluationResultList>> {
    let limit = page.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = page.offset.unwrap_or(0);
    Ok(Json(
        blocking(&state.store, move |s| s.list_evaluations(limit, offset)).await?,
    ))
}

async fn get_evaluation(
    State(state): State<AppState>,
    Path(eid): Path<String>,
) -> Result<Json<EvaluationResult>> {
    Ok(Json(blocking(&state.store, move |s| s.get_evaluation(&eid)).await?))
}

async fn create_evaluation(
    State(state): State<AppState>,
    Json(payload): Json<EvaluationResultCreate>,
) -> Result<(StatusCode, Json<EvaluationResult>)> {
    let created = blocking(&state.store, move |s| s.create_evaluation(payload)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_evaluation(State(state): State<AppState>, Path(eid): Path<String>) -> Result<Json<Value>> {
    blocking(&state.store, move |s| s.delete_evaluation(&eid)).await?;
    Ok(success())
}

/// POST /evaluation/evaluate: always 200, failures are reported in the body.
async fn run_evaluation(
    State(state): State<AppState>,
    Json(request): Json<EvaluationRequest>,
) -> Json<EvaluationResponse> {
    Json(state.evaluation.evaluate_request(request).await)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
