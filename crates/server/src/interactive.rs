//! Interactive assessment endpoints.
//!
//! - `POST /v1/interactive/assess`: read a plan, infer trades, generate the
//!   question set and persist `QUESTIONS.json` and `ASSESS_RESPONSE.json`.
//! - `POST /v1/interactive/qna`: merge answers into the stored question set
//!   and persist `QNA_RESPONSE.json`.
//! - `GET /v1/interactive/{project_id}`: stored question set and last round.
//! - `DELETE /v1/interactive/{project_id}`: remove the project's artifacts.
//!
//! Every artifact is written before the response is returned.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;
use chrono::Utc;
use estimator_core::interactive::plan::{AssessRequest, PlanDocument};
use estimator_core::{
    AnswerSubmission, AssessResponse, ProjectId, QnaResponse, QuestionSet, WorkflowError,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{json_response, parse_json, ApiError, InRequest, RequestId};
use crate::bootstrap::AppState;
use crate::store::{ASSESS_RESPONSE_FILE, QNA_RESPONSE_FILE, QUESTIONS_FILE};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct QnaRequest {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub answers: Vec<AnswerSubmission>,
}

/// Contents of `QNA_RESPONSE.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredQna {
    #[serde(flatten)]
    pub response: QnaResponse,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractiveState {
    pub project_id: String,
    pub question_set: QuestionSet,
    pub assessment: Option<AssessResponse>,
    pub last_qna: Option<StoredQna>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub project_id: String,
    pub removed: bool,
}

pub async fn assess(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: AssessRequest = parse_json(&body).in_request(&request_id)?;
    let project_id = ProjectId::parse(&request.project_id).in_request(&request_id)?;
    let source = request.plan_source().in_request(&request_id)?;

    let document = tokio::task::spawn_blocking(move || PlanDocument::load(source))
        .await
        .map_err(|error| WorkflowError::Internal(format!("plan reader panicked: {error}")))
        .in_request(&request_id)?
        .in_request(&request_id)?;

    let assessment = state.engine.assess(&project_id, &document);
    let store = &state.store;
    let questions_path = store
        .write_json(&project_id, QUESTIONS_FILE, &assessment.question_set())
        .await
        .in_request(&request_id)?;
    store.remove_artifact(&project_id, QNA_RESPONSE_FILE).await.in_request(&request_id)?;

    let response = AssessResponse {
        project_id: project_id.to_string(),
        coverage_score: assessment.coverage_score,
        trades_inferred: assessment.trades_inferred,
        questions_ref: questions_path.display().to_string(),
        request_id: request_id.clone(),
        questions: assessment.questions,
        signals: assessment.signals,
        plan_digest: Some(assessment.plan_digest),
    };
    store.write_json(&project_id, ASSESS_RESPONSE_FILE, &response).await.in_request(&request_id)?;

    info!(
        event_name = "interactive.assess.completed",
        request_id = %request_id,
        project_id = %project_id,
        coverage_score = response.coverage_score,
        trades = response.trades_inferred.len(),
        questions = response.questions.len(),
        "plan assessed"
    );
    Ok(json_response(&request_id, response))
}

pub async fn qna(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: QnaRequest = parse_json(&body).in_request(&request_id)?;
    let project_id = ProjectId::parse(&request.project_id).in_request(&request_id)?;
    estimator_core::domain::question::validate_answers(&request.answers).in_request(&request_id)?;

    let store = &state.store;
    let Some(question_set) = store
        .read_json::<QuestionSet>(&project_id, QUESTIONS_FILE)
        .await
        .in_request(&request_id)?
    else {
        return Err(ApiError::new(
            WorkflowError::validation(format!(
                "project `{project_id}` has not been assessed; call /v1/interactive/assess first"
            )),
            &request_id,
        ));
    };
    let previous = store
        .read_json::<StoredQna>(&project_id, QNA_RESPONSE_FILE)
        .await
        .in_request(&request_id)?
        .map(|stored| stored.response.answered)
        .unwrap_or_default();

    let round = state
        .engine
        .merge_answers(&question_set, &previous, &request.answers)
        .in_request(&request_id)?;

    let response = QnaResponse {
        project_id: project_id.to_string(),
        total_answered: round.answered.len(),
        total_questions: round.total_questions,
        answered: round.answered,
        next_questions: round.next_questions,
        completion_status: round.completion_status,
        applied_overlays: round.applied_overlays,
        request_id: request_id.clone(),
    };
    let stored = StoredQna { response, updated_at: Utc::now().to_rfc3339() };
    store.write_json(&project_id, QNA_RESPONSE_FILE, &stored).await.in_request(&request_id)?;

    info!(
        event_name = "interactive.qna.completed",
        request_id = %request_id,
        project_id = %project_id,
        total_answered = stored.response.total_answered,
        remaining = stored.response.next_questions.len(),
        overlays = stored.response.applied_overlays.len(),
        "answers merged"
    );
    Ok(json_response(&request_id, stored.response))
}

pub async fn project_state(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Path(raw_project_id): Path<String>,
) -> Result<Response, ApiError> {
    let project_id = ProjectId::parse(&raw_project_id).in_request(&request_id)?;
    let store = &state.store;
    let question_set = store
        .read_json::<QuestionSet>(&project_id, QUESTIONS_FILE)
        .await
        .in_request(&request_id)?
        .ok_or_else(|| WorkflowError::not_found(project_id.as_str()))
        .in_request(&request_id)?;

    let body = InteractiveState {
        project_id: project_id.to_string(),
        question_set,
        assessment: store
            .read_json(&project_id, ASSESS_RESPONSE_FILE)
            .await
            .in_request(&request_id)?,
        last_qna: store.read_json(&project_id, QNA_RESPONSE_FILE).await.in_request(&request_id)?,
    };
    Ok(json_response(&request_id, body))
}

pub async fn cleanup(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Path(raw_project_id): Path<String>,
) -> Result<Response, ApiError> {
    let project_id = ProjectId::parse(&raw_project_id).in_request(&request_id)?;
    if !state.store.remove_project(&project_id).await.in_request(&request_id)? {
        return Err(ApiError::new(WorkflowError::not_found(project_id.as_str()), &request_id));
    }

    info!(
        event_name = "interactive.project.removed",
        request_id = %request_id,
        project_id = %project_id,
        "interactive state removed"
    );
    let body = CleanupResponse { project_id: project_id.to_string(), removed: true };
    Ok(json_response(&request_id, body))
}
