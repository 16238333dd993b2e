use std::path::PathBuf;

use estimator_core::domain::estimate::{EstimateOptions, QuantityEstimateRequest};
use estimator_core::domain::question::{validate_answers, CompletionStatus};
use estimator_core::interactive::plan::PlanSource;
use estimator_core::{
    AnswerSubmission, AnsweredQuestion, AppliedOverlay, AssessResponse, NormalizedEstimate,
    ProgramRequest, ProjectId, QnaResponse, QuantitiesInput, Question, RemoteServiceError,
    Severity, TakeoffResult, WorkflowError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::service::{EstimationService, FileUpload, ServiceResponse};
use crate::session::ProjectSession;

pub const HEALTH_PATH: &str = "/health";
pub const TAKEOFF_UPLOAD_PATH: &str = "/takeoff";
pub const TAKEOFF_PATH: &str = "/v1/takeoff";
pub const PROGRAM_ESTIMATE_PATH: &str = "/estimate";
pub const ESTIMATE_PATH: &str = "/v1/estimate";
pub const ASSESS_PATH: &str = "/v1/interactive/assess";
pub const QNA_PATH: &str = "/v1/interactive/qna";

pub fn interactive_state_path(project_id: &ProjectId) -> String {
    format!("/v1/interactive/{project_id}")
}

/// A plan as the caller holds it: file bytes to upload, or a path the
/// service can read itself.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanInput {
    File { file_name: String, bytes: Vec<u8> },
    ServerPath(String),
}

impl PlanInput {
    pub fn plan_source(&self) -> PlanSource {
        match self {
            Self::File { bytes, .. } => PlanSource::pdf_bytes(bytes),
            Self::ServerPath(path) => PlanSource::PdfPath(PathBuf::from(path)),
        }
    }
}

/// Outcome of the full takeoff → estimate → assess → qna pipeline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineReport {
    pub project_id: String,
    pub takeoff: TakeoffResult,
    pub baseline_estimate: NormalizedEstimate,
    pub assessment: AssessResponse,
    pub qna: Option<QnaResponse>,
    pub refined_estimate: Option<NormalizedEstimate>,
}

#[derive(Debug, Deserialize)]
struct WireAnswered {
    id: String,
    #[serde(default)]
    question: Option<String>,
    #[serde(default, alias = "key")]
    answer: Option<String>,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    trade: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireQna {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    answered: Vec<WireAnswered>,
    #[serde(default)]
    next_questions: Vec<Question>,
    #[serde(default)]
    completion_status: Option<CompletionStatus>,
    total_answered: usize,
    #[serde(default)]
    total_questions: Option<usize>,
    applied_overlays: Vec<AppliedOverlay>,
    #[serde(default)]
    request_id: Option<String>,
}

/// Stored state as returned by `GET /v1/interactive/{project_id}`.
#[derive(Debug, Deserialize)]
struct WireState {
    question_set: WireQuestionSet,
    #[serde(default)]
    assessment: Option<AssessResponse>,
    #[serde(default)]
    last_qna: Option<QnaResponse>,
}

#[derive(Debug, Deserialize)]
struct WireQuestionSet {
    #[serde(default)]
    questions: Vec<Question>,
}

pub struct WorkflowOrchestrator<S> {
    service: S,
}

impl<S> WorkflowOrchestrator<S>
where
    S: EstimationService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn health(&self) -> Result<Value, WorkflowError> {
        let request_id = new_request_id();
        let response = self
            .service
            .get_json(HEALTH_PATH, &request_id)
            .await
            .map_err(|error| remote_failure(error, None))?;

        if response.body.get("status").and_then(Value::as_str).is_none() {
            return Err(contract(HEALTH_PATH, "health response has no `status`"));
        }
        Ok(response.body)
    }

    pub async fn run_takeoff(
        &self,
        session: &mut ProjectSession,
        plan: PlanInput,
    ) -> Result<TakeoffResult, WorkflowError> {
        let request_id = new_request_id();
        let project_id = session.project_id.to_string();

        let (endpoint, response) = match plan {
            PlanInput::File { file_name, bytes } => {
                if bytes.is_empty() {
                    return Err(WorkflowError::validation("plan file is empty"));
                }
                let upload = FileUpload {
                    file_name,
                    bytes,
                    fields: vec![("project_id".to_string(), project_id.clone())],
                };
                let response =
                    self.service.post_file(TAKEOFF_UPLOAD_PATH, upload, &request_id).await;
                (TAKEOFF_UPLOAD_PATH, response)
            }
            PlanInput::ServerPath(path) => {
                if path.trim().is_empty() {
                    return Err(WorkflowError::validation("pdf_path is required"));
                }
                let body = json!({ "project_id": project_id, "pdf_path": path.trim() });
                (TAKEOFF_PATH, self.service.post_json(TAKEOFF_PATH, &body, &request_id).await)
            }
        };

        let response = response.map_err(|error| remote_failure(error, None))?;
        let takeoff: TakeoffResult = decode(endpoint, response.body)?;
        info!(
            event_name = "client.takeoff.completed",
            request_id = %request_id,
            project_id = %project_id,
            trade_count = takeoff.trades.len(),
            "takeoff completed"
        );

        session.last_request_id = Some(request_id);
        session.takeoff = Some(takeoff.clone());
        Ok(takeoff)
    }

    pub async fn run_estimate(
        &self,
        session: &mut ProjectSession,
        quantities: QuantitiesInput,
        options: EstimateOptions,
    ) -> Result<NormalizedEstimate, WorkflowError> {
        let request_id = new_request_id();
        let request = QuantityEstimateRequest {
            project_id: session.project_id.to_string(),
            quantities,
            options,
        };
        let body = serde_json::to_value(&request)
            .map_err(|error| WorkflowError::Internal(error.to_string()))?;

        let response = self
            .service
            .post_json(ESTIMATE_PATH, &body, &request_id)
            .await
            .map_err(|error| remote_failure(error, None))?;
        let estimate = normalize_estimate(ESTIMATE_PATH, response)?;
        info!(
            event_name = "client.estimate.completed",
            request_id = %request_id,
            project_id = %session.project_id,
            grand_total = estimate.grand_total,
            "estimate completed"
        );

        session.last_request_id = Some(request_id);
        session.estimate = Some(estimate.clone());
        Ok(estimate)
    }

    pub async fn run_program_estimate(
        &self,
        request: &ProgramRequest,
    ) -> Result<NormalizedEstimate, WorkflowError> {
        request.validate()?;
        let request_id = new_request_id();
        let body = serde_json::to_value(request)
            .map_err(|error| WorkflowError::Internal(error.to_string()))?;

        let response = self
            .service
            .post_json(PROGRAM_ESTIMATE_PATH, &body, &request_id)
            .await
            .map_err(|error| remote_failure(error, None))?;
        normalize_estimate(PROGRAM_ESTIMATE_PATH, response)
    }

    pub async fn run_assess(
        &self,
        session: &mut ProjectSession,
        plan: PlanSource,
    ) -> Result<AssessResponse, WorkflowError> {
        let request = plan.into_request(session.project_id.to_string());
        request.plan_source()?;

        let request_id = new_request_id();
        let body = serde_json::to_value(&request)
            .map_err(|error| WorkflowError::Internal(error.to_string()))?;
        let response = self
            .service
            .post_json(ASSESS_PATH, &body, &request_id)
            .await
            .map_err(|error| remote_failure(error, None))?;

        let mut body = response.body;
        fill_request_id(&mut body, response.request_id.as_deref().unwrap_or(&request_id));
        let assessment: AssessResponse = decode(ASSESS_PATH, body)?;
        if !(0.0..=1.0).contains(&assessment.coverage_score) {
            return Err(contract(
                ASSESS_PATH,
                &format!("coverage_score {} is outside [0, 1]", assessment.coverage_score),
            ));
        }

        info!(
            event_name = "client.assess.completed",
            request_id = %assessment.request_id,
            project_id = %session.project_id,
            coverage_score = assessment.coverage_score,
            question_count = assessment.questions.len(),
            "assessment completed"
        );
        session.record_assessment(assessment.clone())?;
        Ok(assessment)
    }

    pub async fn run_qna(
        &self,
        session: &mut ProjectSession,
        answers: &[AnswerSubmission],
    ) -> Result<QnaResponse, WorkflowError> {
        validate_answers(answers)?;
        if !session.state.accepts_answers() {
            return Err(WorkflowError::validation(format!(
                "project `{}` has no open question set; run assess first",
                session.project_id
            )));
        }

        let request_id = new_request_id();
        let body = json!({ "project_id": session.project_id.as_str(), "answers": answers });
        let response = self
            .service
            .post_json(QNA_PATH, &body, &request_id)
            .await
            .map_err(|error| remote_failure(error, None))?;

        let fallback_request_id = response.request_id.clone().unwrap_or(request_id);
        let wire: WireQna = decode(QNA_PATH, response.body)?;
        let qna = correlate_qna(session, answers, wire, fallback_request_id)?;
        qna.check_invariants().map_err(|message| contract(QNA_PATH, &message))?;

        info!(
            event_name = "client.qna.completed",
            request_id = %qna.request_id,
            project_id = %session.project_id,
            total_answered = qna.total_answered,
            remaining = qna.next_questions.len(),
            "qna round completed"
        );
        session.record_qna(&qna)?;
        Ok(qna)
    }

    /// Stored interactive state for a project, as the service reports it.
    pub async fn fetch_state(&self, project_id: &ProjectId) -> Result<Value, WorkflowError> {
        let request_id = new_request_id();
        let path = interactive_state_path(project_id);
        let response = self
            .service
            .get_json(&path, &request_id)
            .await
            .map_err(|error| remote_failure(error, Some(project_id)))?;
        Ok(response.body)
    }

    pub async fn cleanup(&self, session: &mut ProjectSession) -> Result<Value, WorkflowError> {
        let request_id = new_request_id();
        let path = interactive_state_path(&session.project_id);
        let response = self
            .service
            .delete_json(&path, &request_id)
            .await
            .map_err(|error| remote_failure(error, Some(&session.project_id)))?;

        session.reset();
        Ok(response.body)
    }

    /// Rebuilds a session from the service's stored state, for callers that
    /// did not keep the session from the assess call.
    pub async fn resume_session(
        &self,
        project_id: &ProjectId,
    ) -> Result<ProjectSession, WorkflowError> {
        let path = interactive_state_path(project_id);
        let state: WireState = decode(&path, self.fetch_state(project_id).await?)?;
        let session = ProjectSession::resume(
            project_id.clone(),
            state.question_set.questions,
            state.assessment,
            state.last_qna.as_ref(),
        )?;
        Ok(session)
    }

    /// Takeoff, baseline estimate, assessment, then (with answers) a QnA round
    /// and an estimate over the overlaid quantities.
    pub async fn run_pipeline(
        &self,
        session: &mut ProjectSession,
        plan: PlanInput,
        answers: &[AnswerSubmission],
        options: EstimateOptions,
    ) -> Result<PipelineReport, WorkflowError> {
        let plan_source = plan.plan_source();
        let takeoff = self.run_takeoff(session, plan).await?;
        let quantities = QuantitiesInput::from(takeoff.clone());
        let baseline_estimate =
            self.run_estimate(session, quantities.clone(), options.clone()).await?;
        let assessment = self.run_assess(session, plan_source).await?;

        let mut qna = None;
        let mut refined_estimate = None;
        if !answers.is_empty() {
            let round = self.run_qna(session, answers).await?;
            if !round.applied_overlays.is_empty() {
                let overlaid = session.overlaid_quantities(quantities);
                refined_estimate = Some(self.run_estimate(session, overlaid, options).await?);
            }
            qna = Some(round);
        }

        Ok(PipelineReport {
            project_id: session.project_id.to_string(),
            takeoff,
            baseline_estimate,
            assessment,
            qna,
            refined_estimate,
        })
    }
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn contract(endpoint: &str, message: &str) -> WorkflowError {
    RemoteServiceError::Contract { endpoint: endpoint.to_string(), message: message.to_string() }
        .into()
}

/// 422 answers are the service's validation verdict and 404 on a project
/// path means it has no state; everything else stays a remote failure.
fn remote_failure(error: RemoteServiceError, project_id: Option<&ProjectId>) -> WorkflowError {
    match (&error, project_id) {
        (RemoteServiceError::Status { status: 422, detail, request_id, .. }, _) => {
            WorkflowError::Validation { detail: detail.clone(), request_id: request_id.clone() }
        }
        (RemoteServiceError::Status { status: 404, request_id, .. }, Some(project_id)) => {
            WorkflowError::NotFound {
                project_id: project_id.to_string(),
                request_id: request_id.clone(),
            }
        }
        _ => WorkflowError::Remote(error),
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: Value) -> Result<T, WorkflowError> {
    serde_json::from_value(body).map_err(|error| contract(endpoint, &error.to_string()))
}

fn normalize_estimate(
    endpoint: &str,
    response: ServiceResponse,
) -> Result<NormalizedEstimate, WorkflowError> {
    NormalizedEstimate::from_value(response.body)
        .map_err(|error| contract(endpoint, &error.to_string()))
}

fn fill_request_id(body: &mut Value, request_id: &str) {
    if let Some(object) = body.as_object_mut() {
        let missing = object.get("request_id").and_then(Value::as_str).is_none();
        if missing {
            object.insert("request_id".to_string(), Value::String(request_id.to_string()));
        }
    }
}

/// Fills question text, severity and answer for `answered` entries the
/// service returned without them, from the session and the submission.
fn correlate_qna(
    session: &ProjectSession,
    submitted: &[AnswerSubmission],
    wire: WireQna,
    fallback_request_id: String,
) -> Result<QnaResponse, WorkflowError> {
    let mut answered = Vec::with_capacity(wire.answered.len());
    for entry in wire.answered {
        let known = session.question(&entry.id).or_else(|| {
            wire.next_questions.iter().find(|question| question.id == entry.id)
        });
        let question = entry
            .question
            .or_else(|| known.map(|question| question.prompt.clone()))
            .ok_or_else(|| contract(QNA_PATH, &format!("no question text for `{}`", entry.id)))?;
        let severity = entry
            .severity
            .or_else(|| known.map(|question| question.severity))
            .unwrap_or(Severity::Other);
        let answer = entry
            .answer
            .or_else(|| {
                submitted
                    .iter()
                    .find(|submission| submission.id.trim() == entry.id)
                    .and_then(|submission| submission.value().map(ToOwned::to_owned))
            })
            .ok_or_else(|| contract(QNA_PATH, &format!("no answer recorded for `{}`", entry.id)))?;
        let trade = entry
            .trade
            .or_else(|| known.map(|question| question.trade.clone()))
            .unwrap_or_default();

        answered.push(AnsweredQuestion { id: entry.id, question, answer, severity, trade });
    }

    let completion_status = CompletionStatus::from_remaining(wire.next_questions.len());
    if wire.completion_status.is_some_and(|reported| reported != completion_status) {
        warn!(
            event_name = "client.qna.status_mismatch",
            project_id = %session.project_id,
            reported = ?wire.completion_status,
            open_questions = wire.next_questions.len(),
            "completion_status disagrees with next_questions; using next_questions"
        );
    }
    let total_questions =
        wire.total_questions.unwrap_or(answered.len() + wire.next_questions.len());

    Ok(QnaResponse {
        project_id: wire.project_id.unwrap_or_else(|| session.project_id.to_string()),
        answered,
        next_questions: wire.next_questions,
        completion_status,
        total_answered: wire.total_answered,
        total_questions,
        applied_overlays: wire.applied_overlays,
        request_id: wire.request_id.unwrap_or(fallback_request_id),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use estimator_core::domain::question::EMPTY_ANSWERS_DETAIL;
    use estimator_core::interactive::plan::PlanFeatures;
    use estimator_core::WorkflowState;
    use serde_json::{json, Value};

    use super::*;

    /// Replays canned bodies and records the paths it was asked for.
    struct ScriptedService {
        replies: Mutex<Vec<Result<Value, RemoteServiceError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedService {
        fn new(replies: Vec<Result<Value, RemoteServiceError>>) -> Self {
            Self { replies: Mutex::new(replies), calls: Mutex::new(Vec::new()) }
        }

        fn next(&self, path: &str) -> Result<ServiceResponse, RemoteServiceError> {
            self.calls.lock().expect("calls lock").push(path.to_string());
            let mut replies = self.replies.lock().expect("replies lock");
            let reply = if replies.is_empty() {
                Err(RemoteServiceError::Connection {
                    endpoint: path.to_string(),
                    message: "no scripted reply".to_string(),
                })
            } else {
                replies.remove(0)
            };
            reply.map(|body| ServiceResponse { body, request_id: None })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl EstimationService for ScriptedService {
        async fn get_json(
            &self,
            path: &str,
            _request_id: &str,
        ) -> Result<ServiceResponse, RemoteServiceError> {
            self.next(path)
        }

        async fn post_json(
            &self,
            path: &str,
            _body: &Value,
            _request_id: &str,
        ) -> Result<ServiceResponse, RemoteServiceError> {
            self.next(path)
        }

        async fn post_file(
            &self,
            path: &str,
            _upload: FileUpload,
            _request_id: &str,
        ) -> Result<ServiceResponse, RemoteServiceError> {
            self.next(path)
        }

        async fn delete_json(
            &self,
            path: &str,
            _request_id: &str,
        ) -> Result<ServiceResponse, RemoteServiceError> {
            self.next(path)
        }
    }

    fn assess_body() -> Value {
        json!({
            "project_id": "p1",
            "coverage_score": 0.25,
            "trades_inferred": ["roofing", "windows", "concrete"],
            "questions_ref": "output/p1/QUESTIONS.json",
            "request_id": "req-assess",
            "questions": [
                {"id": "p1_roofing_material_0", "severity": "critical",
                 "question": "What roofing material will be used?", "trade": "roofing"},
                {"id": "p1_foundation_type_1", "severity": "critical",
                 "question": "What foundation type is planned?", "trade": "concrete"}
            ]
        })
    }

    fn features() -> PlanSource {
        PlanSource::Features {
            plan_features: PlanFeatures {
                full_text: "roof".to_string(),
                ..PlanFeatures::default()
            },
            layout_meta: None,
        }
    }

    #[tokio::test]
    async fn qna_fills_missing_question_text_and_severity_from_session() {
        let service = ScriptedService::new(vec![
            Ok(assess_body()),
            Ok(json!({
                "answered": [{"id": "p1_roofing_material_0", "key": "metal"}],
                "next_questions": [],
                "total_answered": 1,
                "applied_overlays": []
            })),
        ]);
        let orchestrator = WorkflowOrchestrator::new(service);
        let mut session = ProjectSession::new("p1").expect("session");

        orchestrator.run_assess(&mut session, features()).await.expect("assess");
        let qna = orchestrator
            .run_qna(&mut session, &[AnswerSubmission::keyed("p1_roofing_material_0", "metal")])
            .await
            .expect("qna");

        assert_eq!(qna.answered[0].question, "What roofing material will be used?");
        assert_eq!(qna.answered[0].severity, Severity::Critical);
        assert_eq!(qna.answered[0].answer, "metal");
        assert_eq!(qna.total_questions, 1);
        assert_eq!(session.state, WorkflowState::FullyAnswered);
    }

    #[tokio::test]
    async fn open_next_questions_outrank_a_complete_status() {
        let service = ScriptedService::new(vec![
            Ok(assess_body()),
            Ok(json!({
                "answered": [{"id": "p1_roofing_material_0", "key": "metal"}],
                "next_questions": [{"id": "p1_foundation_type_1", "severity": "critical",
                                    "question": "What foundation type is planned?",
                                    "trade": "concrete"}],
                "total_answered": 1,
                "completion_status": "complete",
                "applied_overlays": []
            })),
            Ok(json!({
                "answered": [{"id": "p1_roofing_material_0", "key": "metal"},
                             {"id": "p1_foundation_type_1", "key": "slab"}],
                "next_questions": [],
                "total_answered": 2,
                "completion_status": "in_progress",
                "applied_overlays": []
            })),
        ]);
        let orchestrator = WorkflowOrchestrator::new(service);
        let mut session = ProjectSession::new("p1").expect("session");
        orchestrator.run_assess(&mut session, features()).await.expect("assess");

        let first = orchestrator
            .run_qna(&mut session, &[AnswerSubmission::keyed("p1_roofing_material_0", "metal")])
            .await
            .expect("first round");
        assert_eq!(first.completion_status, CompletionStatus::InProgress);
        assert_eq!(session.state, WorkflowState::PartiallyAnswered);

        let second = orchestrator
            .run_qna(&mut session, &[AnswerSubmission::keyed("p1_foundation_type_1", "slab")])
            .await
            .expect("second round");
        assert_eq!(second.completion_status, CompletionStatus::Complete);
        assert_eq!(session.state, WorkflowState::FullyAnswered);

        let closed = orchestrator
            .run_qna(&mut session, &[AnswerSubmission::keyed("p1_foundation_type_1", "crawl")])
            .await
            .expect_err("no open questions remain");
        assert_eq!(closed.http_status(), 422);
        assert_eq!(orchestrator.service().calls(), vec![ASSESS_PATH, QNA_PATH, QNA_PATH]);
    }

    #[tokio::test]
    async fn empty_answers_fail_before_any_request() {
        let orchestrator = WorkflowOrchestrator::new(ScriptedService::new(Vec::new()));
        let mut session = ProjectSession::new("p1").expect("session");
        session.state = WorkflowState::Assessed;

        let error = orchestrator.run_qna(&mut session, &[]).await.expect_err("empty answers");

        assert_eq!(error.detail(), EMPTY_ANSWERS_DETAIL);
        assert!(orchestrator.service().calls().is_empty());
    }

    #[tokio::test]
    async fn qna_without_assessment_is_a_validation_error() {
        let orchestrator = WorkflowOrchestrator::new(ScriptedService::new(Vec::new()));
        let mut session = ProjectSession::new("p1").expect("session");

        let error = orchestrator
            .run_qna(&mut session, &[AnswerSubmission::keyed("p1_x_0", "y")])
            .await
            .expect_err("not assessed");

        assert_eq!(error.http_status(), 422);
        assert!(error.detail().contains("run assess first"));
    }

    #[tokio::test]
    async fn total_answered_mismatch_is_a_contract_violation() {
        let service = ScriptedService::new(vec![
            Ok(assess_body()),
            Ok(json!({
                "answered": [],
                "next_questions": [],
                "total_answered": 2,
                "applied_overlays": []
            })),
        ]);
        let orchestrator = WorkflowOrchestrator::new(service);
        let mut session = ProjectSession::new("p1").expect("session");
        orchestrator.run_assess(&mut session, features()).await.expect("assess");

        let error = orchestrator
            .run_qna(&mut session, &[AnswerSubmission::keyed("p1_roofing_material_0", "tile")])
            .await
            .expect_err("contract");

        assert!(matches!(error, WorkflowError::Remote(RemoteServiceError::Contract { .. })));
        assert_eq!(session.state, WorkflowState::Assessed);
    }

    #[tokio::test]
    async fn service_validation_and_missing_state_map_to_workflow_errors() {
        let rejected = RemoteServiceError::Status {
            endpoint: ASSESS_PATH.to_string(),
            status: 422,
            detail: "a plan is required".to_string(),
            request_id: Some("req-9".to_string()),
        };
        let missing = RemoteServiceError::Status {
            endpoint: "/v1/interactive/p1".to_string(),
            status: 404,
            detail: "gone".to_string(),
            request_id: None,
        };
        let service = ScriptedService::new(vec![Err(rejected), Err(missing)]);
        let orchestrator = WorkflowOrchestrator::new(service);
        let mut session = ProjectSession::new("p1").expect("session");

        let error = orchestrator.run_assess(&mut session, features()).await.expect_err("422");
        assert_eq!(error.request_id(), Some("req-9"));
        assert_eq!(error.http_status(), 422);

        let error = orchestrator.fetch_state(&session.project_id).await.expect_err("404");
        assert!(matches!(
            error,
            WorkflowError::NotFound { ref project_id, .. } if project_id == "p1"
        ));
    }

    #[tokio::test]
    async fn pipeline_refines_estimate_when_answers_produce_overlays() {
        let service = ScriptedService::new(vec![
            Ok(json!({"status": "success", "trades": [
                {"trade": "roofing", "items": [{"code": "roofing_default", "qty": 1}]}
            ]})),
            Ok(json!({"version": "v0", "totals": {"grand_total": 100.0}, "trades": []})),
            Ok(assess_body()),
            Ok(json!({
                "answered": [{"id": "p1_roofing_material_0", "question": "q", "answer": "metal",
                              "severity": "critical"}],
                "next_questions": [],
                "total_answered": 1,
                "total_questions": 2,
                "completion_status": "in_progress",
                "applied_overlays": [{"question_id": "p1_roofing_material_0", "trade": "roofing",
                                      "key": "metal", "multiplier": 1.35,
                                      "source": "user-clarification: metal"}]
            })),
            Ok(json!({"version": "v0", "grand_total": 135.0, "trades": {"roofing": 135.0}})),
        ]);
        let orchestrator = WorkflowOrchestrator::new(service);
        let mut session = ProjectSession::new("p1").expect("session");

        let report = orchestrator
            .run_pipeline(
                &mut session,
                PlanInput::ServerPath("plans/p1.pdf".to_string()),
                &[AnswerSubmission::keyed("p1_roofing_material_0", "metal")],
                EstimateOptions::default(),
            )
            .await
            .expect("pipeline");

        assert_eq!(report.baseline_estimate.grand_total, 100.0);
        assert_eq!(report.refined_estimate.map(|estimate| estimate.grand_total), Some(135.0));
        assert_eq!(
            report.qna.map(|round| round.completion_status),
            Some(CompletionStatus::Complete)
        );
        assert_eq!(session.state, WorkflowState::FullyAnswered);
        assert_eq!(
            orchestrator.service().calls(),
            vec![TAKEOFF_PATH, ESTIMATE_PATH, ASSESS_PATH, QNA_PATH, ESTIMATE_PATH]
        );
    }
}
