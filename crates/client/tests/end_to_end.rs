use std::time::Duration;

use estimator_client::{HttpEstimationService, PlanInput, ProjectSession, WorkflowOrchestrator};
use estimator_core::domain::estimate::{EstimateOptions, EstimateShape};
use estimator_core::domain::question::CompletionStatus;
use estimator_core::interactive::plan::PlanSource;
use estimator_core::{AnswerSubmission, ProgramRequest, WorkflowError, WorkflowState};
use estimator_server::AppState;
use tempfile::TempDir;

fn text_pdf(lines: &[&str]) -> Vec<u8> {
    let mut content = String::from("BT /F1 12 Tf 72 720 Td\n");
    for line in lines {
        content.push_str(&format!("({line}) Tj 0 -14 Td\n"));
    }
    content.push_str("ET\n0 0 m 100 0 l S\n");
    format!(
        "%PDF-1.4\n1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
         2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n\
         3 0 obj << /Type /Page /Parent 2 0 R /Contents 4 0 R >> endobj\n\
         4 0 obj << /Length {} >>\nstream\n{}endstream\nendobj\n%%EOF\n",
        content.len(),
        content
    )
    .into_bytes()
}

fn plan_pdf() -> Vec<u8> {
    text_pdf(&["A1.01 FLOOR PLAN", "asphalt shingle roof", "vinyl window schedule", "2400 SF"])
}

async fn start() -> (TempDir, WorkflowOrchestrator<HttpEstimationService>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = estimator_server::spawn(listener, AppState::with_defaults(dir.path()))
        .await
        .expect("server should start");
    let service = HttpEstimationService::new(format!("http://{address}"), Duration::from_secs(10))
        .expect("client should build");
    (dir, WorkflowOrchestrator::new(service))
}

#[tokio::test]
async fn pipeline_runs_takeoff_estimate_assess_and_qna() {
    let (_dir, orchestrator) = start().await;
    let mut session = ProjectSession::new("e2e-pipeline").expect("session");
    let answers = [
        AnswerSubmission::keyed("e2e-pipeline_roofing_material_0", "metal"),
        AnswerSubmission::free_text("e2e-pipeline_foundation_type_1", "slab"),
    ];

    let health = orchestrator.health().await.expect("health");
    assert_eq!(health["status"], "healthy");

    let report = orchestrator
        .run_pipeline(
            &mut session,
            PlanInput::File { file_name: "plan.pdf".to_string(), bytes: plan_pdf() },
            &answers,
            EstimateOptions::default(),
        )
        .await
        .expect("pipeline");

    assert!(!report.takeoff.trades.is_empty());
    assert_eq!(report.baseline_estimate.shape, EstimateShape::Priced);
    assert!(report.baseline_estimate.grand_total >= 0.0);
    assert!((0.0..=1.0).contains(&report.assessment.coverage_score));
    assert!(!report.assessment.trades_inferred.is_empty());

    let qna = report.qna.expect("qna round");
    assert_eq!(qna.answered.len(), 2);
    assert_eq!(qna.total_answered, 2);
    assert_eq!(qna.answered[0].question, "What roofing material will be used?");
    assert_eq!(qna.completion_status, CompletionStatus::InProgress);
    assert_eq!(session.state, WorkflowState::PartiallyAnswered);

    let refined = report.refined_estimate.expect("overlays trigger a refined estimate");
    assert!(refined.grand_total >= report.baseline_estimate.grand_total);
}

#[tokio::test]
async fn state_is_inspectable_until_cleanup() {
    let (_dir, orchestrator) = start().await;
    let mut session = ProjectSession::new("e2e-state").expect("session");

    orchestrator
        .run_assess(&mut session, PlanSource::pdf_bytes(&plan_pdf()))
        .await
        .expect("assess");
    let state = orchestrator.fetch_state(&session.project_id).await.expect("state");
    assert_eq!(state["project_id"], "e2e-state");

    let removed = orchestrator.cleanup(&mut session).await.expect("cleanup");
    assert_eq!(removed["removed"], true);
    assert_eq!(session.state, WorkflowState::Unassessed);

    let error = orchestrator.fetch_state(&session.project_id).await.expect_err("gone");
    assert!(matches!(
        error,
        WorkflowError::NotFound { ref project_id, .. } if project_id == "e2e-state"
    ));
    assert_eq!(error.http_status(), 404);
}

#[tokio::test]
async fn unknown_answer_ids_come_back_as_validation_errors() {
    let (_dir, orchestrator) = start().await;
    let mut session = ProjectSession::new("e2e-unknown").expect("session");
    orchestrator
        .run_assess(&mut session, PlanSource::pdf_bytes(&plan_pdf()))
        .await
        .expect("assess");

    let error = orchestrator
        .run_qna(&mut session, &[AnswerSubmission::keyed("e2e-unknown_nope_9", "x")])
        .await
        .expect_err("unknown id");

    assert_eq!(error.http_status(), 422);
    assert!(error.detail().contains("e2e-unknown_nope_9"));
    assert!(error.request_id().is_some());
    assert_eq!(session.state, WorkflowState::Assessed);
}

#[tokio::test]
async fn server_path_takeoff_and_program_estimate() {
    let (dir, orchestrator) = start().await;
    let plan_path = dir.path().join("plan.pdf");
    std::fs::write(&plan_path, plan_pdf()).expect("write plan");
    let mut session = ProjectSession::new("e2e-path").expect("session");

    let takeoff = orchestrator
        .run_takeoff(&mut session, PlanInput::ServerPath(plan_path.display().to_string()))
        .await
        .expect("takeoff");
    assert_eq!(takeoff.status, "success");
    assert_eq!(takeoff.total_lines, 1);

    let estimate =
        orchestrator.run_program_estimate(&ProgramRequest::new(5000.0)).await.expect("program");
    assert_eq!(estimate.shape, EstimateShape::Ensemble);
    assert!(estimate.grand_total > 0.0);
}

#[tokio::test]
async fn a_resumed_session_can_answer_questions() {
    let (_dir, orchestrator) = start().await;
    let mut first = ProjectSession::new("e2e-resume").expect("session");
    orchestrator
        .run_assess(&mut first, PlanSource::pdf_bytes(&plan_pdf()))
        .await
        .expect("assess");

    let mut resumed = orchestrator.resume_session(&first.project_id).await.expect("resume");
    assert_eq!(resumed.state, WorkflowState::Assessed);
    assert_eq!(resumed.questions, first.questions);

    let qna = orchestrator
        .run_qna(
            &mut resumed,
            &[AnswerSubmission::keyed("e2e-resume_roofing_material_0", "tile")],
        )
        .await
        .expect("qna");
    assert_eq!(qna.applied_overlays[0].multiplier, 1.6);
}

#[tokio::test]
async fn project_ids_containing_a_topic_get_the_answered_topic_overlay() {
    let (_dir, orchestrator) = start().await;
    let mut session = ProjectSession::new("roofing_material-e2e").expect("session");
    orchestrator
        .run_assess(&mut session, PlanSource::pdf_bytes(&plan_pdf()))
        .await
        .expect("assess");

    let qna = orchestrator
        .run_qna(
            &mut session,
            &[AnswerSubmission::keyed("roofing_material-e2e_foundation_type_1", "basement")],
        )
        .await
        .expect("qna");

    assert_eq!(qna.applied_overlays.len(), 1);
    assert_eq!(qna.applied_overlays[0].trade, "concrete");
    assert_eq!(qna.applied_overlays[0].key, "basement");
    assert_eq!(qna.applied_overlays[0].multiplier, 1.45);
    assert_eq!(session.state, WorkflowState::PartiallyAnswered);
}
