use std::path::Path;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use estimator_core::interactive::plan::PlanSource;
use estimator_server::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(output_dir: &Path) -> Router {
    router(AppState::with_defaults(output_dir))
}

/// Minimal single-page PDF whose only content stream shows `lines`.
fn text_pdf(lines: &[&str]) -> Vec<u8> {
    let mut content = String::from("BT /F1 12 Tf 72 720 Td\n");
    for line in lines {
        content.push_str(&format!("({line}) Tj 0 -14 Td\n"));
    }
    content.push_str("ET\n0 0 m 100 0 l S\n0 0 m 0 100 l S\n10 10 50 50 re S\n");
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

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(request).await.expect("router should respond");
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, request_id, body)
}

async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Option<String>, Value) {
    let request = Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    send(app, request).await
}

async fn assess_text(app: &Router, project_id: &str, text: &str) -> Value {
    let (status, _, body) = post_json(
        app,
        "/v1/interactive/assess",
        json!({"project_id": project_id, "plan_features": {"full_text": text}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "assess failed: {body}");
    body
}

#[tokio::test]
async fn health_reports_healthy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = Request::get("/health").body(Body::empty()).expect("request");

    let (status, request_id, body) = send(&app(dir.path()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(request_id.is_none());
}

#[tokio::test]
async fn assess_then_qna_records_two_answers_and_writes_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    let project = "uat-qna-test-001";

    let request = Request::post("/v1/interactive/assess")
        .header("content-type", "application/json")
        .header("x-request-id", "req-assess-1")
        .body(Body::from(
            json!({
                "project_id": project,
                "plan_features": {"full_text": "roof shingle window vinyl"}
            })
            .to_string(),
        ))
        .expect("request");
    let (status, request_id, assessed) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(request_id.as_deref(), Some("req-assess-1"));
    assert_eq!(assessed["request_id"], "req-assess-1");
    let coverage = assessed["coverage_score"].as_f64().expect("coverage");
    assert!((0.0..=1.0).contains(&coverage));
    assert!(!assessed["trades_inferred"].as_array().expect("trades").is_empty());
    let questions_ref = assessed["questions_ref"].as_str().expect("questions_ref");
    assert!(questions_ref.ends_with("QUESTIONS.json"));
    assert!(Path::new(questions_ref).is_file());
    assert!(dir.path().join(project).join("ASSESS_RESPONSE.json").is_file());

    let (status, _, qna) = post_json(
        &app,
        "/v1/interactive/qna",
        json!({
            "project_id": project,
            "answers": [
                {"id": format!("{project}_roofing_material_0"), "key": "shingle"},
                {"id": format!("{project}_foundation_type_1"), "answer": "slab"}
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "qna failed: {qna}");
    let answered = qna["answered"].as_array().expect("answered");
    assert_eq!(answered.len(), 2);
    assert_eq!(qna["total_answered"], 2);
    assert_eq!(answered[0]["severity"], "critical");
    assert!(answered[0]["question"].as_str().is_some_and(|text| !text.is_empty()));
    assert!(qna["applied_overlays"].is_array());
    assert_eq!(qna["completion_status"], "in_progress");
    assert!(dir.path().join(project).join("QNA_RESPONSE.json").is_file());
}

#[tokio::test]
async fn identical_assessments_are_deterministic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());

    let first = assess_text(&app, "p-det", "slab foundation framing roof").await;
    let second = assess_text(&app, "p-det", "slab foundation framing roof").await;

    assert_eq!(first["coverage_score"], second["coverage_score"]);
    assert_eq!(first["questions_ref"], second["questions_ref"]);
    assert_eq!(
        first["trades_inferred"].as_array().map(Vec::len),
        second["trades_inferred"].as_array().map(Vec::len)
    );
    assert_ne!(first["request_id"], second["request_id"]);
}

#[tokio::test]
async fn assess_without_project_or_plan_is_a_structured_422() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());

    let (status, request_id, body) =
        post_json(&app, "/v1/interactive/assess", json!({"pdf_path": "/tmp/plan.pdf"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "VALIDATION");
    assert_eq!(body["detail"], "project_id is required");
    assert_eq!(body["request_id"].as_str(), request_id.as_deref());

    let (status, _, body) =
        post_json(&app, "/v1/interactive/assess", json!({"project_id": "p-noplan"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().expect("detail").starts_with("a plan is required"));
}

#[tokio::test]
async fn malformed_json_is_a_structured_422() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = Request::post("/v1/interactive/qna")
        .header("content-type", "application/json")
        .body(Body::from("{\"project_id\": \"p1\", \"answers\": ["))
        .expect("request");

    let (status, _, body) = send(&app(dir.path()), request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "VALIDATION");
    assert!(body["detail"].as_str().expect("detail").starts_with("malformed JSON body"));
}

#[tokio::test]
async fn qna_rejects_empty_answers_and_unassessed_projects() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());

    let (status, _, body) = post_json(
        &app,
        "/v1/interactive/qna",
        json!({"project_id": "p-empty", "answers": []}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "answers array cannot be empty");

    let (status, _, body) = post_json(
        &app,
        "/v1/interactive/qna",
        json!({"project_id": "never-assessed", "answers": [{"id": "x", "key": "y"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "VALIDATION");
}

#[tokio::test]
async fn reassessment_discards_previous_answers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    assess_text(&app, "p-reset", "roof shingle").await;
    let (status, _, _) = post_json(
        &app,
        "/v1/interactive/qna",
        json!({
            "project_id": "p-reset",
            "answers": [{"id": "p-reset_roofing_material_0", "key": "metal"}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(dir.path().join("p-reset").join("QNA_RESPONSE.json").exists());

    assess_text(&app, "p-reset", "roof shingle").await;

    assert!(!dir.path().join("p-reset").join("QNA_RESPONSE.json").exists());
}

#[tokio::test]
async fn state_inspection_and_cleanup_follow_project_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    let get = |id: &str| Request::get(format!("/v1/interactive/{id}")).body(Body::empty());
    let delete = |id: &str| Request::delete(format!("/v1/interactive/{id}")).body(Body::empty());

    let (status, _, body) = send(&app, get("p-life").expect("request")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    assess_text(&app, "p-life", "window vinyl").await;
    let (status, _, body) = send(&app, get("p-life").expect("request")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project_id"], "p-life");
    assert!(body["question_set"]["questions"].is_array());
    assert!(body["last_qna"].is_null());

    let (status, _, body) = send(&app, delete("p-life").expect("request")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"project_id": "p-life", "removed": true}));
    assert!(!dir.path().join("p-life").exists());

    let (status, _, _) = send(&app, delete("p-life").expect("request")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn program_estimate_is_positive_and_rejects_empty_area() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());

    let (status, _, body) = post_json(
        &app,
        "/estimate",
        json!({"area_sf": 5000, "project_type": "residential", "finish_quality": "standard"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["ensemble_estimate"]["total_cost"].as_f64().expect("total") > 0.0);
    assert!(body["ml_estimate"].is_null());

    let (status, _, body) = post_json(&app, "/v1/estimate", json!({"area_sf": 0})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "VALIDATION");
}

#[tokio::test]
async fn uploaded_takeoff_feeds_the_quantity_estimate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    let pdf = text_pdf(&["A1.01 ROOF PLAN", "asphalt shingle roof", "SCALE: 1/4\" = 1'-0\""]);

    let boundary = "estimator-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; \
             name=\"project_id\"\r\n\r\np-takeoff\r\n\
             --{boundary}\r\nContent-Disposition: form-data; \
             name=\"file\"; filename=\"plan.pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&pdf);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    let request = Request::post("/takeoff")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .expect("request");

    let (status, _, takeoff) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK, "takeoff failed: {takeoff}");
    assert_eq!(takeoff["status"], "success");
    assert_eq!(takeoff["project_id"], "p-takeoff");
    assert_eq!(takeoff["total_lines"], 2);
    assert_eq!(takeoff["total_polygons"], 1);
    let trades = takeoff["trades"].as_array().expect("trades");
    assert!(trades.iter().any(|trade| trade["trade"] == "roofing"));

    let (status, _, estimate) = post_json(
        &app,
        "/v1/estimate",
        json!({"project_id": "p-takeoff", "quantities": takeoff["trades"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "estimate failed: {estimate}");
    assert_eq!(estimate["version"], "v0");
    assert!(estimate["grand_total"].as_f64().expect("grand_total") >= 0.0);
}

#[tokio::test]
async fn path_takeoff_rejects_non_pdf_payloads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let PlanSource::PdfBase64(encoded) = PlanSource::pdf_bytes(b"not a pdf") else {
        panic!("expected base64 source");
    };

    let (status, _, body) =
        post_json(&app(dir.path()), "/v1/takeoff", json!({"pdf_base64": encoded})).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "plan payload is not a PDF document");
}

#[tokio::test]
async fn interactive_estimate_applies_stored_overlays() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    assess_text(&app, "p-overlay", "roof shingle").await;
    let (status, _, _) = post_json(
        &app,
        "/v1/interactive/qna",
        json!({
            "project_id": "p-overlay",
            "answers": [{"id": "p-overlay_roofing_material_0", "key": "metal"}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, estimate) = post_json(
        &app,
        "/v1/estimate",
        json!({
            "project_id": "p-overlay",
            "mode": "interactive",
            "quantities": [{"trade": "roofing", "code": "roofing_default", "uom": "LS", "qty": 4.0}]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "estimate failed: {estimate}");
    assert_eq!(estimate["line_items"][0]["qty"], 5.4);
    let overlays =
        estimate["metadata"]["interactive"]["applied_overlays"].as_array().expect("overlays");
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0]["source"], "user-clarification: metal");
}

#[tokio::test]
async fn quantity_estimate_reads_pricing_files_from_posted_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pricing = tempfile::tempdir().expect("pricing dir");
    let policy = pricing.path().join("policy.toml");
    let unit_costs = pricing.path().join("unit_costs.csv");
    std::fs::write(
        &policy,
        "policy_id = \"posted\"\ntax_pct = 0.0\n[markups]\noverhead_pct = 0.0\nprofit_pct = 0.0\n",
    )
    .expect("policy");
    std::fs::write(&unit_costs, "trade,code,unit_cost\nconcrete,\"slab\",\"125\"\n")
        .expect("unit costs");
    let app = app(dir.path());

    let (status, _, estimate) = post_json(
        &app,
        "/v1/estimate",
        json!({
            "project_id": "p-files",
            "policy": policy.display().to_string(),
            "unit_costs_csv": unit_costs.display().to_string(),
            "vendor_quotes_csv": "",
            "quantities": [{"trade": "concrete", "code": "slab", "uom": "SF", "qty": 2.0}]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "estimate failed: {estimate}");
    assert_eq!(estimate["policy_id"], "posted");
    assert_eq!(estimate["line_items"][0]["source"], "unit_costs");
    assert_eq!(estimate["line_items"][0]["unit_cost"], 125.0);
    assert_eq!(estimate["grand_total"], 250.0);

    let missing = pricing.path().join("vendor_quotes.csv");
    let (status, _, body) = post_json(
        &app,
        "/v1/estimate",
        json!({
            "project_id": "p-files",
            "vendor_quotes_csv": missing.display().to_string(),
            "quantities": [{"trade": "concrete", "code": "slab", "qty": 2.0}]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "VALIDATION");
    assert!(body["detail"].as_str().expect("detail").contains(&missing.display().to_string()));
}
