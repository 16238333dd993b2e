use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::Multipart;
use axum::response::Response;
use estimator_core::domain::takeoff::{QuantityItem, TradeCollection, TradeTakeoff};
use estimator_core::interactive::inference::infer_trades;
use estimator_core::interactive::plan::{AssessRequest, PlanDocument, PlanSource};
use estimator_core::{ProjectId, TakeoffResult, WorkflowError};
use serde::Deserialize;
use tracing::info;

use crate::api::{json_response, parse_json, ApiError, InRequest, RequestId};

const TAKEOFF_ITEM_UOM: &str = "LS";
const TAKEOFF_ITEM_SOURCE: &str = "plan_inference";

/// Body of `POST /v1/takeoff`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TakeoffRequest {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub pdf_path: Option<String>,
    #[serde(default)]
    pub pdf_base64: Option<String>,
}

impl TakeoffRequest {
    fn plan_source(&self) -> Result<PlanSource, WorkflowError> {
        AssessRequest {
            pdf_path: self.pdf_path.clone(),
            pdf_base64: self.pdf_base64.clone(),
            ..AssessRequest::default()
        }
        .plan_source()
    }
}

/// One lump-sum item per inferred trade, plus the drawing statistics the
/// plan reader counted.
pub fn takeoff_from_document(
    document: &PlanDocument,
    project_id: Option<&ProjectId>,
) -> TakeoffResult {
    let trades = infer_trades(&document.features)
        .into_iter()
        .map(|inference| TradeTakeoff {
            items: inference
                .items
                .into_iter()
                .map(|item| QuantityItem {
                    code: item.item,
                    description: format!("{} scope inferred from plan text", inference.trade),
                    uom: TAKEOFF_ITEM_UOM.to_string(),
                    qty: 1.0,
                    source: Some(TAKEOFF_ITEM_SOURCE.to_string()),
                })
                .collect(),
            trade: inference.trade,
        })
        .collect();

    TakeoffResult {
        status: "success".to_string(),
        trades: TradeCollection::List(trades),
        scale_units: document.scale_units().map(ToOwned::to_owned),
        total_lines: document.line_ops,
        total_polygons: document.rect_ops,
        project_id: project_id.map(ToString::to_string),
    }
}

fn optional_project_id(raw: Option<&str>) -> Result<Option<ProjectId>, WorkflowError> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => ProjectId::parse(raw).map(Some),
        None => Ok(None),
    }
}

async fn read_plan(source: PlanSource) -> Result<PlanDocument, WorkflowError> {
    tokio::task::spawn_blocking(move || PlanDocument::load(source))
        .await
        .map_err(|error| WorkflowError::Internal(format!("plan reader panicked: {error}")))?
        .map_err(WorkflowError::from)
}

fn respond(request_id: &str, takeoff: TakeoffResult) -> Response {
    info!(
        event_name = "takeoff.completed",
        request_id = %request_id,
        project_id = takeoff.project_id.as_deref().unwrap_or("unknown"),
        trades = takeoff.trades.len(),
        total_lines = takeoff.total_lines,
        total_polygons = takeoff.total_polygons,
        "takeoff extracted"
    );
    json_response(request_id, takeoff)
}

/// `POST /v1/takeoff` with a server-visible path or base64 PDF.
pub async fn takeoff_json(
    RequestId(request_id): RequestId,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: TakeoffRequest = parse_json(&body).in_request(&request_id)?;
    let project_id = optional_project_id(request.project_id.as_deref()).in_request(&request_id)?;
    let source = request.plan_source().in_request(&request_id)?;
    let document = read_plan(source).await.in_request(&request_id)?;

    Ok(respond(&request_id, takeoff_from_document(&document, project_id.as_ref())))
}

/// `POST /takeoff` with a multipart `file` field and optional `project_id`.
pub async fn takeoff_upload(
    RequestId(request_id): RequestId,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart
        .map_err(|rejection| {
            WorkflowError::validation(format!("expected multipart form: {rejection}"))
        })
        .in_request(&request_id)?;

    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut raw_project_id = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| WorkflowError::validation(format!("malformed multipart body: {error}")))
        .in_request(&request_id)?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(ToOwned::to_owned);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|error| WorkflowError::validation(format!("unreadable file: {error}")))
                    .in_request(&request_id)?;
                file = Some((file_name, bytes.to_vec()));
            }
            "project_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|error| {
                        WorkflowError::validation(format!("unreadable project_id: {error}"))
                    })
                    .in_request(&request_id)?;
                raw_project_id = Some(text);
            }
            _ => {}
        }
    }

    let project_id = optional_project_id(raw_project_id.as_deref()).in_request(&request_id)?;
    let (file_name, bytes) = file
        .ok_or_else(|| WorkflowError::validation("multipart field `file` is required"))
        .in_request(&request_id)?;
    let document =
        tokio::task::spawn_blocking(move || PlanDocument::from_pdf_bytes(&bytes, file_name))
            .await
            .map_err(|error| WorkflowError::Internal(format!("plan reader panicked: {error}")))
            .in_request(&request_id)?
            .in_request(&request_id)?;

    Ok(respond(&request_id, takeoff_from_document(&document, project_id.as_ref())))
}
