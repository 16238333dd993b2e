use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use estimator_core::domain::estimate::QuantityEstimateRequest;
use estimator_core::pricing::quantity::PricedEstimate;
use estimator_core::{AppliedOverlay, EstimateRequest, ProjectId, WorkflowError};
use serde_json::Value;
use tracing::info;

use crate::api::{json_response, parse_json, ApiError, InRequest, RequestId};
use crate::bootstrap::AppState;
use crate::interactive::StoredQna;
use crate::store::QNA_RESPONSE_FILE;

/// `POST /estimate` and `POST /v1/estimate`. Program attributes get the
/// ensemble shape; quantity bodies get the v0 priced shape.
pub async fn estimate(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    body: Bytes,
) -> Result<Response, ApiError> {
    let value: Value = parse_json(&body).in_request(&request_id)?;
    let request = EstimateRequest::from_value(value).in_request(&request_id)?;

    match request {
        EstimateRequest::Program(program) => {
            let estimate = state.pricer.price_program(&program).in_request(&request_id)?;
            info!(
                event_name = "estimate.program.completed",
                request_id = %request_id,
                project_id = program.project_id.as_deref().unwrap_or("unknown"),
                total_cost = %estimate.ensemble_estimate.total_cost,
                "program estimate priced"
            );
            Ok(json_response(&request_id, estimate))
        }
        EstimateRequest::Quantities(quantities) => {
            let overlays = stored_overlays(&state, &quantities).await.in_request(&request_id)?;
            let estimate = price_quantities(&state, &quantities, overlays.clone())
                .await
                .in_request(&request_id)?;
            info!(
                event_name = "estimate.quantities.completed",
                request_id = %request_id,
                project_id = %quantities.project_id,
                policy_id = %estimate.policy_id,
                grand_total = %estimate.grand_total,
                warnings = estimate.warnings.len(),
                overlays = overlays.len(),
                "quantity estimate priced"
            );
            Ok(json_response(&request_id, estimate))
        }
    }
}

/// Pricing reads the request's policy and cost files, so it runs off the
/// async workers like `read_plan`.
async fn price_quantities(
    state: &AppState,
    request: &QuantityEstimateRequest,
    overlays: Vec<AppliedOverlay>,
) -> Result<PricedEstimate, WorkflowError> {
    let pricer = Arc::clone(&state.pricer);
    let request = request.clone();
    tokio::task::spawn_blocking(move || pricer.price_quantities(&request, &overlays))
        .await
        .map_err(|error| WorkflowError::Internal(format!("pricer panicked: {error}")))?
        .map_err(WorkflowError::from)
}

/// Overlays from the project's last QnA round when the request asks for
/// interactive mode. A project without a round prices unadjusted.
async fn stored_overlays(
    state: &AppState,
    request: &QuantityEstimateRequest,
) -> Result<Vec<AppliedOverlay>, WorkflowError> {
    if !request.options.is_interactive() {
        return Ok(Vec::new());
    }
    let project_id = ProjectId::parse(&request.project_id)?;
    let stored: Option<StoredQna> = state.store.read_json(&project_id, QNA_RESPONSE_FILE).await?;
    Ok(stored.map(|stored| stored.response.applied_overlays).unwrap_or_default())
}
