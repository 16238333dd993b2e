//! Request plumbing shared by every handler: request-id propagation, JSON
//! body decoding and the structured error response.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use estimator_core::WorkflowError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// The caller's `x-request-id`, or a fresh UUID v4 when absent or unusable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        let supplied = value
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN);
        match supplied {
            Some(value) => Self(value.to_string()),
            None => Self(uuid::Uuid::new_v4().to_string()),
        }
    }
}

impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_header(parts.headers.get(REQUEST_ID_HEADER)))
    }
}

/// A workflow failure bound to the request it happened in.
#[derive(Debug)]
pub struct ApiError {
    error: WorkflowError,
    request_id: String,
}

impl ApiError {
    pub fn new(error: impl Into<WorkflowError>, request_id: &str) -> Self {
        Self { error: error.into(), request_id: request_id.to_string() }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.error {
            WorkflowError::Internal(message) => error!(
                event_name = "server.request.failed",
                request_id = %self.request_id,
                error = %message,
                "request failed with internal error"
            ),
            other => warn!(
                event_name = "server.request.rejected",
                request_id = %self.request_id,
                status = status.as_u16(),
                detail = %other.detail(),
                "request rejected"
            ),
        }

        let request_id = self.request_id.clone();
        let body = self.error.into_body(self.request_id);
        with_request_id((status, Json(body)).into_response(), &request_id)
    }
}

pub trait InRequest<T> {
    fn in_request(self, request_id: &str) -> Result<T, ApiError>;
}

impl<T, E> InRequest<T> for Result<T, E>
where
    E: Into<WorkflowError>,
{
    fn in_request(self, request_id: &str) -> Result<T, ApiError> {
        self.map_err(|error| ApiError::new(error, request_id))
    }
}

/// 200 JSON response echoing the request id.
pub fn json_response<T: Serialize>(request_id: &str, body: T) -> Response {
    with_request_id(Json(body).into_response(), request_id)
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Decodes a JSON body. Malformed or empty bodies are validation failures
/// rather than the framework's plain-text rejection.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, WorkflowError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(WorkflowError::validation("request body must be a JSON object"));
    }
    serde_json::from_slice(body)
        .map_err(|error| WorkflowError::validation(format!("malformed JSON body: {error}")))
}
