use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::project::WorkflowState;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid workflow transition from {from:?} to {to:?}")]
    InvalidWorkflowTransition { from: WorkflowState, to: WorkflowState },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure talking to the estimation service. Always carries the endpoint so
/// a caller can decide whether and where to retry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteServiceError {
    #[error("{endpoint} returned HTTP {status}: {detail}")]
    Status { endpoint: String, status: u16, detail: String, request_id: Option<String> },
    #[error("{endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },
    #[error("could not reach {endpoint}: {message}")]
    Connection { endpoint: String, message: String },
    #[error("{endpoint} returned a response that violates the contract: {message}")]
    Contract { endpoint: String, message: String },
}

impl RemoteServiceError {
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Status { endpoint, .. }
            | Self::Timeout { endpoint, .. }
            | Self::Connection { endpoint, .. }
            | Self::Contract { endpoint, .. } => endpoint,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout { .. } | Self::Connection { .. } => true,
            Self::Contract { .. } => false,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {detail}")]
    Validation { detail: String, request_id: Option<String> },
    #[error("project `{project_id}` has no recorded state")]
    NotFound { project_id: String, request_id: Option<String> },
    #[error(transparent)]
    Remote(#[from] RemoteServiceError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("internal failure: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    NotFound,
    RemoteService,
    Internal,
}

/// Structured error body returned by every failing endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorCode,
    pub detail: String,
    pub request_id: String,
}

impl WorkflowError {
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation { detail: detail.into(), request_id: None }
    }

    pub fn not_found(project_id: impl Into<String>) -> Self {
        Self::NotFound { project_id: project_id.into(), request_id: None }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        match &mut self {
            Self::Validation { request_id, .. } | Self::NotFound { request_id, .. } => {
                *request_id = Some(id.into());
            }
            Self::Remote(_) | Self::Domain(_) | Self::Internal(_) => {}
        }
        self
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Validation { request_id, .. } | Self::NotFound { request_id, .. } => {
                request_id.as_deref()
            }
            Self::Remote(RemoteServiceError::Status { request_id, .. }) => request_id.as_deref(),
            Self::Remote(_) | Self::Domain(_) | Self::Internal(_) => None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } | Self::Domain(_) => ErrorCode::Validation,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Remote(_) => ErrorCode::RemoteService,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.code() {
            ErrorCode::Validation => 422,
            ErrorCode::NotFound => 404,
            ErrorCode::RemoteService => 502,
            ErrorCode::Internal => 500,
        }
    }

    /// Detail text safe to hand back to a caller.
    pub fn detail(&self) -> String {
        match self {
            Self::Validation { detail, .. } => detail.clone(),
            Self::NotFound { project_id, .. } => {
                format!("no interactive state found for project `{project_id}`")
            }
            Self::Remote(error) => error.to_string(),
            Self::Domain(error) => error.to_string(),
            Self::Internal(_) => "an unexpected internal error occurred".to_string(),
        }
    }

    pub fn into_body(self, fallback_request_id: impl Into<String>) -> ErrorBody {
        let request_id =
            self.request_id().map(ToOwned::to_owned).unwrap_or_else(|| fallback_request_id.into());
        ErrorBody { error: self.code(), detail: self.detail(), request_id }
    }
}
