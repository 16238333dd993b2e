pub mod ask;
pub mod assess;
pub mod config;
pub mod estimate;
pub mod health;
pub mod inputs;
pub mod qna;
pub mod run;
pub mod takeoff;

use std::future::Future;

use estimator_client::{HttpEstimationService, WorkflowOrchestrator};
use estimator_core::config::{AppConfig, ConfigError};
use estimator_core::WorkflowError;
use serde::Serialize;
use serde_json::Value;

pub const EXIT_OK: u8 = 0;
pub const EXIT_INTERNAL: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_VALIDATION: u8 = 3;
pub const EXIT_REMOTE: u8 = 4;
pub const EXIT_NOT_FOUND: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            request_id: None,
            data,
        };
        Self { exit_code: EXIT_OK, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            request_id: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn config_failure(command: &str, error: &ConfigError) -> Self {
        Self::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    }

    pub fn from_error(command: &str, error: CommandError) -> Self {
        let (error_class, exit_code) = error.classify();
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: error.message(),
            request_id: error.request_id(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Why a command failed: a local input problem (unreadable file, bad flag
/// value) or a workflow error from the orchestrator.
#[derive(Debug)]
pub enum CommandError {
    Input(anyhow::Error),
    Workflow(WorkflowError),
}

impl From<WorkflowError> for CommandError {
    fn from(error: WorkflowError) -> Self {
        Self::Workflow(error)
    }
}

impl From<anyhow::Error> for CommandError {
    fn from(error: anyhow::Error) -> Self {
        Self::Input(error)
    }
}

impl CommandError {
    fn classify(&self) -> (&'static str, u8) {
        match self {
            Self::Input(_) => ("input", EXIT_VALIDATION),
            Self::Workflow(WorkflowError::Validation { .. } | WorkflowError::Domain(_)) => {
                ("validation", EXIT_VALIDATION)
            }
            Self::Workflow(WorkflowError::NotFound { .. }) => ("not_found", EXIT_NOT_FOUND),
            Self::Workflow(WorkflowError::Remote(_)) => ("remote_service", EXIT_REMOTE),
            Self::Workflow(WorkflowError::Internal(_)) => ("internal", EXIT_INTERNAL),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Input(error) => format!("{error:#}"),
            Self::Workflow(error) => error.detail(),
        }
    }

    fn request_id(&self) -> Option<String> {
        match self {
            Self::Input(_) => None,
            Self::Workflow(error) => error.request_id().map(ToOwned::to_owned),
        }
    }
}

/// Runs `work` against an orchestrator for the configured service on a
/// current-thread runtime and renders the outcome.
pub(crate) fn execute<T, F, Fut>(
    command: &str,
    config: &AppConfig,
    message: &str,
    work: F,
) -> CommandResult
where
    T: Serialize,
    F: FnOnce(WorkflowOrchestrator<HttpEstimationService>) -> Fut,
    Fut: Future<Output = Result<T, CommandError>>,
{
    let service = match HttpEstimationService::from_config(&config.service) {
        Ok(service) => service,
        Err(error) => return CommandResult::from_error(command, WorkflowError::from(error).into()),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_INTERNAL,
            );
        }
    };

    match runtime.block_on(work(WorkflowOrchestrator::new(service))) {
        Ok(value) => match serde_json::to_value(value) {
            Ok(data) => CommandResult::success(command, message, Some(data)),
            Err(error) => CommandResult::failure(
                command,
                "serialization",
                error.to_string(),
                EXIT_INTERNAL,
            ),
        },
        Err(error) => CommandResult::from_error(command, error),
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\
             \"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
