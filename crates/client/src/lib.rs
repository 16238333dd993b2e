//! Client-side orchestration of the estimation workflow: takeoff, estimate,
//! interactive assessment and question answering against a remote service.

pub mod orchestrator;
pub mod service;
pub mod session;

pub use orchestrator::{PipelineReport, PlanInput, WorkflowOrchestrator};
pub use service::{EstimationService, FileUpload, HttpEstimationService, ServiceResponse};
pub use session::ProjectSession;
