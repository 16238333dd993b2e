pub mod assistant;
pub mod config;
pub mod domain;
pub mod errors;
pub mod interactive;
pub mod pricing;

pub use domain::estimate::{EstimateRequest, NormalizedEstimate, ProgramRequest};
pub use domain::project::{ProjectId, WorkflowState};
pub use domain::question::{
    AnswerSubmission, AnsweredQuestion, AppliedOverlay, AssessResponse, QnaResponse, Question,
    QuestionSet, Severity,
};
pub use domain::takeoff::{QuantitiesInput, TakeoffResult};
pub use errors::{DomainError, ErrorBody, ErrorCode, RemoteServiceError, WorkflowError};
pub use interactive::{Assessment, AssessmentEngine, DeterministicAssessmentEngine};
pub use pricing::{DeterministicPricer, EstimatePricer, PricingError};
