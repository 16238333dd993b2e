use estimator_core::domain::estimate::NormalizedEstimate;
use estimator_core::domain::question::CompletionStatus;
use estimator_core::{
    AnsweredQuestion, AppliedOverlay, AssessResponse, DomainError, ProjectId, QnaResponse,
    QuantitiesInput, Question, TakeoffResult, WorkflowError, WorkflowState,
};
use serde::{Deserialize, Serialize};

/// Everything the orchestrator knows about one project. Owned by the caller
/// and passed into each operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectSession {
    pub project_id: ProjectId,
    pub state: WorkflowState,
    #[serde(default)]
    pub takeoff: Option<TakeoffResult>,
    #[serde(default)]
    pub estimate: Option<NormalizedEstimate>,
    #[serde(default)]
    pub assessment: Option<AssessResponse>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub answered: Vec<AnsweredQuestion>,
    #[serde(default)]
    pub applied_overlays: Vec<AppliedOverlay>,
    #[serde(default)]
    pub completion_status: Option<CompletionStatus>,
    #[serde(default)]
    pub last_request_id: Option<String>,
}

impl ProjectSession {
    pub fn new(project_id: &str) -> Result<Self, WorkflowError> {
        Ok(Self {
            project_id: ProjectId::parse(project_id)?,
            state: WorkflowState::Unassessed,
            takeoff: None,
            estimate: None,
            assessment: None,
            questions: Vec::new(),
            answered: Vec::new(),
            applied_overlays: Vec::new(),
            completion_status: None,
            last_request_id: None,
        })
    }

    /// A session positioned after a stored assessment and, when present, the
    /// last QnA round.
    pub fn resume(
        project_id: ProjectId,
        questions: Vec<Question>,
        assessment: Option<AssessResponse>,
        last_qna: Option<&QnaResponse>,
    ) -> Result<Self, DomainError> {
        let mut session = Self {
            project_id,
            state: WorkflowState::Assessed,
            takeoff: None,
            estimate: None,
            last_request_id: assessment.as_ref().map(|assessment| assessment.request_id.clone()),
            assessment,
            questions,
            answered: Vec::new(),
            applied_overlays: Vec::new(),
            completion_status: None,
        };
        if let Some(qna) = last_qna {
            session.record_qna(qna)?;
        }
        Ok(session)
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == id)
    }

    /// A fresh assessment replaces the question set and forgets earlier answers.
    pub fn record_assessment(&mut self, response: AssessResponse) -> Result<(), DomainError> {
        self.state.transition_to(WorkflowState::Assessed)?;
        self.questions = response.questions.clone();
        self.answered.clear();
        self.applied_overlays.clear();
        self.completion_status = None;
        self.last_request_id = Some(response.request_id.clone());
        self.assessment = Some(response);
        Ok(())
    }

    /// The round is terminal exactly when it leaves no open questions;
    /// the reported `completion_status` does not override that.
    pub fn record_qna(&mut self, response: &QnaResponse) -> Result<(), DomainError> {
        let remaining = response.next_questions.len();
        self.state.transition_to(WorkflowState::after_answers(remaining))?;

        for question in &response.next_questions {
            if self.question(&question.id).is_none() {
                self.questions.push(question.clone());
            }
        }
        self.answered = response.answered.clone();
        self.applied_overlays = response.applied_overlays.clone();
        self.completion_status = Some(CompletionStatus::from_remaining(remaining));
        self.last_request_id = Some(response.request_id.clone());
        Ok(())
    }

    /// `quantities` rescaled by the overlays from the latest QnA round.
    pub fn overlaid_quantities(&self, mut quantities: QuantitiesInput) -> QuantitiesInput {
        quantities.apply_overlays(&self.applied_overlays);
        quantities
    }

    /// Drops all interactive state, as after a remote cleanup.
    pub fn reset(&mut self) {
        self.state = WorkflowState::Unassessed;
        self.assessment = None;
        self.questions.clear();
        self.answered.clear();
        self.applied_overlays.clear();
        self.completion_status = None;
    }
}
