use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;

pub const EMPTY_ANSWERS_DETAIL: &str = "answers array cannot be empty";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Normal,
    NiceToHave,
    #[serde(other)]
    Other,
}

impl Severity {
    /// Sort rank; lower ranks are asked first.
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Normal => 1,
            Self::NiceToHave => 2,
            Self::Other => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedAnswer {
    pub key: String,
    pub label: String,
}

impl SuggestedAnswer {
    pub fn new(key: &str, label: &str) -> Self {
        Self { key: key.to_string(), label: label.to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub trade: String,
    pub severity: Severity,
    #[serde(default)]
    pub rationale: String,
    #[serde(alias = "question")]
    pub prompt: String,
    #[serde(default)]
    pub suggested_answers: Vec<SuggestedAnswer>,
}

/// An answer as submitted by a caller. The service tolerates `key`, `answer`
/// and `text`; the first non-blank one wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AnswerSubmission {
    pub fn keyed(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self { id: id.into(), key: Some(key.into()), answer: None, text: None }
    }

    pub fn free_text(id: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { id: id.into(), key: None, answer: Some(answer.into()), text: None }
    }

    pub fn value(&self) -> Option<&str> {
        [&self.key, &self.answer, &self.text]
            .into_iter()
            .flatten()
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }
}

/// Shape checks shared by the orchestrator and the service.
pub fn validate_answers(answers: &[AnswerSubmission]) -> Result<(), WorkflowError> {
    if answers.is_empty() {
        return Err(WorkflowError::validation(EMPTY_ANSWERS_DETAIL));
    }

    for (index, answer) in answers.iter().enumerate() {
        if answer.id.trim().is_empty() {
            return Err(WorkflowError::validation(format!("answers[{index}].id is required")));
        }
        if answer.value().is_none() {
            return Err(WorkflowError::validation(format!(
                "answers[{index}] must carry a non-empty `key` or `answer`"
            )));
        }
    }

    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trade: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedOverlay {
    pub question_id: String,
    pub trade: String,
    pub key: String,
    pub multiplier: f64,
    pub source: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    InProgress,
    Complete,
    #[serde(other)]
    Unknown,
}

impl CompletionStatus {
    pub fn from_remaining(remaining: usize) -> Self {
        if remaining == 0 {
            Self::Complete
        } else {
            Self::InProgress
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QnaResponse {
    pub project_id: String,
    pub answered: Vec<AnsweredQuestion>,
    pub next_questions: Vec<Question>,
    pub completion_status: CompletionStatus,
    pub total_answered: usize,
    pub total_questions: usize,
    #[serde(default)]
    pub applied_overlays: Vec<AppliedOverlay>,
    pub request_id: String,
}

impl QnaResponse {
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.total_answered != self.answered.len() {
            return Err(format!(
                "total_answered ({}) does not match answered entries ({})",
                self.total_answered,
                self.answered.len()
            ));
        }
        if self.total_answered > self.total_questions {
            return Err(format!(
                "total_answered ({}) exceeds total_questions ({})",
                self.total_answered, self.total_questions
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSignal {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl PlanSignal {
    pub fn new(kind: &str, value: impl Into<String>) -> Self {
        Self { kind: kind.to_string(), value: value.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferredItem {
    pub item: String,
    pub confidence: f64,
    #[serde(default)]
    pub signals: Vec<PlanSignal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "TradeInferenceRepr")]
pub struct TradeInference {
    pub trade: String,
    pub items: Vec<InferredItem>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TradeInferenceRepr {
    Name(String),
    Detailed {
        trade: String,
        #[serde(default)]
        items: Vec<InferredItem>,
    },
}

impl From<TradeInferenceRepr> for TradeInference {
    fn from(value: TradeInferenceRepr) -> Self {
        match value {
            TradeInferenceRepr::Name(trade) => Self { trade, items: Vec::new() },
            TradeInferenceRepr::Detailed { trade, items } => Self { trade, items },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssessResponse {
    pub project_id: String,
    pub coverage_score: f64,
    pub trades_inferred: Vec<TradeInference>,
    pub questions_ref: String,
    pub request_id: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub signals: Vec<PlanSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_digest: Option<String>,
}

/// The persisted question set for a project (`QUESTIONS.json`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub project_id: String,
    pub plan_digest: String,
    pub questions: Vec<Question>,
}

impl QuestionSet {
    pub fn find(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == id)
    }
}
