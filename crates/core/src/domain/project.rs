use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, WorkflowError};

const MAX_PROJECT_ID_LEN: usize = 128;

/// Caller-supplied project identifier. Names a directory under the output
/// root, so the accepted alphabet is deliberately narrow.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    pub fn parse(raw: &str) -> Result<Self, WorkflowError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(WorkflowError::validation("project_id is required"));
        }
        if trimmed.len() > MAX_PROJECT_ID_LEN {
            return Err(WorkflowError::validation(format!(
                "project_id must be at most {MAX_PROJECT_ID_LEN} characters"
            )));
        }
        if trimmed == "." || trimmed == ".." {
            return Err(WorkflowError::validation("project_id may not be `.` or `..`"));
        }
        let valid = trimmed.chars().all(|ch| ch.is_ascii_alphanumeric() || "-_.".contains(ch));
        if !valid {
            return Err(WorkflowError::validation(
                "project_id may only contain ASCII letters, digits, `-`, `_` and `.`",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProjectId {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProjectId> for String {
    fn from(value: ProjectId) -> Self {
        value.0
    }
}

/// Per-project interactive lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    #[default]
    Unassessed,
    Assessed,
    PartiallyAnswered,
    FullyAnswered,
}

impl WorkflowState {
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::{Assessed, FullyAnswered, PartiallyAnswered};

        matches!(
            (self, next),
            (_, Assessed)
                | (Assessed, PartiallyAnswered)
                | (Assessed, FullyAnswered)
                | (PartiallyAnswered, PartiallyAnswered)
                | (PartiallyAnswered, FullyAnswered)
        )
    }

    pub fn transition_to(&mut self, next: WorkflowState) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            *self = next;
            return Ok(());
        }

        Err(DomainError::InvalidWorkflowTransition { from: *self, to: next })
    }

    pub fn accepts_answers(self) -> bool {
        matches!(self, Self::Assessed | Self::PartiallyAnswered)
    }

    /// State reached after a QnA round leaves `remaining` open questions.
    pub fn after_answers(remaining: usize) -> Self {
        if remaining == 0 {
            Self::FullyAnswered
        } else {
            Self::PartiallyAnswered
        }
    }
}
