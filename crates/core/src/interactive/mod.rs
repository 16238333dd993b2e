pub mod inference;
pub mod overlays;
pub mod pdf;
pub mod plan;
pub mod questions;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::project::ProjectId;
use crate::domain::question::{
    validate_answers, AnswerSubmission, AnsweredQuestion, AppliedOverlay, CompletionStatus,
    PlanSignal, Question, QuestionSet, TradeInference,
};
use crate::errors::WorkflowError;

use self::plan::PlanDocument;
use self::questions::{generate_questions, DEFAULT_MAX_QUESTIONS};

/// Result of assessing one plan for one project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub project_id: String,
    pub plan_digest: String,
    pub coverage_score: f64,
    pub trades_inferred: Vec<TradeInference>,
    pub questions: Vec<Question>,
    pub signals: Vec<PlanSignal>,
}

impl Assessment {
    pub fn question_set(&self) -> QuestionSet {
        QuestionSet {
            project_id: self.project_id.clone(),
            plan_digest: self.plan_digest.clone(),
            questions: self.questions.clone(),
        }
    }
}

/// State after merging one batch of answers into a question set.
#[derive(Clone, Debug, PartialEq)]
pub struct QnaRound {
    pub answered: Vec<AnsweredQuestion>,
    pub next_questions: Vec<Question>,
    pub applied_overlays: Vec<AppliedOverlay>,
    pub completion_status: CompletionStatus,
    pub total_questions: usize,
}

pub trait AssessmentEngine: Send + Sync {
    fn assess(&self, project_id: &ProjectId, document: &PlanDocument) -> Assessment;

    fn merge_answers(
        &self,
        question_set: &QuestionSet,
        previous: &[AnsweredQuestion],
        submissions: &[AnswerSubmission],
    ) -> Result<QnaRound, WorkflowError>;
}

#[derive(Clone, Debug)]
pub struct DeterministicAssessmentEngine {
    max_questions: usize,
}

impl Default for DeterministicAssessmentEngine {
    fn default() -> Self {
        Self { max_questions: DEFAULT_MAX_QUESTIONS }
    }
}

impl DeterministicAssessmentEngine {
    pub fn new(max_questions: usize) -> Self {
        Self { max_questions: max_questions.max(1) }
    }
}

impl AssessmentEngine for DeterministicAssessmentEngine {
    fn assess(&self, project_id: &ProjectId, document: &PlanDocument) -> Assessment {
        let trades_inferred = inference::infer_trades(&document.features);
        let generated = generate_questions(
            project_id.as_str(),
            &document.features,
            document.layout.as_ref(),
            &trades_inferred,
            self.max_questions,
        );

        Assessment {
            project_id: project_id.to_string(),
            plan_digest: document.digest.clone(),
            coverage_score: inference::coverage_score(&trades_inferred),
            trades_inferred,
            questions: generated.questions,
            signals: generated.signals,
        }
    }

    fn merge_answers(
        &self,
        question_set: &QuestionSet,
        previous: &[AnsweredQuestion],
        submissions: &[AnswerSubmission],
    ) -> Result<QnaRound, WorkflowError> {
        validate_answers(submissions)?;

        let unknown: Vec<&str> = submissions
            .iter()
            .map(|submission| submission.id.trim())
            .filter(|id| question_set.find(id).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(WorkflowError::validation(format!(
                "unknown question ids for project `{}`: {}",
                question_set.project_id,
                unknown.join(", ")
            )));
        }

        let mut merged: BTreeMap<&str, String> = previous
            .iter()
            .filter(|answer| question_set.find(&answer.id).is_some())
            .map(|answer| (answer.id.as_str(), answer.answer.clone()))
            .collect();
        for submission in submissions {
            if let Some(value) = submission.value() {
                merged.insert(submission.id.trim(), value.to_string());
            }
        }

        let mut answered = Vec::new();
        let mut next_questions = Vec::new();
        for question in &question_set.questions {
            match merged.get(question.id.as_str()) {
                Some(answer) => answered.push(AnsweredQuestion {
                    id: question.id.clone(),
                    question: question.prompt.clone(),
                    answer: answer.clone(),
                    severity: question.severity,
                    trade: question.trade.clone(),
                }),
                None => next_questions.push(question.clone()),
            }
        }

        Ok(QnaRound {
            applied_overlays: overlays::overlays_for(&question_set.project_id, &answered),
            completion_status: CompletionStatus::from_remaining(next_questions.len()),
            total_questions: question_set.questions.len(),
            answered,
            next_questions,
        })
    }
}
