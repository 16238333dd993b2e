use clap::Args;
use estimator_client::{HttpEstimationService, WorkflowOrchestrator};
use estimator_core::config::AppConfig;
use estimator_core::{AnswerSubmission, ProjectId, QnaResponse};

use crate::commands::inputs::parse_answer;
use crate::commands::{execute, CommandError, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct QnaArgs {
    #[arg(long, help = "Project identifier")]
    pub project: String,
    #[arg(
        long = "answer",
        value_name = "QUESTION_ID=ANSWER",
        value_parser = parse_answer,
        help = "Answer to an open question; repeat for several"
    )]
    pub answers: Vec<AnswerSubmission>,
}

/// Answers questions from an earlier `assess`, resuming the session from
/// the service's stored state.
pub fn run(config: &AppConfig, args: QnaArgs) -> CommandResult {
    execute("qna", config, "answers recorded", |orchestrator| answer(orchestrator, args))
}

async fn answer(
    orchestrator: WorkflowOrchestrator<HttpEstimationService>,
    args: QnaArgs,
) -> Result<QnaResponse, CommandError> {
    let project_id = ProjectId::parse(&args.project)?;
    let mut session = orchestrator.resume_session(&project_id).await?;
    Ok(orchestrator.run_qna(&mut session, &args.answers).await?)
}
