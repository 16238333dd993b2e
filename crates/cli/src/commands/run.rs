use clap::Args;
use estimator_client::{HttpEstimationService, PipelineReport, ProjectSession, WorkflowOrchestrator};
use estimator_core::config::AppConfig;
use estimator_core::AnswerSubmission;

use crate::commands::inputs::{parse_answer, PlanArgs, PricingArgs};
use crate::commands::{execute, CommandError, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(long, help = "Project identifier")]
    pub project: String,
    #[command(flatten)]
    pub plan: PlanArgs,
    #[arg(
        long = "answer",
        value_name = "QUESTION_ID=ANSWER",
        value_parser = parse_answer,
        help = "Answer to submit after assessment; repeat for several"
    )]
    pub answers: Vec<AnswerSubmission>,
    #[command(flatten)]
    pub pricing: PricingArgs,
}

/// Takeoff, baseline estimate, assessment and an optional QnA round with a
/// refined estimate, in one go.
pub fn run(config: &AppConfig, args: RunArgs) -> CommandResult {
    let default_region = config.pricing.default_region.clone();
    execute("run", config, "pipeline completed", |orchestrator| {
        pipeline(orchestrator, args, default_region)
    })
}

async fn pipeline(
    orchestrator: WorkflowOrchestrator<HttpEstimationService>,
    args: RunArgs,
    default_region: Option<String>,
) -> Result<PipelineReport, CommandError> {
    let plan = args.plan.plan_input()?;
    let mut options = args.pricing.estimate_options()?;
    options.region = options.region.or(default_region);
    let mut session = ProjectSession::new(&args.project)?;
    Ok(orchestrator.run_pipeline(&mut session, plan, &args.answers, options).await?)
}
