use clap::Args;
use estimator_client::{HttpEstimationService, ProjectSession, WorkflowOrchestrator};
use estimator_core::config::AppConfig;
use estimator_core::AssessResponse;

use crate::commands::inputs::PlanArgs;
use crate::commands::{execute, CommandError, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct AssessArgs {
    #[arg(long, help = "Project identifier")]
    pub project: String,
    #[command(flatten)]
    pub plan: PlanArgs,
}

pub fn run(config: &AppConfig, args: AssessArgs) -> CommandResult {
    execute("assess", config, "plan assessed", |orchestrator| assess(orchestrator, args))
}

async fn assess(
    orchestrator: WorkflowOrchestrator<HttpEstimationService>,
    args: AssessArgs,
) -> Result<AssessResponse, CommandError> {
    let mut session = ProjectSession::new(&args.project)?;
    let plan = args.plan.plan_source()?;
    Ok(orchestrator.run_assess(&mut session, plan).await?)
}
