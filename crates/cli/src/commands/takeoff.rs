use clap::Args;
use estimator_client::{HttpEstimationService, ProjectSession, WorkflowOrchestrator};
use estimator_core::config::AppConfig;
use estimator_core::TakeoffResult;

use crate::commands::inputs::PlanArgs;
use crate::commands::{execute, CommandError, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct TakeoffArgs {
    #[arg(long, help = "Project identifier")]
    pub project: String,
    #[command(flatten)]
    pub plan: PlanArgs,
}

pub fn run(config: &AppConfig, args: TakeoffArgs) -> CommandResult {
    execute("takeoff", config, "takeoff completed", |orchestrator| takeoff(orchestrator, args))
}

async fn takeoff(
    orchestrator: WorkflowOrchestrator<HttpEstimationService>,
    args: TakeoffArgs,
) -> Result<TakeoffResult, CommandError> {
    let mut session = ProjectSession::new(&args.project)?;
    let plan = args.plan.plan_input()?;
    Ok(orchestrator.run_takeoff(&mut session, plan).await?)
}
