use estimator_core::config::AppConfig;

use crate::commands::{execute, CommandError, CommandResult};

pub fn run(config: &AppConfig) -> CommandResult {
    execute("health", config, "estimation service is reachable", |orchestrator| async move {
        orchestrator.health().await.map_err(CommandError::from)
    })
}
