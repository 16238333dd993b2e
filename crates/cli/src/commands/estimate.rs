use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Args;
use estimator_client::{HttpEstimationService, ProjectSession, WorkflowOrchestrator};
use estimator_core::config::AppConfig;
use estimator_core::{NormalizedEstimate, ProgramRequest};
use serde_json::{json, Map, Value};

use crate::commands::inputs::{read_quantities, PricingArgs};
use crate::commands::{execute, CommandError, CommandResult};

#[derive(Debug, Clone, Default, Args)]
pub struct EstimateArgs {
    #[arg(long, help = "Project identifier")]
    pub project: String,
    #[arg(
        long,
        conflicts_with = "area_sf",
        help = "Quantities JSON: a takeoff result, its trades, or a quantity table"
    )]
    pub quantities: Option<PathBuf>,
    #[arg(long, help = "Gross floor area in square feet (program estimate)")]
    pub area_sf: Option<f64>,
    #[arg(long, requires = "area_sf", help = "Project type: residential or commercial")]
    pub project_type: Option<String>,
    #[arg(
        long,
        requires = "area_sf",
        help = "Finish quality: economy, standard, premium or luxury"
    )]
    pub quality: Option<String>,
    #[arg(
        long,
        requires = "area_sf",
        help = "Design complexity: simple, moderate, complex or luxury"
    )]
    pub complexity: Option<String>,
    #[arg(long = "feature", requires = "area_sf", help = "Special feature; repeat for several")]
    pub features: Vec<String>,
    #[command(flatten)]
    pub pricing: PricingArgs,
}

impl EstimateArgs {
    fn program_request(&self, area_sf: f64) -> anyhow::Result<ProgramRequest> {
        let mut body = Map::new();
        body.insert("area_sf".to_string(), json!(area_sf));
        body.insert("project_id".to_string(), json!(self.project));
        body.insert("special_features".to_string(), json!(self.features));
        for (key, value) in [
            ("project_type", &self.project_type),
            ("finish_quality", &self.quality),
            ("design_complexity", &self.complexity),
        ] {
            if let Some(value) = value {
                body.insert(key.to_string(), json!(value.trim().to_ascii_lowercase()));
            }
        }
        serde_json::from_value(Value::Object(body)).context("invalid program description")
    }
}

pub fn run(config: &AppConfig, args: EstimateArgs) -> CommandResult {
    let default_region = config.pricing.default_region.clone();
    execute("estimate", config, "estimate priced", |orchestrator| {
        estimate(orchestrator, args, default_region)
    })
}

async fn estimate(
    orchestrator: WorkflowOrchestrator<HttpEstimationService>,
    args: EstimateArgs,
    default_region: Option<String>,
) -> Result<NormalizedEstimate, CommandError> {
    if let Some(area_sf) = args.area_sf {
        let request = args.program_request(area_sf)?;
        return Ok(orchestrator.run_program_estimate(&request).await?);
    }

    let Some(path) = args.quantities.as_deref() else {
        return Err(CommandError::Input(anyhow!("estimate needs --quantities or --area-sf")));
    };
    let quantities = read_quantities(path)?;
    let mut options = args.pricing.estimate_options()?;
    options.region = options.region.or(default_region);
    let mut session = ProjectSession::new(&args.project)?;
    Ok(orchestrator.run_estimate(&mut session, quantities, options).await?)
}

#[cfg(test)]
mod tests {
    use super::EstimateArgs;

    #[test]
    fn program_flags_build_a_program_request() {
        let args = EstimateArgs {
            project: "p-program".to_string(),
            quality: Some("Premium".to_string()),
            features: vec!["elevator".to_string()],
            ..EstimateArgs::default()
        };

        let request = args.program_request(5000.0).expect("program request");
        assert_eq!(request.area_sf, 5000.0);
        assert_eq!(request.project_id.as_deref(), Some("p-program"));
        assert_eq!(request.special_features, vec!["elevator".to_string()]);
    }

    #[test]
    fn unknown_quality_is_rejected_locally() {
        let args = EstimateArgs {
            project: "p-program".to_string(),
            quality: Some("gold-plated".to_string()),
            ..EstimateArgs::default()
        };

        assert!(args.program_request(5000.0).is_err());
    }
}
