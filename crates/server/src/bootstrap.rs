use std::path::PathBuf;
use std::sync::Arc;

use estimator_core::config::{AppConfig, ConfigError, LoadOptions};
use estimator_core::{
    AssessmentEngine, DeterministicAssessmentEngine, DeterministicPricer, EstimatePricer,
    PricingError,
};
use thiserror::Error;
use tracing::info;

use crate::store::ArtifactStore;

/// Shared handler state: the assessment engine, the pricer and the
/// artifact store.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn AssessmentEngine>,
    pub pricer: Arc<dyn EstimatePricer>,
    pub store: ArtifactStore,
}

impl AppState {
    pub fn new(
        engine: impl AssessmentEngine + 'static,
        pricer: impl EstimatePricer + 'static,
        store: ArtifactStore,
    ) -> Self {
        Self { engine: Arc::new(engine), pricer: Arc::new(pricer), store }
    }

    /// Builtin engine and pricer writing artifacts under `output_dir`.
    pub fn with_defaults(output_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            DeterministicAssessmentEngine::default(),
            DeterministicPricer::default(),
            ArtifactStore::new(output_dir),
        )
    }
}

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("output directory `{path}` could not be created: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        request_id = "bootstrap",
        output_dir = %config.server.output_dir.display(),
        "starting application bootstrap"
    );

    let output_dir = config.server.output_dir.clone();
    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(|source| BootstrapError::OutputDir { path: output_dir.clone(), source })?;

    let pricer = DeterministicPricer::from_policy_path(
        config.pricing.policy_path.as_deref(),
        config.pricing.default_region.clone(),
    )?;
    info!(
        event_name = "system.bootstrap.pricing_loaded",
        request_id = "bootstrap",
        policy = config
            .pricing
            .policy_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "builtin".to_string()),
        "pricing policy loaded"
    );

    let state = AppState::new(
        DeterministicAssessmentEngine::new(config.interactive.max_questions),
        pricer,
        ArtifactStore::new(output_dir),
    );
    Ok(Application { config, state })
}
