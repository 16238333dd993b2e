pub mod documents;
pub mod policy;
pub mod program;
pub mod quantity;

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

use crate::domain::estimate::{ProgramRequest, QuantityEstimateRequest};
use crate::domain::question::AppliedOverlay;
use crate::errors::WorkflowError;

use self::documents::{read_policy, PricingDocuments};
use self::policy::PolicyDocument;
use self::program::{estimate_program, ProgramEstimate};
use self::quantity::{price_quantities, PricedEstimate, QuantityPricingInput};

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("invalid pricing policy: {0}")]
    Policy(String),
    #[error("pricing policy has no region `{0}`")]
    UnknownRegion(String),
    #[error("{field} file not found: {}", .path.display())]
    MissingFile { field: &'static str, path: PathBuf },
    #[error("failed to read {field} file `{}`: {source}", .path.display())]
    ReadFile {
        field: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<PricingError> for WorkflowError {
    fn from(error: PricingError) -> Self {
        match error {
            PricingError::ReadFile { .. } => WorkflowError::Internal(error.to_string()),
            other => WorkflowError::validation(other.to_string()),
        }
    }
}

pub fn decimal_from_f64(field: &str, value: f64) -> Result<Decimal, PricingError> {
    if !value.is_finite() {
        return Err(PricingError::InvalidInput(format!("{field} must be a finite number")));
    }
    Decimal::try_from(value)
        .map_err(|_| PricingError::InvalidInput(format!("{field} is out of range: {value}")))
}

pub trait EstimatePricer: Send + Sync {
    fn price_program(&self, request: &ProgramRequest) -> Result<ProgramEstimate, PricingError>;

    /// Prices a quantity request after rescaling it by `overlays`. Reads the
    /// pricing files the request names, so it blocks.
    fn price_quantities(
        &self,
        request: &QuantityEstimateRequest,
        overlays: &[AppliedOverlay],
    ) -> Result<PricedEstimate, PricingError>;
}

/// Rule-based program pricing plus the v0 line pricer. The configured policy
/// and region apply whenever a request does not name its own.
#[derive(Clone, Debug, Default)]
pub struct DeterministicPricer {
    default_policy: Option<PolicyDocument>,
    default_region: Option<String>,
}

impl DeterministicPricer {
    pub fn new(default_policy: Option<PolicyDocument>, default_region: Option<String>) -> Self {
        Self { default_policy, default_region }
    }

    pub fn from_policy_path(
        path: Option<&Path>,
        default_region: Option<String>,
    ) -> Result<Self, PricingError> {
        let default_policy = path.map(|path| read_policy("pricing.policy_path", path)).transpose()?;
        Ok(Self::new(default_policy, default_region))
    }
}

impl EstimatePricer for DeterministicPricer {
    fn price_program(&self, request: &ProgramRequest) -> Result<ProgramEstimate, PricingError> {
        estimate_program(request)
    }

    fn price_quantities(
        &self,
        request: &QuantityEstimateRequest,
        overlays: &[AppliedOverlay],
    ) -> Result<PricedEstimate, PricingError> {
        let mut quantities = request.quantities.clone();
        quantities.apply_overlays(overlays);
        let lines = quantities.into_lines();

        let options = &request.options;
        let documents = PricingDocuments::load(options)?;
        let region = options.region.as_deref().or(self.default_region.as_deref());

        let mut estimate = price_quantities(QuantityPricingInput {
            lines: &lines,
            policy: documents.policy.as_ref().or(self.default_policy.as_ref()),
            region,
            unit_costs_csv: documents.unit_costs_csv.as_deref(),
            vendor_quotes_csv: documents.vendor_quotes_csv.as_deref(),
        })?;

        if options.is_interactive() {
            estimate.metadata = Some(json!({
                "interactive": {
                    "project_id": request.project_id,
                    "applied_overlays": overlays,
                }
            }));
        }
        Ok(estimate)
    }
}
