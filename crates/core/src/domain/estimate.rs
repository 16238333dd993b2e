use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::takeoff::QuantitiesInput;
use crate::errors::WorkflowError;

/// Pricing knobs that travel alongside `quantities`. All optional; the
/// service falls back to its configured policy. `policy`, `unit_costs_csv`
/// and `vendor_quotes_csv` are file paths on the service host, and blank
/// strings count as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_costs_csv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_quotes_csv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl EstimateOptions {
    pub fn is_interactive(&self) -> bool {
        self.mode.as_deref().is_some_and(|mode| mode.eq_ignore_ascii_case("interactive"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantityEstimateRequest {
    pub project_id: String,
    pub quantities: QuantitiesInput,
    #[serde(flatten)]
    pub options: EstimateOptions,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    #[default]
    Residential,
    Commercial,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishQuality {
    Economy,
    #[default]
    Standard,
    Premium,
    Luxury,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignComplexity {
    Simple,
    #[default]
    Moderate,
    Complex,
    Luxury,
}

/// Whole-building program attributes priced per square foot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgramRequest {
    #[serde(alias = "area_sqft")]
    pub area_sf: f64,
    #[serde(default)]
    pub project_type: ProjectType,
    #[serde(default, alias = "quality")]
    pub finish_quality: FinishQuality,
    #[serde(default, alias = "complexity")]
    pub design_complexity: DesignComplexity,
    #[serde(default)]
    pub special_features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl ProgramRequest {
    pub fn new(area_sf: f64) -> Self {
        Self {
            area_sf,
            project_type: ProjectType::default(),
            finish_quality: FinishQuality::default(),
            design_complexity: DesignComplexity::default(),
            special_features: Vec::new(),
            project_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if !self.area_sf.is_finite() || self.area_sf <= 0.0 {
            return Err(WorkflowError::validation("area_sf must be a positive number"));
        }
        Ok(())
    }
}

/// Body accepted by `/estimate` and `/v1/estimate`.
#[derive(Clone, Debug, PartialEq)]
pub enum EstimateRequest {
    Quantities(QuantityEstimateRequest),
    Program(ProgramRequest),
}

impl EstimateRequest {
    /// Bodies carrying `quantities` are priced line by line; anything else is
    /// read as program attributes.
    pub fn from_value(value: Value) -> Result<Self, WorkflowError> {
        if !value.is_object() {
            return Err(WorkflowError::validation("estimate request must be a JSON object"));
        }

        if value.get("quantities").is_some() {
            let request: QuantityEstimateRequest = serde_json::from_value(value)
                .map_err(|error| WorkflowError::validation(format!("invalid estimate: {error}")))?;
            if request.project_id.trim().is_empty() {
                return Err(WorkflowError::validation("project_id is required"));
            }
            return Ok(Self::Quantities(request));
        }

        let request: ProgramRequest = serde_json::from_value(value)
            .map_err(|error| WorkflowError::validation(format!("invalid estimate: {error}")))?;
        request.validate()?;
        Ok(Self::Program(request))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeSubtotal {
    pub trade: String,
    pub subtotal: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
enum SubtotalValue {
    Amount(f64),
    Block { subtotal: f64 },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
enum TradeSubtotals {
    List(Vec<TradeSubtotal>),
    Keyed(BTreeMap<String, SubtotalValue>),
}

impl Default for TradeSubtotals {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl TradeSubtotals {
    fn normalize(self) -> Vec<TradeSubtotal> {
        match self {
            Self::List(trades) => trades,
            Self::Keyed(trades) => trades
                .into_iter()
                .map(|(trade, value)| {
                    let subtotal = match value {
                        SubtotalValue::Amount(amount) => amount,
                        SubtotalValue::Block { subtotal } => subtotal,
                    };
                    TradeSubtotal { trade, subtotal }
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct CostBlock {
    total_cost: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct Totals {
    grand_total: Option<f64>,
}

/// Every estimate shape seen on the wire. Variants are tried in order; the
/// last one accepts any object so a missing total is reported as such
/// rather than as an unmatched shape.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
enum EstimateEnvelope {
    Ensemble {
        ensemble_estimate: CostBlock,
    },
    RuleBased {
        rule_based_estimate: CostBlock,
    },
    Flat {
        total_cost: f64,
    },
    Priced {
        #[serde(default)]
        totals: Option<Totals>,
        #[serde(default)]
        grand_total: Option<f64>,
        #[serde(default)]
        trades: TradeSubtotals,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateShape {
    Ensemble,
    RuleBased,
    FlatTotal,
    Priced,
}

#[derive(Debug, Error, PartialEq)]
pub enum EstimateShapeError {
    #[error("estimate body is not a JSON object")]
    NotAnObject,
    #[error("estimate body has no recognizable total")]
    MissingTotal,
    #[error("estimate total `{0}` is negative or not finite")]
    InvalidTotal(f64),
}

/// The one estimate shape the rest of the workflow sees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEstimate {
    pub grand_total: f64,
    pub trades: Vec<TradeSubtotal>,
    pub shape: EstimateShape,
    pub raw: Value,
}

impl NormalizedEstimate {
    pub fn from_value(raw: Value) -> Result<Self, EstimateShapeError> {
        if !raw.is_object() {
            return Err(EstimateShapeError::NotAnObject);
        }

        let envelope: EstimateEnvelope =
            serde_json::from_value(raw.clone()).map_err(|_| EstimateShapeError::MissingTotal)?;

        let (grand_total, trades, shape) = match envelope {
            EstimateEnvelope::Ensemble { ensemble_estimate } => {
                (ensemble_estimate.total_cost, Vec::new(), EstimateShape::Ensemble)
            }
            EstimateEnvelope::RuleBased { rule_based_estimate } => {
                (rule_based_estimate.total_cost, Vec::new(), EstimateShape::RuleBased)
            }
            EstimateEnvelope::Flat { total_cost } => {
                (total_cost, Vec::new(), EstimateShape::FlatTotal)
            }
            EstimateEnvelope::Priced { totals, grand_total, trades } => {
                let total = totals
                    .and_then(|totals| totals.grand_total)
                    .or(grand_total)
                    .ok_or(EstimateShapeError::MissingTotal)?;
                (total, trades.normalize(), EstimateShape::Priced)
            }
        };

        if !grand_total.is_finite() || grand_total < 0.0 {
            return Err(EstimateShapeError::InvalidTotal(grand_total));
        }

        Ok(Self { grand_total, trades, shape, raw })
    }
}
