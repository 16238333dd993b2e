use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::estimate::{DesignComplexity, FinishQuality, ProgramRequest, ProjectType};
use crate::pricing::{decimal_from_f64, PricingError};

pub const RULE_BASED_METHOD: &str = "rule_based";

enum FeatureCost {
    Lump(i64),
    PerSquareFoot(i64),
}

const SPECIAL_FEATURES: &[(&str, FeatureCost)] = &[
    ("pool_standard", FeatureCost::Lump(50_000)),
    ("pool_luxury", FeatureCost::Lump(150_000)),
    ("pool_infinity", FeatureCost::Lump(300_000)),
    ("outdoor_kitchen", FeatureCost::Lump(25_000)),
    ("wine_cellar", FeatureCost::Lump(50_000)),
    ("home_theater", FeatureCost::Lump(75_000)),
    ("elevator", FeatureCost::Lump(50_000)),
    ("smart_home_basic", FeatureCost::PerSquareFoot(5)),
    ("smart_home_advanced", FeatureCost::PerSquareFoot(15)),
    ("generator_whole_house", FeatureCost::Lump(15_000)),
];

/// Soft cost rates as percentages of hard cost, expressed in basis points.
struct SoftCostRates {
    design: i64,
    project_management: i64,
    permits: i64,
    testing: i64,
    overhead: i64,
    profit: i64,
    contingency: i64,
}

const RESIDENTIAL_SOFT: SoftCostRates = SoftCostRates {
    design: 600,
    project_management: 400,
    permits: 200,
    testing: 150,
    overhead: 1200,
    profit: 750,
    contingency: 600,
};

const COMMERCIAL_SOFT: SoftCostRates = SoftCostRates {
    design: 800,
    project_management: 600,
    permits: 250,
    testing: 200,
    overhead: 1500,
    profit: 1000,
    contingency: 750,
};

fn basis_points(value: i64) -> Decimal {
    Decimal::new(value, 4)
}

fn base_cost_per_sf(project_type: ProjectType) -> i64 {
    match project_type {
        ProjectType::Residential => 360,
        ProjectType::Commercial => 350,
    }
}

fn quality_adjustment(quality: FinishQuality) -> i64 {
    match quality {
        FinishQuality::Economy => -60,
        FinishQuality::Standard => 0,
        FinishQuality::Premium => 40,
        FinishQuality::Luxury => 90,
    }
}

fn complexity_adjustment(complexity: DesignComplexity) -> i64 {
    match complexity {
        DesignComplexity::Simple => -25,
        DesignComplexity::Moderate => 0,
        DesignComplexity::Complex => 50,
        DesignComplexity::Luxury => 90,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HardCosts {
    #[serde(with = "rust_decimal::serde::float")]
    pub base_construction: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub special_features: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_hard: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoftCosts {
    #[serde(with = "rust_decimal::serde::float")]
    pub design: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub project_management: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub permits: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub testing: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub overhead: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub profit: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub contingency: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_soft: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgramBreakdown {
    pub project_type: ProjectType,
    pub finish_quality: FinishQuality,
    pub design_complexity: DesignComplexity,
    pub base_construction_per_sf: i64,
    pub adjusted_cost_per_sf: i64,
    pub hard_costs: HardCosts,
    pub soft_costs: SoftCosts,
    #[serde(default)]
    pub unrecognized_features: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleBasedEstimate {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_per_sf: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub hard_costs: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub soft_costs: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnsembleEstimate {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_per_sf: Decimal,
    pub method: String,
    pub training_projects: u32,
}

/// Response of the program estimate. No learned model backs the reference
/// service, so `ml_estimate` is always null and the ensemble equals the
/// rule-based figure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgramEstimate {
    pub rule_based_estimate: RuleBasedEstimate,
    pub ml_estimate: Option<serde_json::Value>,
    pub ensemble_estimate: EnsembleEstimate,
    pub confidence: String,
    pub breakdown: ProgramBreakdown,
}

pub fn estimate_program(request: &ProgramRequest) -> Result<ProgramEstimate, PricingError> {
    if !request.area_sf.is_finite() || request.area_sf <= 0.0 {
        return Err(PricingError::InvalidInput("area_sf must be a positive number".to_string()));
    }
    let area = decimal_from_f64("area_sf", request.area_sf)?;

    let base_per_sf = base_cost_per_sf(request.project_type);
    let adjusted_per_sf = base_per_sf
        + quality_adjustment(request.finish_quality)
        + complexity_adjustment(request.design_complexity);
    let base_construction = area * Decimal::from(adjusted_per_sf);

    let mut features_cost = Decimal::ZERO;
    let mut unrecognized_features = Vec::new();
    for feature in &request.special_features {
        let key = feature.trim().to_ascii_lowercase();
        match SPECIAL_FEATURES.iter().find(|(name, _)| *name == key) {
            Some((_, FeatureCost::Lump(cost))) => features_cost += Decimal::from(*cost),
            Some((_, FeatureCost::PerSquareFoot(cost))) => {
                features_cost += Decimal::from(*cost) * area;
            }
            None => unrecognized_features.push(feature.clone()),
        }
    }

    let total_hard = base_construction + features_cost;
    let rates = match request.project_type {
        ProjectType::Residential => &RESIDENTIAL_SOFT,
        ProjectType::Commercial => &COMMERCIAL_SOFT,
    };
    let portion = |rate: i64| (total_hard * basis_points(rate)).round_dp(2);
    let mut soft_costs = SoftCosts {
        design: portion(rates.design),
        project_management: portion(rates.project_management),
        permits: portion(rates.permits),
        testing: portion(rates.testing),
        overhead: portion(rates.overhead),
        profit: portion(rates.profit),
        contingency: portion(rates.contingency),
        total_soft: Decimal::ZERO,
    };
    soft_costs.total_soft = soft_costs.design
        + soft_costs.project_management
        + soft_costs.permits
        + soft_costs.testing
        + soft_costs.overhead
        + soft_costs.profit
        + soft_costs.contingency;

    let total_cost = (total_hard + soft_costs.total_soft).round_dp(2);
    let cost_per_sf = (total_cost / area).round_dp(2);

    Ok(ProgramEstimate {
        rule_based_estimate: RuleBasedEstimate {
            total_cost,
            cost_per_sf,
            hard_costs: total_hard.round_dp(2),
            soft_costs: soft_costs.total_soft,
        },
        ml_estimate: None,
        ensemble_estimate: EnsembleEstimate {
            total_cost,
            cost_per_sf,
            method: RULE_BASED_METHOD.to_string(),
            training_projects: 0,
        },
        confidence: "low".to_string(),
        breakdown: ProgramBreakdown {
            project_type: request.project_type,
            finish_quality: request.finish_quality,
            design_complexity: request.design_complexity,
            base_construction_per_sf: base_per_sf,
            adjusted_cost_per_sf: adjusted_per_sf,
            hard_costs: HardCosts {
                base_construction: base_construction.round_dp(2),
                special_features: features_cost.round_dp(2),
                total_hard: total_hard.round_dp(2),
            },
            soft_costs,
            unrecognized_features,
        },
    })
}
