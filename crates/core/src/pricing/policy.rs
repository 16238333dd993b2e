use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::PricingError;

pub const DEFAULT_POLICY_ID: &str = "pricing_policy.v0";

/// Built-in policy used when neither the request nor the configuration
/// supplies one. `policy_defaults` prices the per-trade default items a
/// text-layer takeoff produces.
pub const BUILTIN_POLICY_TOML: &str = r#"
policy_id = "pricing_policy.v0"
region = "default"
tax_pct = 0.0
escalation_pct = 0.0
resolution_order = ["vendor_quotes", "unit_costs", "policy_defaults"]

[markups]
overhead_pct = 0.10
profit_pct = 0.05

[waste_defaults]
global_pct = 0.03
concrete = 0.05

[policy_defaults.concrete]
concrete_default = 12000.0
[policy_defaults.framing]
framing_default = 18000.0
[policy_defaults.roofing]
roofing_default = 9500.0
[policy_defaults.plumbing]
plumbing_default = 14000.0
[policy_defaults.electrical]
electrical_default = 12500.0
[policy_defaults.hvac]
hvac_default = 11000.0
[policy_defaults.drywall]
drywall_default = 6500.0
[policy_defaults.paint]
paint_default = 4800.0
[policy_defaults.flooring]
flooring_default = 8500.0
[policy_defaults.windows]
windows_default = 7500.0
[policy_defaults.insulation]
insulation_default = 3500.0
[policy_defaults.sitework]
sitework_default = 10000.0
"#;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolicyFormat {
    #[default]
    Toml,
    Yaml,
}

impl PolicyFormat {
    /// `.yaml`/`.yml` files are YAML; anything else is read as TOML.
    pub fn from_path(path: &Path) -> Self {
        let extension = path.extension().and_then(|extension| extension.to_str());
        match extension.map(str::to_ascii_lowercase).as_deref() {
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Toml,
        }
    }
}

/// Raw policy text as it was read, kept so estimates can digest it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyDocument {
    pub text: String,
    pub format: PolicyFormat,
}

impl PolicyDocument {
    pub fn new(text: impl Into<String>, format: PolicyFormat) -> Self {
        Self { text: text.into(), format }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_POLICY_TOML, PolicyFormat::Toml)
    }

    pub fn parse(&self, region: Option<&str>) -> Result<PricingPolicy, PricingError> {
        match self.format {
            PolicyFormat::Toml => PricingPolicy::from_toml_str(&self.text, region),
            PolicyFormat::Yaml => PricingPolicy::from_yaml_str(&self.text, region),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    VendorQuotes,
    UnitCosts,
    PolicyDefaults,
}

impl CostSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VendorQuotes => "vendor_quotes",
            Self::UnitCosts => "unit_costs",
            Self::PolicyDefaults => "policy_defaults",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Markups {
    #[serde(default)]
    pub overhead_pct: Decimal,
    #[serde(default)]
    pub profit_pct: Decimal,
}

fn default_policy_id() -> String {
    DEFAULT_POLICY_ID.to_string()
}

fn default_resolution_order() -> Vec<CostSource> {
    vec![CostSource::VendorQuotes, CostSource::UnitCosts, CostSource::PolicyDefaults]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingPolicy {
    #[serde(default = "default_policy_id")]
    pub policy_id: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub markups: Markups,
    #[serde(default)]
    pub waste_defaults: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub tax_pct: Decimal,
    #[serde(default)]
    pub escalation_pct: Decimal,
    #[serde(default = "default_resolution_order")]
    pub resolution_order: Vec<CostSource>,
    #[serde(default)]
    pub policy_defaults: BTreeMap<String, BTreeMap<String, Decimal>>,
}

impl PricingPolicy {
    pub fn builtin() -> Result<Self, PricingError> {
        Self::from_toml_str(BUILTIN_POLICY_TOML, None)
    }

    /// Parses a policy document. Multi-region documents carry `[regions.*]`
    /// tables; the requested region wins, then `default_region`, then the
    /// first region listed.
    pub fn from_toml_str(raw: &str, region: Option<&str>) -> Result<Self, PricingError> {
        let document: toml::Table =
            raw.parse().map_err(|error: toml::de::Error| PricingError::Policy(error.to_string()))?;
        Self::from_table(document, region)
    }

    /// Same document shape as [`PricingPolicy::from_toml_str`], written as YAML.
    pub fn from_yaml_str(raw: &str, region: Option<&str>) -> Result<Self, PricingError> {
        let document: toml::Table = serde_yaml::from_str(raw)
            .map_err(|error| PricingError::Policy(error.to_string()))?;
        Self::from_table(document, region)
    }

    fn from_table(mut document: toml::Table, region: Option<&str>) -> Result<Self, PricingError> {
        let (table, region_key) = match document.remove("regions") {
            Some(toml::Value::Table(mut regions)) => {
                let key = region
                    .map(ToOwned::to_owned)
                    .or_else(|| {
                        document.get("default_region").and_then(toml::Value::as_str).map(Into::into)
                    })
                    .or_else(|| regions.keys().next().cloned())
                    .ok_or_else(|| PricingError::Policy("policy has no regions".to_string()))?;
                match regions.remove(&key) {
                    Some(toml::Value::Table(table)) => (table, Some(key)),
                    Some(_) => {
                        return Err(PricingError::Policy(format!("region `{key}` is not a table")))
                    }
                    None => return Err(PricingError::UnknownRegion(key)),
                }
            }
            Some(_) => return Err(PricingError::Policy("`regions` must be a table".to_string())),
            None => (document, None),
        };

        let mut policy: PricingPolicy = toml::Value::Table(table)
            .try_into()
            .map_err(|error: toml::de::Error| PricingError::Policy(error.to_string()))?;
        if policy.region.is_none() {
            policy.region = region_key.or_else(|| region.map(ToOwned::to_owned));
        }
        policy.validate()?;
        Ok(policy)
    }

    pub fn region_label(&self) -> &str {
        self.region.as_deref().unwrap_or("unspecified")
    }

    pub fn waste_pct_for(&self, trade: &str) -> Decimal {
        let trade = trade.to_ascii_lowercase();
        self.waste_defaults
            .get(&trade)
            .or_else(|| self.waste_defaults.get("global_pct"))
            .copied()
            .unwrap_or_default()
    }

    pub fn default_cost(&self, trade: &str, code: &str) -> Option<Decimal> {
        self.policy_defaults
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(trade))
            .and_then(|(_, codes)| {
                codes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(code))
                    .map(|(_, cost)| *cost)
            })
    }

    fn validate(&self) -> Result<(), PricingError> {
        let rates = [
            ("markups.overhead_pct", self.markups.overhead_pct),
            ("markups.profit_pct", self.markups.profit_pct),
            ("tax_pct", self.tax_pct),
            ("escalation_pct", self.escalation_pct),
        ];
        for (name, rate) in rates {
            if rate.is_sign_negative() && !rate.is_zero() {
                return Err(PricingError::Policy(format!("{name} must not be negative")));
            }
        }
        let negative_waste =
            self.waste_defaults.iter().find(|(_, pct)| pct.is_sign_negative() && !pct.is_zero());
        if let Some((trade, _)) = negative_waste {
            return Err(PricingError::Policy(format!(
                "waste_defaults.{trade} must not be negative"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn builtin_policy_parses_with_defaults() {
        let policy = PricingPolicy::builtin().expect("builtin policy");

        assert_eq!(policy.policy_id, DEFAULT_POLICY_ID);
        assert_eq!(policy.region_label(), "default");
        assert_eq!(policy.waste_pct_for("Concrete"), Decimal::new(5, 2));
        assert_eq!(policy.waste_pct_for("roofing"), Decimal::new(3, 2));
        assert_eq!(policy.default_cost("roofing", "roofing_default"), Some(Decimal::from(9500)));
        assert_eq!(policy.resolution_order.len(), 3);
    }

    #[test]
    fn multi_region_policy_selects_requested_then_default_region() {
        let raw = r#"
default_region = "ma"

[regions.ma]
policy_id = "ma.v0"
tax_pct = 0.0625

[regions.tx]
policy_id = "tx.v0"
tax_pct = 0.0
"#;

        let chosen = PricingPolicy::from_toml_str(raw, Some("tx")).expect("tx region");
        assert_eq!(chosen.policy_id, "tx.v0");
        assert_eq!(chosen.region_label(), "tx");

        let fallback = PricingPolicy::from_toml_str(raw, None).expect("default region");
        assert_eq!(fallback.policy_id, "ma.v0");
        assert_eq!(fallback.tax_pct, Decimal::new(625, 4));

        let missing = PricingPolicy::from_toml_str(raw, Some("ca")).expect_err("unknown region");
        assert!(matches!(missing, PricingError::UnknownRegion(region) if region == "ca"));
    }

    #[test]
    fn negative_rates_and_malformed_documents_are_rejected() {
        assert!(PricingPolicy::from_toml_str("tax_pct = -0.1", None).is_err());
        assert!(PricingPolicy::from_toml_str("tax_pct = ", None).is_err());
        assert!(PricingPolicy::from_toml_str("resolution_order = [\"magic\"]", None).is_err());
        assert!(PricingPolicy::from_yaml_str("tax_pct: [1, 2", None).is_err());
    }

    #[test]
    fn yaml_policies_share_the_region_rules() {
        let raw = "
default_region: ma
regions:
  ma:
    policy_id: ma.v0
    tax_pct: 0.0625
    markups:
      overhead_pct: 0.1
    policy_defaults:
      roofing:
        roofing_default: 9000
";
        let document = PolicyDocument::new(raw, PolicyFormat::from_path(Path::new("p.v0.YML")));
        let policy = document.parse(None).expect("yaml policy");

        assert_eq!(policy.policy_id, "ma.v0");
        assert_eq!(policy.region_label(), "ma");
        assert_eq!(policy.markups.overhead_pct, Decimal::new(1, 1));
        assert_eq!(policy.default_cost("roofing", "roofing_default"), Some(Decimal::from(9000)));
    }

    #[test]
    fn format_follows_the_file_extension() {
        assert_eq!(PolicyFormat::from_path(Path::new("schemas/policy.yaml")), PolicyFormat::Yaml);
        assert_eq!(PolicyFormat::from_path(Path::new("policy.toml")), PolicyFormat::Toml);
        assert_eq!(PolicyFormat::from_path(Path::new("policy")), PolicyFormat::Toml);
        let builtin = PolicyDocument::builtin().parse(None).expect("builtin");
        assert_eq!(builtin.region_label(), "default");
    }
}
