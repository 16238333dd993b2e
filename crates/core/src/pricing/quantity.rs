use std::collections::BTreeMap;

use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::takeoff::QuantityLine;
use crate::interactive::plan::sha256_hex;
use crate::pricing::policy::{CostSource, PolicyDocument, PricingPolicy};
use crate::pricing::{decimal_from_f64, PricingError};

pub const ESTIMATE_VERSION: &str = "v0";

pub type CostTable = BTreeMap<(String, String), Decimal>;

/// Reads a `trade,code,unit_cost` sheet. Column order is taken from the
/// header and quoted cells may hold commas; rows with blank keys or
/// unparseable/negative costs are skipped.
pub fn parse_cost_csv(name: &str, text: &str) -> Result<CostTable, PricingError> {
    let malformed = |error: csv::Error| PricingError::InvalidInput(format!("{name}: {error}"));
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(malformed)?.clone();
    if headers.iter().all(str::is_empty) {
        return Ok(CostTable::new());
    }
    let position =
        |column: &str| headers.iter().position(|header| header.eq_ignore_ascii_case(column));
    let (Some(trade_at), Some(code_at), Some(cost_at)) =
        (position("trade"), position("code"), position("unit_cost"))
    else {
        return Err(PricingError::InvalidInput(format!(
            "{name} must have `trade,code,unit_cost` headers"
        )));
    };

    let mut table = CostTable::new();
    for record in reader.records() {
        let record = record.map_err(malformed)?;
        let cell = |index: usize| record.get(index).unwrap_or_default();
        let trade = cell(trade_at).to_ascii_lowercase();
        let code = cell(code_at).to_ascii_lowercase();
        let Ok(unit_cost) = cell(cost_at).parse::<Decimal>() else {
            continue;
        };
        if trade.is_empty() || code.is_empty() || unit_cost.is_sign_negative() {
            continue;
        }
        table.insert((trade, code), unit_cost);
    }

    Ok(table)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricedLine {
    pub trade: String,
    pub code: String,
    pub description: String,
    pub uom: String,
    pub qty: f64,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub waste_pct: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub extended_base: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub extended_with_waste: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub markup_overhead: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub markup_profit: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal_before_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub escalation: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub source: CostSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_source: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricedTrade {
    pub trade: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricedTotals {
    #[serde(with = "rust_decimal::serde::float")]
    pub grand_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricedEstimate {
    pub version: String,
    pub policy_id: String,
    pub region: String,
    pub trades: Vec<PricedTrade>,
    pub line_items: Vec<PricedLine>,
    pub totals: PricedTotals,
    #[serde(with = "rust_decimal::serde::float")]
    pub grand_total: Decimal,
    pub warnings: Vec<String>,
    pub digests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Everything a quantity pricing run needs. Text inputs are kept verbatim
/// so their digests identify exactly what was priced.
#[derive(Clone, Debug, Default)]
pub struct QuantityPricingInput<'a> {
    pub lines: &'a [QuantityLine],
    pub policy: Option<&'a PolicyDocument>,
    pub region: Option<&'a str>,
    pub unit_costs_csv: Option<&'a str>,
    pub vendor_quotes_csv: Option<&'a str>,
}

fn resolve_unit_cost(
    line: &QuantityLine,
    policy: &PricingPolicy,
    vendor: &CostTable,
    unit: &CostTable,
) -> (Decimal, CostSource) {
    let key = (line.trade.to_ascii_lowercase(), line.code.to_ascii_lowercase());
    for source in &policy.resolution_order {
        let found = match source {
            CostSource::VendorQuotes => vendor.get(&key).copied(),
            CostSource::UnitCosts => unit.get(&key).copied(),
            CostSource::PolicyDefaults => policy.default_cost(&line.trade, &line.code),
        };
        if let Some(cost) = found {
            return (cost, *source);
        }
    }
    (Decimal::ZERO, CostSource::PolicyDefaults)
}

pub fn price_quantities(input: QuantityPricingInput<'_>) -> Result<PricedEstimate, PricingError> {
    let builtin = PolicyDocument::builtin();
    let policy_document = input.policy.unwrap_or(&builtin);
    let policy = policy_document.parse(input.region)?;
    let vendor = match input.vendor_quotes_csv {
        Some(text) => parse_cost_csv("vendor_quotes_csv", text)?,
        None => CostTable::new(),
    };
    let unit = match input.unit_costs_csv {
        Some(text) => parse_cost_csv("unit_costs_csv", text)?,
        None => CostTable::new(),
    };

    let mut line_items = Vec::with_capacity(input.lines.len());
    let mut trade_totals: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut warnings = Vec::new();
    let one = Decimal::ONE;

    for line in input.lines {
        if line.trade.trim().is_empty() || line.code.trim().is_empty() {
            return Err(PricingError::InvalidInput(
                "every quantity line needs a trade and a code".to_string(),
            ));
        }
        let qty = decimal_from_f64("qty", line.qty)?;
        if qty.is_sign_negative() && !qty.is_zero() {
            return Err(PricingError::InvalidInput(format!(
                "quantity for {}/{} must not be negative",
                line.trade, line.code
            )));
        }

        let (unit_cost, source) = resolve_unit_cost(line, &policy, &vendor, &unit);
        let waste_pct = policy.waste_pct_for(&line.trade);
        let extended_base = qty * unit_cost;
        let extended_with_waste = extended_base * (one + waste_pct);
        let markup_overhead = extended_with_waste * policy.markups.overhead_pct;
        let markup_profit = (extended_with_waste + markup_overhead) * policy.markups.profit_pct;
        let subtotal_before_tax = extended_with_waste + markup_overhead + markup_profit;
        let tax = subtotal_before_tax * policy.tax_pct;
        let escalation = subtotal_before_tax * policy.escalation_pct;
        let total = subtotal_before_tax + tax + escalation;

        if unit_cost.is_zero() && source == CostSource::PolicyDefaults {
            warnings.push(format!(
                "Missing cost for {}/{}; defaulted to 0.0",
                line.trade, line.code
            ));
        }
        *trade_totals.entry(line.trade.clone()).or_default() += total;

        line_items.push(PricedLine {
            trade: line.trade.clone(),
            code: line.code.clone(),
            description: line.description.clone(),
            uom: line.uom.clone(),
            qty: line.qty,
            unit_cost: unit_cost.round_dp(4),
            waste_pct: waste_pct.round_dp(4),
            extended_base: extended_base.round_dp(2),
            extended_with_waste: extended_with_waste.round_dp(2),
            markup_overhead: markup_overhead.round_dp(2),
            markup_profit: markup_profit.round_dp(2),
            subtotal_before_tax: subtotal_before_tax.round_dp(2),
            tax: tax.round_dp(2),
            escalation: escalation.round_dp(2),
            total: total.round_dp(2),
            source,
            quantity_source: line.source.clone(),
        });
    }

    let grand_total = trade_totals.values().copied().sum::<Decimal>().round_dp(2);
    let trades = trade_totals
        .into_iter()
        .map(|(trade, subtotal)| PricedTrade { trade, subtotal: subtotal.round_dp(2) })
        .collect();

    Ok(PricedEstimate {
        version: ESTIMATE_VERSION.to_string(),
        policy_id: policy.policy_id.clone(),
        region: policy.region_label().to_string(),
        trades,
        line_items,
        totals: PricedTotals { grand_total },
        grand_total,
        warnings,
        digests: digests(&input, &policy_document.text)?,
        metadata: None,
    })
}

fn digests(
    input: &QuantityPricingInput<'_>,
    policy_text: &str,
) -> Result<BTreeMap<String, String>, PricingError> {
    let quantities = serde_json::to_vec(input.lines)
        .map_err(|error| PricingError::InvalidInput(error.to_string()))?;

    let mut digests = BTreeMap::new();
    digests.insert("quantities_json_sha256".to_string(), sha256_hex(&quantities));
    digests.insert("policy_sha256".to_string(), sha256_hex(policy_text.as_bytes()));
    if let Some(text) = input.unit_costs_csv {
        digests.insert("unit_costs_csv_sha256".to_string(), sha256_hex(text.as_bytes()));
    }
    if let Some(text) = input.vendor_quotes_csv {
        digests.insert("vendor_quotes_csv_sha256".to_string(), sha256_hex(text.as_bytes()));
    }
    Ok(digests)
}
