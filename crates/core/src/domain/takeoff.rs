use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::question::AppliedOverlay;

fn default_uom() -> String {
    "EA".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantityItem {
    #[serde(alias = "item")]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_uom", alias = "unit")]
    pub uom: String,
    #[serde(default, alias = "quantity")]
    pub qty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeTakeoff {
    pub trade: String,
    #[serde(default)]
    pub items: Vec<QuantityItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyedTrade {
    Items(Vec<QuantityItem>),
    Wrapped {
        #[serde(default)]
        items: Vec<QuantityItem>,
    },
}

impl KeyedTrade {
    fn items_mut(&mut self) -> &mut Vec<QuantityItem> {
        match self {
            Self::Items(items) | Self::Wrapped { items } => items,
        }
    }

    fn into_items(self) -> Vec<QuantityItem> {
        match self {
            Self::Items(items) | Self::Wrapped { items } => items,
        }
    }
}

/// Takeoff services report trades either as `[{trade, items}]` or as
/// `{trade: {items}}`. Both are kept as received and flattened on demand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TradeCollection {
    List(Vec<TradeTakeoff>),
    Keyed(BTreeMap<String, KeyedTrade>),
}

impl Default for TradeCollection {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl TradeCollection {
    pub fn normalize(self) -> Vec<TradeTakeoff> {
        match self {
            Self::List(trades) => trades,
            Self::Keyed(trades) => trades
                .into_iter()
                .map(|(trade, keyed)| TradeTakeoff { trade, items: keyed.into_items() })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::List(trades) => trades.len(),
            Self::Keyed(trades) => trades.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn for_each_item_mut(&mut self, mut visit: impl FnMut(&str, &mut QuantityItem)) {
        match self {
            Self::List(trades) => {
                for trade in trades {
                    for item in &mut trade.items {
                        visit(&trade.trade, item);
                    }
                }
            }
            Self::Keyed(trades) => {
                for (trade, keyed) in trades.iter_mut() {
                    for item in keyed.items_mut() {
                        visit(trade, item);
                    }
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TakeoffResult {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub trades: TradeCollection,
    #[serde(default)]
    pub scale_units: Option<String>,
    #[serde(default)]
    pub total_lines: u64,
    #[serde(default)]
    pub total_polygons: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// One row of a pre-built quantity table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantityLine {
    pub trade: String,
    #[serde(alias = "item")]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_uom", alias = "unit")]
    pub uom: String,
    #[serde(alias = "quantity")]
    pub qty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TakeoffQuantities {
    pub trades: TradeCollection,
}

/// `quantities` on an estimate request: a takeoff result, its bare `trades`
/// collection, or a pre-built table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuantitiesInput {
    Takeoff(TakeoffQuantities),
    Table(Vec<QuantityLine>),
    Trades(TradeCollection),
}

impl From<TakeoffResult> for QuantitiesInput {
    fn from(value: TakeoffResult) -> Self {
        Self::Trades(value.trades)
    }
}

impl QuantitiesInput {
    pub fn into_lines(self) -> Vec<QuantityLine> {
        let trades = match self {
            Self::Table(lines) => return lines,
            Self::Takeoff(TakeoffQuantities { trades }) | Self::Trades(trades) => trades,
        };

        trades
            .normalize()
            .into_iter()
            .flat_map(|takeoff| {
                let trade = takeoff.trade;
                takeoff.items.into_iter().map(move |item| QuantityLine {
                    trade: trade.clone(),
                    code: item.code,
                    description: item.description,
                    uom: item.uom,
                    qty: item.qty,
                    source: item.source,
                })
            })
            .collect()
    }

    /// Scales positive quantities of each overlay's trade and stamps the
    /// overlay source onto the touched items.
    pub fn apply_overlays(&mut self, overlays: &[AppliedOverlay]) {
        for overlay in overlays {
            let mut apply = |trade: &str, qty: &mut f64, source: &mut Option<String>| {
                if trade.eq_ignore_ascii_case(&overlay.trade) && *qty > 0.0 {
                    *qty *= overlay.multiplier;
                    *source = Some(overlay.source.clone());
                }
            };

            match self {
                Self::Table(lines) => {
                    for line in lines.iter_mut() {
                        apply(&line.trade, &mut line.qty, &mut line.source);
                    }
                }
                Self::Takeoff(TakeoffQuantities { trades }) | Self::Trades(trades) => {
                    trades.for_each_item_mut(|trade, item| {
                        apply(trade, &mut item.qty, &mut item.source)
                    });
                }
            }
        }
    }
}
