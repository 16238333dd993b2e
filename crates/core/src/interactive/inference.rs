use crate::domain::question::{InferredItem, PlanSignal, TradeInference};
use crate::interactive::plan::PlanFeatures;

pub const KEYWORD_HIT: &str = "keyword_hit";

/// Keyword table driving trade inference, in reporting order.
pub const TRADE_KEYWORDS: &[(&str, &[&str])] = &[
    ("concrete", &["concrete", "foundation", "slab", "footing", "stem wall"]),
    ("framing", &["framing", "stud", "wall", "joist", "rafter"]),
    ("roofing", &["roof", "shingle", "tile roof", "underlayment"]),
    ("plumbing", &["plumbing", "pipe", "drain", "fixture"]),
    ("electrical", &["electrical", "wire", "outlet", "panel"]),
    ("hvac", &["hvac", "air handler", "duct", "furnace"]),
    ("drywall", &["drywall", "sheetrock", "gypsum"]),
    ("paint", &["paint", "primer", "finish"]),
    ("flooring", &["flooring", "tile", "carpet", "hardwood"]),
    ("windows", &["window", "door", "glazing"]),
    ("insulation", &["insulation", "batt", "blown"]),
    ("sitework", &["sitework", "grading", "driveway"]),
];

pub fn known_trade_count() -> usize {
    TRADE_KEYWORDS.len()
}

pub fn infer_trades(features: &PlanFeatures) -> Vec<TradeInference> {
    let text = features.searchable_text();

    TRADE_KEYWORDS
        .iter()
        .filter_map(|(trade, keywords)| {
            let signals: Vec<PlanSignal> = keywords
                .iter()
                .filter(|keyword| text.contains(*keyword))
                .map(|keyword| PlanSignal::new(KEYWORD_HIT, *keyword))
                .collect();
            if signals.is_empty() {
                return None;
            }

            let confidence = (signals.len() as f64 / keywords.len() as f64 * 0.5 + 0.5).min(1.0);
            Some(TradeInference {
                trade: (*trade).to_string(),
                items: vec![InferredItem { item: format!("{trade}_default"), confidence, signals }],
            })
        })
        .collect()
}

/// Share of the known trades that were inferred, rounded to four places.
pub fn coverage_score(inferred: &[TradeInference]) -> f64 {
    let ratio = inferred.len() as f64 / known_trade_count() as f64;
    (ratio.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}
