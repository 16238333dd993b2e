use crate::domain::question::{PlanSignal, Question, Severity, SuggestedAnswer, TradeInference};
use crate::interactive::plan::{LayoutMeta, PlanFeatures};

pub const DEFAULT_MAX_QUESTIONS: usize = 5;
pub const FALLBACK_MODE: &str = "fallback_mode";

struct Template {
    topic: &'static str,
    trade: &'static str,
    severity: Severity,
    rationale: &'static str,
    prompt: &'static str,
    answers: &'static [(&'static str, &'static str)],
}

impl Template {
    fn question(&self) -> Question {
        Question {
            id: self.topic.to_string(),
            trade: self.trade.to_string(),
            severity: self.severity,
            rationale: self.rationale.to_string(),
            prompt: self.prompt.to_string(),
            suggested_answers: self
                .answers
                .iter()
                .map(|(key, label)| SuggestedAnswer::new(key, label))
                .collect(),
        }
    }
}

const ROOFING_MATERIAL: Template = Template {
    topic: "roofing_material",
    trade: "roofing",
    severity: Severity::Critical,
    rationale: "Roofing material significantly impacts cost (20-30% swing)",
    prompt: "What roofing material will be used?",
    answers: &[
        ("shingle", "Asphalt Shingle"),
        ("metal", "Metal Panel"),
        ("tile", "Clay/Concrete Tile"),
    ],
};

const FOUNDATION_TYPE: Template = Template {
    topic: "foundation_type",
    trade: "concrete",
    severity: Severity::Critical,
    rationale: "Foundation type affects structural cost (15-25% swing)",
    prompt: "What foundation type will be used?",
    answers: &[("slab", "Slab-on-grade"), ("crawl", "Crawl space"), ("basement", "Full basement")],
};

const WINDOW_FRAME: Template = Template {
    topic: "window_frame",
    trade: "windows",
    severity: Severity::Critical,
    rationale: "Window frame material affects cost and performance (10-20% swing)",
    prompt: "What window frame material will be used?",
    answers: &[("vinyl", "Vinyl"), ("aluminum", "Aluminum"), ("wood", "Wood")],
};

const ROOFING_PITCH: Template = Template {
    topic: "roofing_pitch",
    trade: "roofing",
    severity: Severity::Normal,
    rationale: "Roof pitch affects material quantities and labor",
    prompt: "What is the roof pitch?",
    answers: &[
        ("standard", "Standard (4/12 - 6/12)"),
        ("steep", "Steep (7/12+)"),
        ("flat", "Flat/Low-slope"),
    ],
};

const SLAB_THICKNESS: Template = Template {
    topic: "slab_thickness",
    trade: "concrete",
    severity: Severity::Normal,
    rationale: "Slab thickness affects concrete volume and reinforcement",
    prompt: "What is the required slab thickness?",
    answers: &[("4in", "4 inches"), ("6in", "6 inches"), ("8in", "8 inches")],
};

const WINDOW_GLASS: Template = Template {
    topic: "window_glass",
    trade: "windows",
    severity: Severity::Normal,
    rationale: "Glass type affects energy efficiency and cost",
    prompt: "What glass type will be used?",
    answers: &[("single", "Single-pane"), ("double", "Double-pane"), ("triple", "Triple-pane")],
};

const HVAC_ZONING: Template = Template {
    topic: "hvac_zoning",
    trade: "hvac",
    severity: Severity::Normal,
    rationale: "Zoning improves comfort and efficiency",
    prompt: "Will the HVAC system include zoning?",
    answers: &[("single", "Single zone"), ("multi", "Multi-zone")],
};

const HVAC_EFFICIENCY: Template = Template {
    topic: "hvac_efficiency",
    trade: "hvac",
    severity: Severity::Normal,
    rationale: "Efficiency rating affects operating costs",
    prompt: "What efficiency rating is required?",
    answers: &[("standard", "Standard efficiency"), ("high", "High efficiency (SEER 16+)")],
};

const ELECTRICAL_PANEL: Template = Template {
    topic: "electrical_panel",
    trade: "electrical",
    severity: Severity::Normal,
    rationale: "Panel size must accommodate electrical load",
    prompt: "What size electrical panel is needed?",
    answers: &[("100a", "100 Amp"), ("200a", "200 Amp"), ("400a", "400 Amp")],
};

const PLUMBING_FIXTURES: Template = Template {
    topic: "plumbing_fixtures",
    trade: "plumbing",
    severity: Severity::Normal,
    rationale: "Fixture grade affects cost and quality (5-15% swing)",
    prompt: "What grade of plumbing fixtures will be used?",
    answers: &[
        ("builder", "Builder grade"),
        ("premium", "Premium grade"),
        ("luxury", "Luxury grade"),
    ],
};

const FLOOR_COVERING: Template = Template {
    topic: "floor_covering",
    trade: "finishes",
    severity: Severity::Critical,
    rationale: "Floor covering significantly impacts cost (10-20% swing)",
    prompt: "What floor covering will be used?",
    answers: &[("carpet", "Carpet"), ("tile", "Ceramic Tile"), ("hardwood", "Hardwood")],
};

const GENERIC_QUALITY: Template = Template {
    topic: "generic_quality",
    trade: "general",
    severity: Severity::Critical,
    rationale: "No trade could be inferred from the plan; finish level drives the estimate",
    prompt: "What finish quality should the estimate assume?",
    answers: &[
        ("economy", "Economy"),
        ("standard", "Standard"),
        ("premium", "Premium"),
        ("luxury", "Luxury"),
    ],
};

const GENERIC_COMPLEXITY: Template = Template {
    topic: "generic_complexity",
    trade: "general",
    severity: Severity::Normal,
    rationale: "Design complexity adjusts the cost per square foot",
    prompt: "How complex is the design?",
    answers: &[("simple", "Simple"), ("moderate", "Moderate"), ("complex", "Complex")],
};

/// What the plan says about each trade, gathered once before templates are
/// selected.
struct PlanContext<'a> {
    text: String,
    layout: Option<&'a LayoutMeta>,
    area_sf: f64,
    inferred: Vec<&'a str>,
}

impl<'a> PlanContext<'a> {
    fn new(
        features: &PlanFeatures,
        layout: Option<&'a LayoutMeta>,
        inferred: &'a [TradeInference],
    ) -> Self {
        Self {
            text: features.searchable_text(),
            layout,
            area_sf: features.estimated_area_sf.max(0.0),
            inferred: inferred.iter().map(|trade| trade.trade.as_str()).collect(),
        }
    }

    fn inferred(&self, trade: &str) -> bool {
        self.inferred.iter().any(|name| *name == trade)
    }

    fn roof_mentioned(&self) -> bool {
        self.text.contains("roof") || self.text.contains("shingle") || self.inferred("roofing")
    }

    fn foundation_type(&self) -> Option<&str> {
        self.layout
            .and_then(|layout| layout.foundation_type.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn window_frame_known(&self) -> bool {
        self.layout.is_some_and(|layout| !layout.window_frame_markers.is_empty())
    }

    fn window_count(&self) -> u32 {
        self.layout.map(|layout| layout.window_count).unwrap_or_default()
    }

    fn fixture_count(&self) -> u32 {
        self.layout.map(|layout| layout.fixture_count).unwrap_or_default()
    }

    fn bathroom_count(&self) -> u32 {
        self.layout.map(|layout| layout.bathroom_count).unwrap_or_default()
    }

    fn has_trade_context(&self) -> bool {
        !self.inferred.is_empty()
            || self.foundation_type().is_some()
            || self.window_count() > 0
            || self.fixture_count() > 0
            || self.bathroom_count() > 0
            || self.area_sf > 0.0
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratedQuestions {
    pub questions: Vec<Question>,
    pub signals: Vec<PlanSignal>,
}

/// Builds the question set for one assessment. Material questions lead,
/// plan-aware follow-ups come next, and the list is stably ordered by
/// severity before ids are assigned so identical input always yields
/// identical ids.
pub fn generate_questions(
    project_id: &str,
    features: &PlanFeatures,
    layout: Option<&LayoutMeta>,
    inferred: &[TradeInference],
    max_questions: usize,
) -> GeneratedQuestions {
    let context = PlanContext::new(features, layout, inferred);
    let mut signals = Vec::new();

    let mut templates: Vec<&Template> = Vec::new();
    if context.has_trade_context() {
        templates.push(&ROOFING_MATERIAL);
        if context.foundation_type().is_none() {
            templates.push(&FOUNDATION_TYPE);
        }
        if !context.window_frame_known() {
            templates.push(&WINDOW_FRAME);
        }

        if context.roof_mentioned() {
            templates.push(&ROOFING_PITCH);
        }
        let slab = context.foundation_type().is_some_and(|kind| kind.eq_ignore_ascii_case("slab"));
        if slab || (context.foundation_type().is_none() && context.inferred("concrete")) {
            templates.push(&SLAB_THICKNESS);
        }
        if context.window_count() > 0 || context.inferred("windows") {
            templates.push(&WINDOW_GLASS);
        }
        if context.area_sf > 2000.0 {
            templates.push(&HVAC_ZONING);
        }
        if context.area_sf > 0.0 || context.inferred("hvac") {
            templates.push(&HVAC_EFFICIENCY);
        }
        if context.fixture_count() > 20 {
            templates.push(&ELECTRICAL_PANEL);
        }
        if context.bathroom_count() > 0 {
            templates.push(&PLUMBING_FIXTURES);
        }
        if context.area_sf > 0.0 {
            templates.push(&FLOOR_COVERING);
        }
    } else {
        signals.push(PlanSignal::new(FALLBACK_MODE, "no trade context in plan"));
        templates.push(&GENERIC_QUALITY);
        templates.push(&GENERIC_COMPLEXITY);
    }

    let mut questions: Vec<Question> = templates.into_iter().map(Template::question).collect();
    questions.sort_by_key(|question| question.severity.rank());
    questions.truncate(max_questions);
    for (index, question) in questions.iter_mut().enumerate() {
        question.id = format!("{project_id}_{}_{index}", question.id);
    }

    GeneratedQuestions { questions, signals }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactive::inference::infer_trades;

    fn ids(generated: &GeneratedQuestions) -> Vec<&str> {
        generated.questions.iter().map(|question| question.id.as_str()).collect()
    }

    #[test]
    fn roof_and_window_text_leads_with_material_questions() {
        let features = PlanFeatures {
            full_text: "roof shingle window vinyl".to_string(),
            ..Default::default()
        };
        let inferred = infer_trades(&features);

        let generated = generate_questions("uat-1", &features, None, &inferred, 5);

        assert_eq!(
            ids(&generated),
            vec![
                "uat-1_roofing_material_0",
                "uat-1_foundation_type_1",
                "uat-1_window_frame_2",
                "uat-1_roofing_pitch_3",
                "uat-1_window_glass_4",
            ]
        );
        assert!(generated.signals.is_empty());
    }

    #[test]
    fn generation_is_deterministic() {
        let features = PlanFeatures {
            full_text: "slab foundation roof 3,200 sf".to_string(),
            estimated_area_sf: 3200.0,
            ..Default::default()
        };
        let inferred = infer_trades(&features);

        let first = generate_questions("p", &features, None, &inferred, 5);
        let second = generate_questions("p", &features, None, &inferred, 5);
        assert_eq!(first, second);
    }

    #[test]
    fn critical_questions_sort_ahead_and_cap_applies() {
        let features = PlanFeatures { estimated_area_sf: 2600.0, ..Default::default() };
        let layout = LayoutMeta {
            foundation_type: Some("slab".to_string()),
            window_frame_markers: vec!["vinyl".to_string()],
            window_count: 12,
            fixture_count: 30,
            bathroom_count: 2,
            ..LayoutMeta::default()
        };

        let generated = generate_questions("p", &features, Some(&layout), &[], 3);

        assert_eq!(generated.questions.len(), 3);
        assert_eq!(generated.questions[0].id, "p_roofing_material_0");
        assert_eq!(generated.questions[1].id, "p_floor_covering_1");
        assert_eq!(generated.questions[2].severity, Severity::Normal);
        assert!(generated
            .questions
            .iter()
            .all(|question| !question.id.contains("foundation_type")));
    }

    #[test]
    fn missing_context_falls_back_to_generic_questions() {
        let generated = generate_questions("p", &PlanFeatures::default(), None, &[], 5);

        assert_eq!(ids(&generated), vec!["p_generic_quality_0", "p_generic_complexity_1"]);
        assert_eq!(generated.signals.len(), 1);
        assert_eq!(generated.signals[0].kind, FALLBACK_MODE);
    }
}
