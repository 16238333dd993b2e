use crate::domain::question::{AnsweredQuestion, AppliedOverlay};

/// A clarification topic whose answer rescales a trade's quantities.
pub struct MaterialToggle {
    pub topic: &'static str,
    pub trade: &'static str,
    pub multipliers: &'static [(&'static str, f64)],
}

pub const MATERIAL_TOGGLES: &[MaterialToggle] = &[
    MaterialToggle {
        topic: "roofing_material",
        trade: "roofing",
        multipliers: &[("shingle", 1.0), ("metal", 1.35), ("tile", 1.6)],
    },
    MaterialToggle {
        topic: "foundation_type",
        trade: "concrete",
        multipliers: &[("slab", 1.0), ("crawl", 1.15), ("basement", 1.45)],
    },
    MaterialToggle {
        topic: "window_frame",
        trade: "windows",
        multipliers: &[("vinyl", 1.0), ("aluminum", 1.1), ("wood", 1.3)],
    },
];

pub fn overlay_source(key: &str) -> String {
    format!("user-clarification: {key}")
}

impl MaterialToggle {
    /// Unlisted answers keep quantities unchanged but are still recorded.
    pub fn multiplier(&self, key: &str) -> f64 {
        self.multipliers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
            .map(|(_, multiplier)| *multiplier)
            .unwrap_or(1.0)
    }
}

/// Topic of a generated question id `{project_id}_{topic}_{index}`.
pub fn question_topic<'a>(project_id: &str, question_id: &'a str) -> Option<&'a str> {
    let rest = question_id.strip_prefix(project_id)?.strip_prefix('_')?;
    let (topic, index) = rest.rsplit_once('_')?;
    let numbered = !index.is_empty() && index.bytes().all(|byte| byte.is_ascii_digit());
    (numbered && !topic.is_empty()).then_some(topic)
}

pub fn toggle_for(project_id: &str, question_id: &str) -> Option<&'static MaterialToggle> {
    let topic = question_topic(project_id, question_id)?;
    MATERIAL_TOGGLES.iter().find(|toggle| toggle.topic == topic)
}

/// Overlays implied by the answered material questions, in answer order.
pub fn overlays_for(project_id: &str, answered: &[AnsweredQuestion]) -> Vec<AppliedOverlay> {
    answered
        .iter()
        .filter_map(|answer| {
            let toggle = toggle_for(project_id, &answer.id)?;
            let key = answer.answer.trim().to_ascii_lowercase();
            Some(AppliedOverlay {
                question_id: answer.id.clone(),
                trade: toggle.trade.to_string(),
                multiplier: toggle.multiplier(&key),
                source: overlay_source(&key),
                key,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::question::Severity;

    fn answered(id: &str, answer: &str) -> AnsweredQuestion {
        AnsweredQuestion {
            id: id.to_string(),
            question: "?".to_string(),
            answer: answer.to_string(),
            severity: Severity::Critical,
            trade: String::new(),
        }
    }

    #[test]
    fn material_answers_produce_overlays_with_sources() {
        let overlays = overlays_for("p", &[
            answered("p_roofing_material_0", "Metal"),
            answered("p_foundation_type_1", "slab"),
            answered("p_roofing_pitch_2", "steep"),
        ]);

        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[0].trade, "roofing");
        assert_eq!(overlays[0].key, "metal");
        assert_eq!(overlays[0].multiplier, 1.35);
        assert_eq!(overlays[0].source, "user-clarification: metal");
        assert_eq!(overlays[1].trade, "concrete");
        assert_eq!(overlays[1].multiplier, 1.0);
    }

    #[test]
    fn unlisted_material_keeps_unit_multiplier() {
        let overlays = overlays_for("p", &[answered("p_window_frame_2", "fiberglass")]);
        assert_eq!(overlays[0].multiplier, 1.0);
        assert_eq!(overlays[0].source, "user-clarification: fiberglass");
    }

    #[test]
    fn topic_words_in_the_project_id_do_not_pick_the_toggle() {
        let project = "roofing_material-lot7";
        let overlays = overlays_for(project, &[
            answered("roofing_material-lot7_foundation_type_1", "basement"),
            answered("roofing_material-lot7_roofing_pitch_3", "steep"),
        ]);

        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].trade, "concrete");
        assert_eq!(overlays[0].key, "basement");
        assert_eq!(overlays[0].multiplier, 1.45);
    }

    #[test]
    fn topics_are_read_between_project_prefix_and_index() {
        assert_eq!(question_topic("p1", "p1_window_frame_2"), Some("window_frame"));
        assert_eq!(question_topic("p1", "p10_window_frame_2"), None);
        assert_eq!(question_topic("p1", "p1_window_frame"), None);
        assert_eq!(question_topic("p1", "p1_7"), None);
    }
}
