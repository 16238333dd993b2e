//! Canned replies for the estimate chat box.
//!
//! Rules are checked in table order against the lowercased message; the first
//! rule with a matching keyword answers.

pub struct ChatRule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub reply: &'static str,
}

pub const ADJUST_REPLY: &str = "I can help you adjust the estimate. \
    What specific component would you like to modify? You can adjust:\n\
    • Quality level\n• Special features\n• Square footage\n• Design complexity";

pub const EXPLAIN_REPLY: &str = "The cost breakdown includes:\n\
    • Hard Costs: Direct construction costs\n\
    • Soft Costs (35%): Design, permits, fees, contingency\n\
    • Total Cost: Complete project budget\n\n\
    Would you like me to explain any specific component?";

pub const COMPARE_REPLY: &str = "I can help you compare different scenarios. Would you like to:\n\
    • Compare quality levels?\n\
    • Compare with/without special features?\n\
    • Compare different sizes?";

pub const FALLBACK_REPLY: &str = "I'm here to help refine your estimate. You can ask me to:\n\
    • Adjust specific costs\n\
    • Explain the breakdown\n\
    • Compare scenarios\n\
    • Add or remove features\n\n\
    What would you like to know?";

pub const CHAT_RULES: &[ChatRule] = &[
    ChatRule { name: "adjust", keywords: &["adjust", "change"], reply: ADJUST_REPLY },
    ChatRule { name: "explain", keywords: &["explain", "breakdown"], reply: EXPLAIN_REPLY },
    ChatRule { name: "compare", keywords: &["compare"], reply: COMPARE_REPLY },
];

pub fn matching_rule(message: &str) -> Option<&'static ChatRule> {
    let message = message.to_lowercase();
    CHAT_RULES.iter().find(|rule| rule.keywords.iter().any(|keyword| message.contains(keyword)))
}

pub fn respond(message: &str) -> &'static str {
    matching_rule(message).map_or(FALLBACK_REPLY, |rule| rule.reply)
}
