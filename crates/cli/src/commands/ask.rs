use estimator_core::assistant;
use serde_json::json;

use crate::commands::CommandResult;

pub fn run(message: &[String]) -> CommandResult {
    let message = message.join(" ");
    let reply = assistant::respond(&message);
    let rule = assistant::matching_rule(&message).map(|rule| rule.name);
    CommandResult::success("ask", reply, Some(json!({ "rule": rule, "reply": reply })))
}
