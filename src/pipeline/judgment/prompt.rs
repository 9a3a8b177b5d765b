use crate::models::{Redline, RedlineKind, Rule};

pub const JUDGMENT_SYSTEM_PROMPT: &str = "\
You are a contract review assistant judging one redline (tracked change) in a \
legal document against a negotiation playbook. Respond with a single valid \
JSON object and nothing else.";

/// Appended for the one corrective retry after a contract violation.
pub const CORRECTION_INSTRUCTION: &str = "\
Your previous reply did not match the required schema. Respond again with ONLY \
a JSON object containing the fields risk_level (\"low\", \"medium\" or \
\"high\"), assessment (non-empty string), recommended_action (string) and \
optionally counter_text (string). No prose, no markdown fences.";

/// Build the judgment prompt for one redline.
///
/// Context contributions are bounded by `max_context_chars` so a large
/// document cannot blow up the prompt. `include_counter` asks the model for
/// alternative wording (counter-redline mode only).
pub fn build_judgment_prompt(
    redline: &Redline,
    rule: Option<&Rule>,
    include_counter: bool,
    max_context_chars: usize,
) -> String {
    let change_lines = match redline.kind {
        RedlineKind::Insertion => format!("Inserted text: {}", redline.added_text),
        RedlineKind::Deletion => format!("Deleted text: {}", redline.removed_text),
        RedlineKind::Replacement => format!(
            "Deleted text: {}\nInserted text: {}",
            redline.removed_text, redline.added_text
        ),
        RedlineKind::Formatting => "Formatting-only change (no text edit).".to_string(),
    };

    let author = redline.author.as_deref().unwrap_or("Unknown");
    let context_before = truncate_chars(&redline.context_before, max_context_chars / 2);
    let context_after = truncate_chars(&redline.context_after, max_context_chars / 2);

    let rule_section = match rule {
        Some(rule) => format!(
            "MATCHED PLAYBOOK RULE:\nPRINCIPLE: {}\nRESPONSE GUIDANCE: {}",
            rule.principle, rule.response_template
        ),
        None => "MATCHED PLAYBOOK RULE:\nNo playbook rule matched this change. Judge it on \
                 general contract-review principles and say so in the assessment."
            .to_string(),
    };

    let counter_field = if include_counter {
        ",\n  \"counter_text\": \"alternative wording to propose as a counter-redline, \
         or omit if none is warranted\""
    } else {
        ""
    };

    format!(
        "REDLINE UNDER REVIEW:\n\
         Kind: {kind}\n\
         Author: {author}\n\
         {change_lines}\n\
         Context before: {context_before}\n\
         Context after: {context_after}\n\
         \n\
         {rule_section}\n\
         \n\
         TASK:\n\
         1. Assess whether this change is acceptable under the playbook rule above \
         (or general principles when no rule matched).\n\
         2. Classify the risk the change introduces.\n\
         3. Recommend a concrete action for the reviewer.\n\
         \n\
         Respond with JSON exactly in this shape:\n\
         {{\n\
         \x20 \"risk_level\": \"low | medium | high\",\n\
         \x20 \"assessment\": \"how the change aligns with the playbook\",\n\
         \x20 \"recommended_action\": \"what the reviewer should do\"{counter_field}\n\
         }}\n\
         recommended_action may be an empty string only when risk_level is \"low\" \
         and nothing needs to change.",
        kind = redline.kind.as_str(),
    )
}

/// Truncate on a char boundary, marking the cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}…")
}
