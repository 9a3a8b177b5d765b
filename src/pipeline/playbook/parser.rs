//! Line-oriented playbook parser.
//!
//! A rule is a `PRINCIPLE:` line followed by an optional `RESPONSE:` line,
//! with optional `PRIORITY:` and `APPLIES TO:` modifiers. Blank lines end
//! the current rule; `#` lines are comments; any other line continues the
//! field it follows.

use crate::models::{RedlineKind, Rule};

use super::PlaybookParseError;

/// Which field continuation lines append to.
enum Field {
    Principle,
    Response,
}

/// Parse playbook source into an ordered rule list.
///
/// An empty or whitespace-only source is an error. A source that contains
/// only comments is an explicitly empty playbook (zero rules, valid).
pub fn parse_playbook(source: &str) -> Result<Vec<Rule>, PlaybookParseError> {
    if source.trim().is_empty() {
        return Err(PlaybookParseError::EmptySource);
    }

    let mut rules = Vec::new();
    let mut current: Option<Rule> = None;
    let mut field = Field::Principle;

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if line.is_empty() {
            if let Some(rule) = current.take() {
                rules.push(rule);
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let upper = line.to_ascii_uppercase();
        if let Some(rest) = upper.strip_prefix("PRINCIPLE:").map(|_| &line[10..]) {
            if let Some(rule) = current.take() {
                rules.push(rule);
            }
            current = Some(Rule {
                principle: rest.trim().to_string(),
                response_template: String::new(),
                priority: None,
                applies_to: None,
            });
            field = Field::Principle;
        } else if let Some(rest) = upper.strip_prefix("RESPONSE:").map(|_| &line[9..]) {
            let rule = current
                .as_mut()
                .ok_or_else(|| PlaybookParseError::OrphanField {
                    line: line_no,
                    field: "RESPONSE".into(),
                })?;
            rule.response_template = rest.trim().to_string();
            field = Field::Response;
        } else if let Some(rest) = upper.strip_prefix("PRIORITY:").map(|_| &line[9..]) {
            let rule = current
                .as_mut()
                .ok_or_else(|| PlaybookParseError::OrphanField {
                    line: line_no,
                    field: "PRIORITY".into(),
                })?;
            let value = rest.trim();
            rule.priority = Some(value.parse::<u32>().map_err(|_| {
                PlaybookParseError::InvalidPriority {
                    line: line_no,
                    value: value.into(),
                }
            })?);
        } else if let Some(rest) = upper.strip_prefix("APPLIES TO:").map(|_| &line[11..]) {
            let rule = current
                .as_mut()
                .ok_or_else(|| PlaybookParseError::OrphanField {
                    line: line_no,
                    field: "APPLIES TO".into(),
                })?;
            let mut kinds = Vec::new();
            for part in rest.split(',') {
                let value = part.trim().to_ascii_lowercase();
                if value.is_empty() {
                    continue;
                }
                let kind = value.parse::<RedlineKind>().map_err(|_| {
                    PlaybookParseError::InvalidKind {
                        line: line_no,
                        value: value.clone(),
                    }
                })?;
                kinds.push(kind);
            }
            if !kinds.is_empty() {
                rule.applies_to = Some(kinds);
            }
        } else {
            // Continuation of the field last written.
            match current.as_mut() {
                Some(rule) => match field {
                    Field::Principle => {
                        rule.principle.push(' ');
                        rule.principle.push_str(line);
                    }
                    Field::Response => {
                        rule.response_template.push(' ');
                        rule.response_template.push_str(line);
                    }
                },
                None => {
                    return Err(PlaybookParseError::OrphanField {
                        line: line_no,
                        field: "continuation".into(),
                    })
                }
            }
        }
    }

    if let Some(rule) = current.take() {
        rules.push(rule);
    }

    Ok(rules)
}
