use serde::{Deserialize, Serialize};

use super::redline::RedlineKind;

/// One playbook entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Free-text condition. Used both for matching and for prompt context.
    pub principle: String,
    /// Free-text guidance handed to the judgment step.
    pub response_template: String,
    /// Explicit rank, lower = higher precedence. Absent means document
    /// order decides (earlier wins).
    pub priority: Option<u32>,
    /// Kinds this rule applies to. Absent matches any kind.
    pub applies_to: Option<Vec<RedlineKind>>,
}

impl Rule {
    pub fn applies_to_kind(&self, kind: RedlineKind) -> bool {
        match &self.applies_to {
            None => true,
            Some(kinds) => kinds.contains(&kind),
        }
    }
}

/// An ordered, immutable set of rules for one contract type.
///
/// Hot reloads build a fresh `Playbook` and swap it in behind the store;
/// in-flight runs keep their snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl Playbook {
    pub fn new(name: &str, rules: Vec<Rule>) -> Self {
        Self {
            name: name.to_string(),
            rules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Full playbook text for prompt context, in source order.
    pub fn as_prompt_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let mut entry = format!("PRINCIPLE: {}", rule.principle);
            if !rule.response_template.is_empty() {
                entry.push_str(&format!("\nRESPONSE: {}", rule.response_template));
            }
            parts.push(entry);
        }
        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_without_filter_applies_to_all_kinds() {
        let rule = Rule {
            principle: "anything".into(),
            response_template: String::new(),
            priority: None,
            applies_to: None,
        };
        assert!(rule.applies_to_kind(RedlineKind::Insertion));
        assert!(rule.applies_to_kind(RedlineKind::Formatting));
    }

    #[test]
    fn rule_filter_restricts_kinds() {
        let rule = Rule {
            principle: "deletions only".into(),
            response_template: String::new(),
            priority: None,
            applies_to: Some(vec![RedlineKind::Deletion]),
        };
        assert!(rule.applies_to_kind(RedlineKind::Deletion));
        assert!(!rule.applies_to_kind(RedlineKind::Insertion));
    }

    #[test]
    fn prompt_text_preserves_source_order() {
        let playbook = Playbook::new(
            "default",
            vec![
                Rule {
                    principle: "first".into(),
                    response_template: "resp one".into(),
                    priority: None,
                    applies_to: None,
                },
                Rule {
                    principle: "second".into(),
                    response_template: String::new(),
                    priority: None,
                    applies_to: None,
                },
            ],
        );
        let text = playbook.as_prompt_text();
        let first = text.find("first").unwrap();
        let second = text.find("second").unwrap();
        assert!(first < second);
        assert!(text.contains("RESPONSE: resp one"));
    }
}
