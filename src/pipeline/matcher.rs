//! Rule matching.
//!
//! Scores each candidate rule by lexical overlap between the redline's
//! changed text (plus bounded context) and the rule principle. Scoring is
//! deterministic for fixed inputs: same tokens, same score, same winner.

use std::collections::BTreeSet;

use crate::config::{MatcherConfig, UnmatchedPolicy};
use crate::models::{Playbook, Redline};

/// Shortest token that participates in scoring. Filters out articles,
/// pronouns and similar glue words without a stopword list.
const MIN_TOKEN_LEN: usize = 3;

/// A selected rule with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    /// Index into the playbook snapshot.
    pub index: usize,
    pub score: f32,
    /// True when the rule was chosen by the unmatched-fallback policy
    /// rather than by score.
    pub fallback: bool,
}

/// Select the best-matching rule for a redline, or none.
///
/// "None" is an expected, common outcome; downstream judgment treats it as
/// first-class input, not an error.
pub fn match_rule(
    redline: &Redline,
    playbook: &Playbook,
    config: &MatcherConfig,
) -> Option<RuleMatch> {
    let redline_tokens = tokenize(&redline.matchable_text());

    let mut best: Option<(usize, f32, u32)> = None;
    for (index, rule) in playbook.rules.iter().enumerate() {
        if !rule.applies_to_kind(redline.kind) {
            continue;
        }
        let score = overlap_score(&redline_tokens, &tokenize(&rule.principle));
        if score < config.min_score {
            continue;
        }
        // Rules without an explicit rank lose ties to ranked rules; among
        // equals the earlier playbook entry wins (strict > comparisons keep
        // the first-seen candidate).
        let priority = rule.priority.unwrap_or(u32::MAX);
        let better = match &best {
            None => true,
            Some((_, best_score, best_priority)) => {
                score > *best_score || (score == *best_score && priority < *best_priority)
            }
        };
        if better {
            best = Some((index, score, priority));
        }
    }

    if let Some((index, score, _)) = best {
        return Some(RuleMatch {
            index,
            score,
            fallback: false,
        });
    }

    match config.unmatched_policy {
        UnmatchedPolicy::NoRule => None,
        // By convention the catch-all is the playbook's final rule, the way
        // general-review guidance closes out a negotiation playbook.
        UnmatchedPolicy::DefaultRule => {
            let last = playbook.rules.len().checked_sub(1)?;
            if !playbook.rules[last].applies_to_kind(redline.kind) {
                return None;
            }
            Some(RuleMatch {
                index: last,
                score: 0.0,
                fallback: true,
            })
        }
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Fraction of the rule's principle tokens present in the redline text.
fn overlap_score(redline_tokens: &BTreeSet<String>, rule_tokens: &BTreeSet<String>) -> f32 {
    if rule_tokens.is_empty() {
        return 0.0;
    }
    let overlap = rule_tokens.intersection(redline_tokens).count();
    overlap as f32 / rule_tokens.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Anchor, RedlineKind, Rule};

    fn redline(kind: RedlineKind, removed: &str, added: &str, context: &str) -> Redline {
        Redline {
            id: 0,
            kind,
            author: None,
            timestamp: None,
            context_before: context.into(),
            context_after: String::new(),
            anchor: Anchor::Packaged {
                paragraph: 0,
                change: 0,
                span: 1,
            },
            removed_text: removed.into(),
            added_text: added.into(),
        }
    }

    fn rule(principle: &str, priority: Option<u32>, applies_to: Option<Vec<RedlineKind>>) -> Rule {
        Rule {
            principle: principle.into(),
            response_template: "flag for review".into(),
            priority,
            applies_to,
        }
    }

    #[test]
    fn picks_highest_overlap_rule() {
        let playbook = Playbook::new(
            "default",
            vec![
                rule("payment schedule terms", None, None),
                rule("obligation language shall changes", None, None),
            ],
        );
        let rl = redline(
            RedlineKind::Replacement,
            "shall",
            "may",
            "supplier obligation language",
        );
        let m = match_rule(&rl, &playbook, &MatcherConfig::default()).unwrap();
        assert_eq!(m.index, 1);
        assert!(!m.fallback);
        assert!(m.score > 0.0);
    }

    #[test]
    fn matching_is_deterministic() {
        let playbook = Playbook::new(
            "default",
            vec![
                rule("obligation language changes", None, None),
                rule("obligation wording changes", None, None),
            ],
        );
        let rl = redline(
            RedlineKind::Replacement,
            "shall",
            "may",
            "obligation changes in wording language",
        );
        let config = MatcherConfig::default();
        let first = match_rule(&rl, &playbook, &config);
        for _ in 0..20 {
            assert_eq!(match_rule(&rl, &playbook, &config), first);
        }
    }

    #[test]
    fn equal_scores_tie_break_by_priority_then_order() {
        // Identical principles score identically.
        let playbook = Playbook::new(
            "default",
            vec![
                rule("liability cap changes", Some(5), None),
                rule("liability cap changes", Some(1), None),
                rule("liability cap changes", Some(1), None),
            ],
        );
        let rl = redline(RedlineKind::Insertion, "", "cap", "liability cap changes");
        let m = match_rule(&rl, &playbook, &MatcherConfig::default()).unwrap();
        // Priority 1 beats 5; between the two priority-1 rules the earlier wins.
        assert_eq!(m.index, 1);
    }

    #[test]
    fn first_rule_wins_when_no_priorities() {
        let playbook = Playbook::new(
            "default",
            vec![
                rule("indemnity scope changes", None, None),
                rule("indemnity scope changes", None, None),
            ],
        );
        let rl = redline(RedlineKind::Deletion, "indemnity scope", "", "changes");
        let m = match_rule(&rl, &playbook, &MatcherConfig::default()).unwrap();
        assert_eq!(m.index, 0);
    }

    #[test]
    fn applies_to_filters_candidates() {
        let playbook = Playbook::new(
            "default",
            vec![rule(
                "obligation language changes",
                None,
                Some(vec![RedlineKind::Deletion]),
            )],
        );
        let rl = redline(
            RedlineKind::Insertion,
            "",
            "may",
            "obligation language changes",
        );
        assert!(match_rule(&rl, &playbook, &MatcherConfig::default()).is_none());
    }

    #[test]
    fn below_threshold_is_no_match() {
        let playbook = Playbook::new(
            "default",
            vec![rule("payment schedule milestones invoicing", None, None)],
        );
        let rl = redline(RedlineKind::Insertion, "", "confidential", "trade secrets");
        assert!(match_rule(&rl, &playbook, &MatcherConfig::default()).is_none());
    }

    #[test]
    fn unmatched_policy_default_rule_falls_back_to_last() {
        let playbook = Playbook::new(
            "default",
            vec![
                rule("payment schedule milestones", None, None),
                rule("general review of any other change", None, None),
            ],
        );
        let rl = redline(RedlineKind::Insertion, "", "confidential", "trade secrets");
        let config = MatcherConfig {
            unmatched_policy: UnmatchedPolicy::DefaultRule,
            ..MatcherConfig::default()
        };
        let m = match_rule(&rl, &playbook, &config).unwrap();
        assert_eq!(m.index, 1);
        assert!(m.fallback);
        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn unmatched_policy_no_rule_returns_none() {
        let playbook = Playbook::new(
            "default",
            vec![rule("general review of any other change", None, None)],
        );
        let rl = redline(RedlineKind::Insertion, "", "xyzzy", "");
        let config = MatcherConfig {
            unmatched_policy: UnmatchedPolicy::NoRule,
            ..MatcherConfig::default()
        };
        assert!(match_rule(&rl, &playbook, &config).is_none());
    }

    #[test]
    fn empty_playbook_never_matches() {
        let playbook = Playbook::new("default", vec![]);
        let rl = redline(RedlineKind::Insertion, "", "anything", "");
        let config = MatcherConfig {
            unmatched_policy: UnmatchedPolicy::DefaultRule,
            ..MatcherConfig::default()
        };
        assert!(match_rule(&rl, &playbook, &config).is_none());
    }
}
