//! Strict parsing of model replies into verdicts.
//!
//! The model is asked for a bare JSON object but replies routinely arrive
//! wrapped in markdown fences or prose. Fence/prose stripping is lenient;
//! the schema check on the extracted object is strict.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::models::{RiskLevel, Verdict};

use super::JudgmentError;

#[derive(Deserialize)]
struct RawVerdict {
    risk_level: String,
    assessment: String,
    #[serde(default)]
    recommended_action: Option<String>,
    #[serde(default)]
    counter_text: Option<String>,
}

/// Parse a model reply against the verdict contract.
///
/// `expect_counter` is true in counter-redline mode; outside it any
/// counter_text the model volunteers is dropped.
pub fn parse_verdict_response(
    response: &str,
    redline_id: u32,
    matched_rule: Option<usize>,
    expect_counter: bool,
) -> Result<Verdict, JudgmentError> {
    let json_str = extract_json_object(response)
        .ok_or_else(|| JudgmentError::MalformedResponse("no JSON object in reply".into()))?;

    let raw: RawVerdict = serde_json::from_str(&json_str)
        .map_err(|e| JudgmentError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let risk = RiskLevel::parse_lenient(&raw.risk_level).ok_or_else(|| {
        JudgmentError::MalformedResponse(format!("invalid risk_level: {:?}", raw.risk_level))
    })?;

    let assessment = raw.assessment.trim().to_string();
    if assessment.is_empty() {
        return Err(JudgmentError::MalformedResponse(
            "assessment must be non-empty".into(),
        ));
    }

    let recommended_action = raw
        .recommended_action
        .map(|a| a.trim().to_string())
        .unwrap_or_default();
    if recommended_action.is_empty() && risk != RiskLevel::Low {
        return Err(JudgmentError::MalformedResponse(format!(
            "recommended_action may be empty only at low risk (got {})",
            risk.as_str()
        )));
    }

    let counter_text = if expect_counter {
        raw.counter_text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    } else {
        None
    };

    Ok(Verdict {
        redline_id,
        risk,
        matched_rule,
        assessment,
        recommended_action,
        counter_text,
    })
}

/// Pull the JSON object out of a reply that may carry markdown fences or
/// surrounding prose.
fn extract_json_object(response: &str) -> Option<String> {
    static OBJECT_RE: OnceLock<Regex> = OnceLock::new();
    let re = OBJECT_RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

    let mut text = response.trim();

    // Prefer the content of a ```json fence when one is present.
    if let Some(start) = text.find("```json") {
        let after = &text[start + 7..];
        if let Some(end) = after.find("```") {
            text = after[..end].trim();
        }
    } else if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        if let Some(end) = after.find("```") {
            text = after[..end].trim();
        }
    }

    re.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
  "risk_level": "high",
  "assessment": "Softens a mandatory delivery obligation.",
  "recommended_action": "Reject the change and restore shall.",
  "counter_text": "shall use commercially reasonable efforts to"
}"#;

    #[test]
    fn parses_bare_object() {
        let v = parse_verdict_response(VALID, 4, Some(1), true).unwrap();
        assert_eq!(v.redline_id, 4);
        assert_eq!(v.risk, RiskLevel::High);
        assert_eq!(v.matched_rule, Some(1));
        assert!(v.counter_text.is_some());
    }

    #[test]
    fn parses_fenced_object_with_prose() {
        let response = format!("Here is my analysis:\n\n```json\n{VALID}\n```\nHope that helps!");
        let v = parse_verdict_response(&response, 0, None, true).unwrap();
        assert_eq!(v.risk, RiskLevel::High);
    }

    #[test]
    fn risk_level_is_case_insensitive() {
        let response = r#"{"risk_level": "Medium", "assessment": "ok", "recommended_action": "review"}"#;
        let v = parse_verdict_response(response, 0, None, false).unwrap();
        assert_eq!(v.risk, RiskLevel::Medium);
    }

    #[test]
    fn unknown_risk_level_is_rejected() {
        let response = r#"{"risk_level": "critical", "assessment": "x", "recommended_action": "y"}"#;
        assert!(matches!(
            parse_verdict_response(response, 0, None, false),
            Err(JudgmentError::MalformedResponse(_))
        ));
    }

    #[test]
    fn empty_assessment_is_rejected() {
        let response = r#"{"risk_level": "low", "assessment": "  ", "recommended_action": ""}"#;
        assert!(matches!(
            parse_verdict_response(response, 0, None, false),
            Err(JudgmentError::MalformedResponse(_))
        ));
    }

    #[test]
    fn empty_action_allowed_only_at_low_risk() {
        let low = r#"{"risk_level": "low", "assessment": "Typo fix.", "recommended_action": ""}"#;
        assert!(parse_verdict_response(low, 0, None, false).is_ok());

        let high = r#"{"risk_level": "high", "assessment": "Bad.", "recommended_action": ""}"#;
        assert!(parse_verdict_response(high, 0, None, false).is_err());
    }

    #[test]
    fn counter_text_dropped_outside_counter_mode() {
        let v = parse_verdict_response(VALID, 0, None, false).unwrap();
        assert!(v.counter_text.is_none());
    }

    #[test]
    fn missing_json_is_rejected() {
        assert!(matches!(
            parse_verdict_response("I cannot judge this change.", 0, None, false),
            Err(JudgmentError::MalformedResponse(_))
        ));
    }

    #[test]
    fn garbage_json_is_rejected() {
        assert!(matches!(
            parse_verdict_response("{not valid json}", 0, None, false),
            Err(JudgmentError::MalformedResponse(_))
        ));
    }
}
