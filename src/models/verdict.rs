use serde::{Deserialize, Serialize};

/// Risk classification for one redline. Total order: Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Case-insensitive parse; the model is allowed to answer "Low",
    /// "MEDIUM", etc.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// The judgment outcome for one redline.
///
/// Created exactly once per redline by the judgment engine, consumed exactly
/// once by the annotator, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub redline_id: u32,
    pub risk: RiskLevel,
    /// Index into the playbook snapshot the run matched against. Absent
    /// means no playbook rule applied.
    pub matched_rule: Option<usize>,
    /// Non-empty by contract.
    pub assessment: String,
    /// May be empty only when `risk` is Low and no counter-proposal is
    /// warranted.
    pub recommended_action: String,
    /// Alternative wording; only produced in counter-redline mode.
    pub counter_text: Option<String>,
}

impl Verdict {
    /// Text body for an inline review comment.
    pub fn comment_body(&self) -> String {
        let mut body = format!("[{} risk] {}", self.risk.as_str(), self.assessment);
        if !self.recommended_action.is_empty() {
            body.push_str("\nRecommended action: ");
            body.push_str(&self.recommended_action);
        }
        body
    }
}

/// A recorded judgment failure for one redline. Failures are reported
/// alongside verdicts; a failed redline never receives a fabricated verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgmentFailure {
    pub redline_id: u32,
    pub reason: String,
    /// Reviewer-facing note carried into the run report so a human knows
    /// the change still needs manual review.
    pub manual_review_note: String,
}

impl JudgmentFailure {
    pub fn new(redline_id: u32, reason: impl Into<String>) -> Self {
        Self {
            redline_id,
            reason: reason.into(),
            manual_review_note: "Automated review failed for this change; review it manually \
                                 against the playbook."
                .into(),
        }
    }
}
