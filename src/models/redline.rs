use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a tracked change does to the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedlineKind {
    Insertion,
    Deletion,
    Replacement,
    /// Run-property change with no text edit (font, emphasis, etc.).
    Formatting,
}

impl RedlineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insertion => "insertion",
            Self::Deletion => "deletion",
            Self::Replacement => "replacement",
            Self::Formatting => "formatting",
        }
    }
}

impl std::str::FromStr for RedlineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insertion" => Ok(Self::Insertion),
            "deletion" => Ok(Self::Deletion),
            "replacement" => Ok(Self::Replacement),
            "formatting" => Ok(Self::Formatting),
            other => Err(format!("unknown redline kind: {other}")),
        }
    }
}

/// Opaque locator for re-finding a change during write-back.
///
/// Valid for a single extraction/annotation cycle on the same document
/// bytes. Re-opening or mutating the document invalidates all anchors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum Anchor {
    /// Packaged-format anchor: the `span`-long run of tracked-change
    /// elements starting at the `change`-th such element (document order,
    /// zero-based) of the `paragraph`-th paragraph.
    Packaged {
        paragraph: usize,
        change: usize,
        span: usize,
    },
    /// Hosted-format anchor: the remote suggestion id.
    Hosted { suggestion_id: String },
}

/// One tracked change, normalized across document back-ends.
///
/// Created by an extractor, read-only afterwards. `id` values are dense in
/// extraction order (0..n) and never reused within a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redline {
    pub id: u32,
    pub kind: RedlineKind,
    pub author: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Bounded surrounding text. For prompts and human review only; the
    /// anchor is authoritative for positioning.
    pub context_before: String,
    pub context_after: String,
    pub anchor: Anchor,
    /// Empty for pure insertions.
    pub removed_text: String,
    /// Empty for pure deletions.
    pub added_text: String,
}

impl Redline {
    /// Single-line description used in prompts and log output.
    pub fn display_text(&self) -> String {
        match self.kind {
            RedlineKind::Insertion => self.added_text.clone(),
            RedlineKind::Deletion => self.removed_text.clone(),
            RedlineKind::Replacement => {
                format!("{} -> {}", self.removed_text, self.added_text)
            }
            RedlineKind::Formatting => format!("[formatting] {}", self.context_after),
        }
    }

    /// All change text plus context, for rule matching.
    pub fn matchable_text(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if !self.removed_text.is_empty() {
            parts.push(self.removed_text.as_str());
        }
        if !self.added_text.is_empty() {
            parts.push(self.added_text.as_str());
        }
        if !self.context_before.is_empty() {
            parts.push(self.context_before.as_str());
        }
        if !self.context_after.is_empty() {
            parts.push(self.context_after.as_str());
        }
        parts.join(" ")
    }
}
