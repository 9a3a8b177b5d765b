use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::HostedApiError;

/// A suggested edit as the hosted API reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    /// Stable suggestion id; one id may cover both sides of a replace.
    pub id: String,
    pub kind: SuggestionKind,
    pub text: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Insertion,
    Deletion,
}

/// One page of the suggestion listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionPage {
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Hosted document API surface the pipeline needs. Auth is resolved inside
/// the implementation; callers only ever see `HostedApiError::Auth` when it
/// could not be.
pub trait HostedDocsApi: Send + Sync {
    /// One page of suggested edits, in document order across pages.
    fn list_suggestions(
        &self,
        doc_id: &str,
        page_token: Option<&str>,
    ) -> Result<SuggestionPage, HostedApiError>;

    /// Current visible document text.
    fn document_text(&self, doc_id: &str) -> Result<String, HostedApiError>;

    /// Attach a review comment to a suggestion.
    fn insert_comment(
        &self,
        doc_id: &str,
        suggestion_id: &str,
        body: &str,
    ) -> Result<(), HostedApiError>;

    /// Propose alternative wording as a new suggestion next to an existing
    /// one, attributed to `author`.
    fn insert_suggestion(
        &self,
        doc_id: &str,
        anchor_suggestion_id: &str,
        text: &str,
        author: &str,
    ) -> Result<(), HostedApiError>;
}
