//! Hosted-document back-end.
//!
//! Suggestions arrive paged from the remote API. A rate-limited or failing
//! page is retried on its own with backoff; the document as a whole is
//! never re-fetched because of one bad page.

use std::sync::Arc;
use std::time::Duration;

use crate::models::{Anchor, Redline, RedlineKind};
use crate::pipeline::annotate::{self, AnnotationError};
use crate::pipeline::retry::{with_retry, RetryPolicy};
use crate::remote::{HostedDocsApi, Suggestion, SuggestionKind};

use super::merge::normalize_ws;
use super::types::{AnnotationOutcome, AnnotationPlan, DocumentBackend};
use super::ExtractionError;

/// Per-page fetch attempts.
const PAGE_ATTEMPTS: u32 = 3;
const PAGE_BACKOFF: Duration = Duration::from_millis(500);

pub struct HostedBackend {
    api: Arc<dyn HostedDocsApi>,
    doc_id: String,
    page_policy: RetryPolicy,
}

impl HostedBackend {
    pub fn new(api: Arc<dyn HostedDocsApi>, doc_id: &str) -> Self {
        Self {
            api,
            doc_id: doc_id.to_string(),
            page_policy: RetryPolicy::new(PAGE_ATTEMPTS, PAGE_BACKOFF),
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub(crate) fn api(&self) -> &Arc<dyn HostedDocsApi> {
        &self.api
    }

    fn fetch_all_suggestions(&self) -> Result<Vec<Suggestion>, ExtractionError> {
        let mut suggestions = Vec::new();
        let mut page_token: Option<String> = None;
        let mut page_no = 0usize;

        loop {
            let token = page_token.clone();
            let page = with_retry(
                &self.page_policy,
                "suggestion-page",
                || self.api.list_suggestions(&self.doc_id, token.as_deref()),
                |e| e.is_transient(),
            )?;
            page_no += 1;
            tracing::debug!(
                doc_id = %self.doc_id,
                page = page_no,
                suggestions = page.suggestions.len(),
                "Fetched suggestion page"
            );
            suggestions.extend(page.suggestions);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(suggestions)
    }
}

/// Normalize raw suggestions into redlines. A deletion and insertion
/// sharing one suggestion id are the two halves of a replace.
fn suggestions_to_redlines(suggestions: &[Suggestion]) -> Vec<Redline> {
    let mut redlines = Vec::new();
    let mut i = 0;

    while i < suggestions.len() {
        let s = &suggestions[i];
        let paired_replace = s.kind == SuggestionKind::Deletion
            && suggestions
                .get(i + 1)
                .is_some_and(|n| n.id == s.id && n.kind == SuggestionKind::Insertion);

        let (kind, removed, added, consumed) = if paired_replace {
            let next = &suggestions[i + 1];
            (
                RedlineKind::Replacement,
                normalize_ws(&s.text),
                normalize_ws(&next.text),
                2,
            )
        } else {
            match s.kind {
                SuggestionKind::Insertion => {
                    (RedlineKind::Insertion, String::new(), normalize_ws(&s.text), 1)
                }
                SuggestionKind::Deletion => {
                    (RedlineKind::Deletion, normalize_ws(&s.text), String::new(), 1)
                }
            }
        };

        if !removed.is_empty() || !added.is_empty() {
            redlines.push(Redline {
                id: redlines.len() as u32,
                kind,
                author: s.author.clone().filter(|a| !a.is_empty()),
                timestamp: s.timestamp,
                context_before: String::new(),
                context_after: String::new(),
                anchor: Anchor::Hosted {
                    suggestion_id: s.id.clone(),
                },
                removed_text: removed,
                added_text: added,
            });
        }
        i += consumed;
    }
    redlines
}

impl DocumentBackend for HostedBackend {
    fn extract(&self) -> Result<Vec<Redline>, ExtractionError> {
        let suggestions = self.fetch_all_suggestions()?;
        let redlines = suggestions_to_redlines(&suggestions);
        tracing::debug!(
            doc_id = %self.doc_id,
            suggestions = suggestions.len(),
            redlines = redlines.len(),
            "Extracted redlines from hosted document"
        );
        Ok(redlines)
    }

    fn document_text(&self) -> Result<String, ExtractionError> {
        Ok(self.api.document_text(&self.doc_id)?)
    }

    fn annotate(&self, plan: &AnnotationPlan<'_>) -> Result<AnnotationOutcome, AnnotationError> {
        annotate::hosted::annotate_hosted(self, plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::MockHostedApi;
    use crate::remote::SuggestionPage;

    fn suggestion(id: &str, kind: SuggestionKind, text: &str) -> Suggestion {
        Suggestion {
            id: id.into(),
            kind,
            text: text.into(),
            author: Some("Counterparty".into()),
            timestamp: None,
        }
    }

    #[test]
    fn pages_are_concatenated_in_order() {
        let api = Arc::new(MockHostedApi::new(
            vec![
                SuggestionPage {
                    suggestions: vec![suggestion("s1", SuggestionKind::Insertion, "alpha")],
                    next_page_token: None,
                },
                SuggestionPage {
                    suggestions: vec![suggestion("s2", SuggestionKind::Deletion, "beta")],
                    next_page_token: None,
                },
            ],
            "doc text",
        ));
        let backend = HostedBackend::new(api, "doc-1");
        let redlines = backend.extract().unwrap();
        assert_eq!(redlines.len(), 2);
        assert_eq!(redlines[0].added_text, "alpha");
        assert_eq!(redlines[1].removed_text, "beta");
        assert_eq!(redlines[0].id, 0);
        assert_eq!(redlines[1].id, 1);
    }

    #[test]
    fn rate_limited_page_is_retried_not_fatal() {
        let api = Arc::new(
            MockHostedApi::new(
                vec![SuggestionPage {
                    suggestions: vec![suggestion("s1", SuggestionKind::Insertion, "gamma")],
                    next_page_token: None,
                }],
                "doc text",
            )
            .failing_first(2),
        );
        let backend = HostedBackend::new(api, "doc-1");
        let redlines = backend.extract().unwrap();
        assert_eq!(redlines.len(), 1);
    }

    #[test]
    fn persistent_rate_limit_exhausts_retries() {
        let api = Arc::new(
            MockHostedApi::new(
                vec![SuggestionPage::default()],
                "doc text",
            )
            .failing_first(10),
        );
        let backend = HostedBackend::new(api, "doc-1");
        assert!(matches!(
            backend.extract(),
            Err(ExtractionError::Api(
                crate::remote::HostedApiError::RateLimited
            ))
        ));
    }

    #[test]
    fn shared_id_del_ins_pair_becomes_replacement() {
        let suggestions = vec![
            suggestion("s1", SuggestionKind::Deletion, "shall"),
            suggestion("s1", SuggestionKind::Insertion, "may"),
            suggestion("s2", SuggestionKind::Insertion, "promptly"),
        ];
        let redlines = suggestions_to_redlines(&suggestions);
        assert_eq!(redlines.len(), 2);
        assert_eq!(redlines[0].kind, RedlineKind::Replacement);
        assert_eq!(redlines[0].removed_text, "shall");
        assert_eq!(redlines[0].added_text, "may");
        assert_eq!(redlines[1].kind, RedlineKind::Insertion);
    }

    #[test]
    fn whitespace_only_suggestions_are_dropped() {
        let suggestions = vec![suggestion("s1", SuggestionKind::Insertion, "   ")];
        assert!(suggestions_to_redlines(&suggestions).is_empty());
    }

    #[test]
    fn hosted_anchor_carries_suggestion_id() {
        let suggestions = vec![suggestion("s9", SuggestionKind::Deletion, "gone")];
        let redlines = suggestions_to_redlines(&suggestions);
        assert_eq!(
            redlines[0].anchor,
            Anchor::Hosted {
                suggestion_id: "s9".into()
            }
        );
    }
}
