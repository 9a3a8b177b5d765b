//! Write-back for the hosted document format.
//!
//! The remote API applies writes one by one, so anchors are validated
//! upfront against the document's current suggestion set: stale anchors
//! turn into recorded skips (or a strict abort) before anything is sent,
//! and an API failure mid-apply aborts the batch.

use std::collections::{HashMap, HashSet};

use crate::models::{Anchor, Redline};
use crate::pipeline::extraction::hosted::HostedBackend;
use crate::pipeline::extraction::{AnnotationMode, AnnotationOutcome, AnnotationPlan};

use super::{AnnotationError, AnnotationSkip};

pub(crate) fn annotate_hosted(
    backend: &HostedBackend,
    plan: &AnnotationPlan<'_>,
) -> Result<AnnotationOutcome, AnnotationError> {
    let api = backend.api();
    let doc_id = backend.doc_id();

    // Current suggestion ids, for anchor validation.
    let mut live_ids: HashSet<String> = HashSet::new();
    let mut page_token: Option<String> = None;
    loop {
        let page = api.list_suggestions(doc_id, page_token.as_deref())?;
        live_ids.extend(page.suggestions.into_iter().map(|s| s.id));
        match page.next_page_token {
            Some(next) => page_token = Some(next),
            None => break,
        }
    }

    let redline_by_id: HashMap<u32, &Redline> =
        plan.redlines.iter().map(|r| (r.id, r)).collect();

    let mut skipped = Vec::new();
    let mut to_apply = Vec::new();
    for verdict in plan.verdicts {
        let resolved = redline_by_id
            .get(&verdict.redline_id)
            .ok_or_else(|| format!("no extracted redline with id {}", verdict.redline_id))
            .and_then(|redline| match &redline.anchor {
                Anchor::Hosted { suggestion_id } if live_ids.contains(suggestion_id) => {
                    Ok(suggestion_id.clone())
                }
                Anchor::Hosted { suggestion_id } => Err(format!(
                    "suggestion {suggestion_id} no longer exists in the document"
                )),
                Anchor::Packaged { .. } => {
                    Err("anchor does not belong to this document format".into())
                }
            });
        match resolved {
            Ok(suggestion_id) => to_apply.push((verdict, suggestion_id)),
            Err(detail) => {
                if plan.config.strict {
                    return Err(AnnotationError::InvalidAnchor {
                        redline_id: verdict.redline_id,
                        detail,
                    });
                }
                tracing::warn!(
                    redline_id = verdict.redline_id,
                    reason = %detail,
                    "Skipping hosted annotation with invalid anchor"
                );
                skipped.push(AnnotationSkip {
                    redline_id: verdict.redline_id,
                    reason: detail,
                });
            }
        }
    }

    let mut applied = 0usize;
    for (verdict, suggestion_id) in to_apply {
        let as_counter =
            plan.mode == AnnotationMode::CounterRedline && verdict.counter_text.is_some();
        if as_counter {
            let counter = verdict.counter_text.as_deref().expect("checked above");
            api.insert_suggestion(
                doc_id,
                &suggestion_id,
                counter,
                &plan.config.reviewer_author,
            )?;
        } else {
            api.insert_comment(doc_id, &suggestion_id, &verdict.comment_body())?;
        }
        applied += 1;
    }

    tracing::info!(
        doc_id = %doc_id,
        applied,
        skipped = skipped.len(),
        "Annotated hosted document"
    );
    Ok(AnnotationOutcome { applied, skipped })
}
