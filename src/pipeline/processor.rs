//! Document run orchestrator.
//!
//! Single entry point that drives one document through the full pipeline:
//! extract → match → judge → annotate. Uses trait-based DI for the document
//! back-end and the model client so every stage is testable with mocks.
//!
//! Failure policy: per-redline judgment failures are collected into the run
//! report next to the verdicts (partial success is a valid, reportable
//! outcome); extraction, playbook, annotation, and auth failures abort the
//! run with a stage-naming terminal error.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::models::{JudgmentFailure, Redline, Verdict};
use crate::pipeline::annotate::{AnnotationError, AnnotationSkip};
use crate::pipeline::extraction::{
    AnnotationMode, AnnotationPlan, DocumentBackend, ExtractionError,
};
use crate::pipeline::judgment::{
    HttpModelClient, JudgmentEngine, JudgmentError, JudgmentJob, ModelClient,
};
use crate::pipeline::matcher::match_rule;
use crate::pipeline::playbook::{PlaybookParseError, PlaybookStore};
use crate::remote::HostedApiError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Terminal errors for a document run, naming the failed stage.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Extraction failed: {0}")]
    Extraction(ExtractionError),

    #[error("Playbook failed to load: {0}")]
    Playbook(#[from] PlaybookParseError),

    #[error("Judgment failed: {0}")]
    Judgment(#[from] JudgmentError),

    #[error("Annotation failed: {0}")]
    Annotation(AnnotationError),

    #[error("External authentication failed: {0}")]
    Auth(String),
}

impl From<ExtractionError> for RunError {
    fn from(e: ExtractionError) -> Self {
        if e.is_auth() {
            Self::Auth(e.to_string())
        } else {
            Self::Extraction(e)
        }
    }
}

impl From<AnnotationError> for RunError {
    fn from(e: AnnotationError) -> Self {
        if matches!(&e, AnnotationError::Api(HostedApiError::Auth(_))) {
            Self::Auth(e.to_string())
        } else {
            Self::Annotation(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Everything one document run produced. Either the annotated document
/// exists and this report is complete, or the run failed with a `RunError`.
/// Never an annotated document with silently missing annotations.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Name of the playbook the run matched against.
    pub playbook: String,
    pub redline_count: usize,
    pub redlines: Vec<Redline>,
    /// In original redline order.
    pub verdicts: Vec<Verdict>,
    /// Redlines whose judgment failed, reported alongside the verdicts.
    pub judgment_failures: Vec<JudgmentFailure>,
    /// Verdicts that could not be written back (stale anchors).
    pub annotation_skips: Vec<AnnotationSkip>,
    /// False for analyze-only runs and zero-redline documents.
    pub annotated: bool,
}

impl RunReport {
    /// Markdown run summary, the reviewer-facing companion to the
    /// annotated document.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "# Redline review — run {}\n\nPlaybook: {}\nRedlines: {}\nVerdicts: {}\nJudgment failures: {}\nAnnotation skips: {}\n",
            self.run_id,
            self.playbook,
            self.redline_count,
            self.verdicts.len(),
            self.judgment_failures.len(),
            self.annotation_skips.len(),
        ));

        for verdict in &self.verdicts {
            let redline = self.redlines.iter().find(|r| r.id == verdict.redline_id);
            let change = redline
                .map(|r| format!("{}: {}", r.kind.as_str(), r.display_text()))
                .unwrap_or_else(|| format!("redline {}", verdict.redline_id));
            out.push_str(&format!(
                "\n## Redline {} — {} risk\n\n- Change: {}\n- Assessment: {}\n",
                verdict.redline_id,
                verdict.risk.as_str(),
                change,
                verdict.assessment,
            ));
            if !verdict.recommended_action.is_empty() {
                out.push_str(&format!("- Recommended action: {}\n", verdict.recommended_action));
            }
            if let Some(counter) = &verdict.counter_text {
                out.push_str(&format!("- Proposed wording: {counter}\n"));
            }
        }

        for failure in &self.judgment_failures {
            out.push_str(&format!(
                "\n## Redline {} — not judged\n\n- Reason: {}\n- {}\n",
                failure.redline_id, failure.reason, failure.manual_review_note,
            ));
        }

        for skip in &self.annotation_skips {
            out.push_str(&format!(
                "\n- Annotation for redline {} skipped: {}\n",
                skip.redline_id, skip.reason,
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one document per call. No shared mutable state between runs
/// beyond the playbook store snapshot, so documents process in parallel
/// freely.
pub struct RedlineProcessor {
    config: AgentConfig,
    store: Arc<PlaybookStore>,
    engine: JudgmentEngine,
}

impl RedlineProcessor {
    /// Production constructor: HTTP model client for the configured
    /// provider.
    pub fn from_config(
        config: AgentConfig,
        store: Arc<PlaybookStore>,
    ) -> Result<Self, JudgmentError> {
        let api_key = config
            .api_key()
            .ok_or(JudgmentError::MissingApiKey(config.provider.as_str()))?;
        let client =
            HttpModelClient::new(config.provider, api_key, config.judgment.request_timeout)
                .map_err(JudgmentError::Model)?;
        Ok(Self::with_client(config, store, Box::new(client)))
    }

    /// DI constructor, used by tests with a mock model client.
    pub fn with_client(
        config: AgentConfig,
        store: Arc<PlaybookStore>,
        client: Box<dyn ModelClient + Send + Sync>,
    ) -> Self {
        let engine = JudgmentEngine::new(client, &config.model, config.judgment.clone());
        Self {
            config,
            store,
            engine,
        }
    }

    /// Run the full pipeline for one document.
    ///
    /// `analyze_only` stops after judgment: verdicts are reported, nothing
    /// is written back, the document is untouched.
    pub fn process(
        &self,
        backend: &dyn DocumentBackend,
        contract_type: Option<&str>,
        mode: AnnotationMode,
        analyze_only: bool,
    ) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let _span = tracing::info_span!("process_document", %run_id).entered();

        // The playbook snapshot is fixed for the whole run; a hot reload
        // landing mid-run does not change what this document is judged by.
        let snapshot = self.store.snapshot();
        let playbook = snapshot.for_contract_type(contract_type);

        let redlines = backend.extract()?;
        tracing::info!(
            redlines = redlines.len(),
            playbook = %playbook.name,
            "Extraction complete"
        );

        if redlines.is_empty() {
            return Ok(RunReport {
                run_id,
                playbook: playbook.name.clone(),
                redline_count: 0,
                redlines,
                verdicts: vec![],
                judgment_failures: vec![],
                annotation_skips: vec![],
                annotated: false,
            });
        }

        let jobs: Vec<JudgmentJob<'_>> = redlines
            .iter()
            .map(|redline| {
                let matched = match_rule(redline, &playbook, &self.config.matcher);
                if let Some(m) = &matched {
                    tracing::debug!(
                        redline_id = redline.id,
                        rule = m.index,
                        score = m.score,
                        fallback = m.fallback,
                        "Rule matched"
                    );
                }
                JudgmentJob {
                    redline,
                    rule: matched.map(|m| (m.index, &playbook.rules[m.index])),
                }
            })
            .collect();

        let include_counter = mode == AnnotationMode::CounterRedline;
        let outcome = self.engine.judge_batch(&jobs, include_counter)?;
        debug_assert_eq!(
            outcome.verdicts.len() + outcome.failures.len(),
            redlines.len(),
            "exactly one outcome per submitted redline"
        );
        tracing::info!(
            verdicts = outcome.verdicts.len(),
            failures = outcome.failures.len(),
            "Judgment complete"
        );

        if analyze_only {
            return Ok(RunReport {
                run_id,
                playbook: playbook.name.clone(),
                redline_count: redlines.len(),
                redlines,
                verdicts: outcome.verdicts,
                judgment_failures: outcome.failures,
                annotation_skips: vec![],
                annotated: false,
            });
        }

        let annotation = backend.annotate(&AnnotationPlan {
            redlines: &redlines,
            verdicts: &outcome.verdicts,
            mode,
            config: &self.config.annotation,
        })?;

        Ok(RunReport {
            run_id,
            playbook: playbook.name.clone(),
            redline_count: redlines.len(),
            redlines,
            verdicts: outcome.verdicts,
            judgment_failures: outcome.failures,
            annotation_skips: annotation.skipped,
            annotated: true,
        })
    }
}
