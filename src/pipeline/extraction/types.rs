use serde::Serialize;

use crate::config::AnnotationConfig;
use crate::models::{Redline, Verdict};
use crate::pipeline::annotate::{AnnotationError, AnnotationSkip};

use super::ExtractionError;

/// How verdicts are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationMode {
    /// Review comments anchored at each redline.
    Comment,
    /// New tracked changes proposing alternative wording. Verdicts without
    /// counter wording fall back to a comment so every verdict lands.
    CounterRedline,
}

/// Everything the annotator needs for one write-back pass.
///
/// Anchors live on the redlines; verdicts reference them by `redline_id`.
/// The annotator writes exactly one annotation per verdict and never
/// fabricates one for a redline without a verdict.
pub struct AnnotationPlan<'a> {
    pub redlines: &'a [Redline],
    pub verdicts: &'a [Verdict],
    pub mode: AnnotationMode,
    pub config: &'a AnnotationConfig,
}

/// What the write-back actually did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnnotationOutcome {
    /// Annotations applied to the document.
    pub applied: usize,
    /// Verdicts whose anchor had become invalid, recorded and reported.
    pub skipped: Vec<AnnotationSkip>,
}

/// Capability interface over the two document back-ends.
///
/// The format is picked once at the entry point; the pipeline never
/// branches on it again.
pub trait DocumentBackend {
    /// Ordered redlines, dense ids, document order. A document with zero
    /// tracked changes yields an empty vector, not an error.
    fn extract(&self) -> Result<Vec<Redline>, ExtractionError>;

    /// Visible document text (deletions excluded), for prompt context.
    fn document_text(&self) -> Result<String, ExtractionError>;

    /// Write verdicts back. Atomic from the caller's perspective: either a
    /// fully annotated document is produced or the original is untouched.
    fn annotate(&self, plan: &AnnotationPlan<'_>) -> Result<AnnotationOutcome, AnnotationError>;
}
