pub mod docx;
pub mod hosted;

use serde::Serialize;
use thiserror::Error;

use crate::remote::HostedApiError;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Anchor for redline {redline_id} is no longer valid: {detail}")]
    InvalidAnchor { redline_id: u32, detail: String },

    #[error("Cannot read document container: {0}")]
    Container(String),

    #[error("Document part missing: {0}")]
    MissingPart(String),

    #[error("Malformed document markup: {0}")]
    Xml(String),

    #[error("Hosted document API error: {0}")]
    Api(#[from] HostedApiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One verdict that could not be written back because its anchor no longer
/// resolves. Recorded and reported, never silently dropped.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationSkip {
    pub redline_id: u32,
    pub reason: String,
}
