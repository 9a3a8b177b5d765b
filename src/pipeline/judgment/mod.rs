pub mod client;
pub mod engine;
pub mod parser;
pub mod prompt;
pub mod types;

pub use client::*;
pub use engine::*;
pub use parser::*;
pub use prompt::*;
pub use types::*;

use thiserror::Error;

/// Judgment failures. All variants except `DocumentTimeout` are scoped to a
/// single redline and never abort the rest of the batch.
#[derive(Error, Debug)]
pub enum JudgmentError {
    #[error("Model call failed: {0}")]
    Model(#[from] types::ModelClientError),

    #[error("Model response violated the output contract: {0}")]
    MalformedResponse(String),

    #[error("No API key configured for provider {0}")]
    MissingApiKey(&'static str),

    #[error("Document judgment deadline exceeded ({completed}/{total} redlines judged)")]
    DocumentTimeout { completed: usize, total: usize },
}
