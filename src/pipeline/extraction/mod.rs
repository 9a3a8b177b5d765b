pub mod docx;
pub mod hosted;
pub mod merge;
pub mod types;

pub use docx::*;
pub use hosted::*;
pub use merge::*;
pub use types::*;

use thiserror::Error;

use crate::remote::HostedApiError;

#[derive(Error, Debug)]
pub enum ExtractionError {
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

impl ExtractionError {
    /// Auth failures from the hosted back-end surface to the caller as
    /// auth errors, never retried here.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api(HostedApiError::Auth(_)))
    }
}
