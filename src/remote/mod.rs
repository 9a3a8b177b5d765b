pub mod client;
#[cfg(test)]
pub(crate) mod mock;
pub mod types;

pub use client::*;
pub use types::*;

use thiserror::Error;

/// Transport-level failures from the hosted document API.
#[derive(Error, Debug, Clone)]
pub enum HostedApiError {
    #[error("Hosted API authentication failed: {0}")]
    Auth(String),

    #[error("Hosted API rate limited")]
    RateLimited,

    #[error("Hosted API server error (status {status}): {body}")]
    Server { status: u16, body: String },

    #[error("Hosted document not found: {0}")]
    NotFound(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Could not decode hosted API response: {0}")]
    Decode(String),
}

impl HostedApiError {
    /// Rate limits and server hiccups are worth a bounded retry; auth and
    /// not-found are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Server { .. } | Self::Http(_)
        )
    }
}
