use thiserror::Error;

/// Language-model provider selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!("unsupported provider: {other}")),
        }
    }
}

/// Transport-level failures from the model provider, classified so the
/// retry wrapper knows what is worth another attempt.
#[derive(Error, Debug, Clone)]
pub enum ModelClientError {
    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,

    #[error("Provider server error (status {status}): {body}")]
    Server { status: u16, body: String },

    #[error("Provider rejected the request: {0}")]
    InvalidRequest(String),

    #[error("Provider authentication failed: {0}")]
    Auth(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Provider reply had no completion text: {0}")]
    EmptyReply(String),
}

impl ModelClientError {
    /// Transient errors are retried with backoff; validation and auth
    /// failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout | Self::Server { .. } | Self::Http(_)
        )
    }
}

/// Language-model client abstraction (allows mocking).
///
/// One operation: send a system + user prompt to the named model, get the
/// completion text back. Provider auth is resolved at construction.
pub trait ModelClient {
    fn complete(&self, model: &str, system: &str, prompt: &str)
        -> Result<String, ModelClientError>;
}
