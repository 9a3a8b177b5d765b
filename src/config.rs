//! Process-wide configuration.
//!
//! Built once at startup (environment + CLI flags) and passed explicitly
//! into component constructors. Nothing in the pipeline reads the
//! environment after this point.

use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::judgment::Provider;

/// Application-level constants
pub const APP_NAME: &str = "Redliner";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory (~/.redliner)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(".redliner")
}

/// Get the default playbooks directory
pub fn playbooks_dir() -> PathBuf {
    app_data_dir().join("playbooks")
}

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "info,redliner=debug"
}

/// Knobs for the judgment stage.
#[derive(Debug, Clone)]
pub struct JudgmentConfig {
    /// Concurrent judgment calls per document.
    pub fan_out: usize,
    /// Transport attempts per model call (first try included).
    pub max_attempts: u32,
    /// Base delay for exponential backoff between transport attempts.
    pub base_backoff: Duration,
    /// Whole-document deadline for the judgment batch.
    pub document_timeout: Duration,
    /// Per-call HTTP timeout.
    pub request_timeout: Duration,
    /// Upper bound on prompt characters contributed by document context.
    pub max_context_chars: usize,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            fan_out: 4,
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            document_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(60),
            max_context_chars: 2000,
        }
    }
}

/// What the matcher does when no rule clears the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedPolicy {
    /// Judge the redline with no playbook context.
    NoRule,
    /// Fall back to the playbook's designated catch-all rule, if one exists.
    DefaultRule,
}

/// Knobs for rule matching.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Minimum relevance score for a rule to match.
    pub min_score: f32,
    pub unmatched_policy: UnmatchedPolicy,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_score: 0.2,
            unmatched_policy: UnmatchedPolicy::NoRule,
        }
    }
}

/// Knobs for write-back.
#[derive(Debug, Clone)]
pub struct AnnotationConfig {
    /// Author identity for counter-redlines and comments.
    pub reviewer_author: String,
    /// When set, any invalid anchor aborts the whole batch instead of
    /// being recorded as a skip.
    pub strict: bool,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            reviewer_author: "Redliner".into(),
            strict: false,
        }
    }
}

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub provider: Provider,
    pub model: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub judgment: JudgmentConfig,
    pub matcher: MatcherConfig,
    pub annotation: AnnotationConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            model: "gpt-4".into(),
            openai_api_key: None,
            anthropic_api_key: None,
            judgment: JudgmentConfig::default(),
            matcher: MatcherConfig::default(),
            annotation: AnnotationConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Read provider/model defaults and credentials from the environment.
    /// Call once at startup; the result is immutable afterwards.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(provider) = std::env::var("DEFAULT_AI_PROVIDER") {
            if let Ok(p) = provider.parse::<Provider>() {
                config.provider = p;
            } else {
                tracing::warn!(%provider, "Unknown DEFAULT_AI_PROVIDER, keeping default");
            }
        }
        if let Ok(model) = std::env::var("DEFAULT_MODEL") {
            config.model = model;
        }
        config.openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        config.anthropic_api_key = std::env::var("ANTHROPIC_API_KEY").ok();

        config
    }

    /// Credential for the configured provider.
    pub fn api_key(&self) -> Option<&str> {
        match self.provider {
            Provider::OpenAi => self.openai_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }
}
