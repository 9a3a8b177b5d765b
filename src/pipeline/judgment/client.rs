//! HTTP model client for the supported providers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::types::{ModelClient, ModelClientError, Provider};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_COMPLETION_TOKENS: u32 = 4000;

/// Blocking HTTP client for OpenAI-style and Anthropic-style completion
/// endpoints. Provider-specific shape lives entirely in here; callers see
/// only `complete`.
pub struct HttpModelClient {
    provider: Provider,
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl HttpModelClient {
    pub fn new(
        provider: Provider,
        api_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, ModelClientError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ModelClientError::Http(e.to_string()))?;
        let base_url = match provider {
            Provider::OpenAi => OPENAI_BASE_URL,
            Provider::Anthropic => ANTHROPIC_BASE_URL,
        };
        Ok(Self {
            provider,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    /// Point at a non-default endpoint (proxies, test servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn map_send_error(e: reqwest::Error) -> ModelClientError {
        if e.is_timeout() {
            ModelClientError::Timeout
        } else {
            ModelClientError::Http(e.to_string())
        }
    }

    fn map_status(status: u16, body: String) -> ModelClientError {
        match status {
            401 | 403 => ModelClientError::Auth(body),
            429 => ModelClientError::RateLimited,
            400 | 404 | 422 => ModelClientError::InvalidRequest(body),
            s if s >= 500 => ModelClientError::Server { status: s, body },
            _ => ModelClientError::Http(format!("unexpected status {status}: {body}")),
        }
    }

    fn complete_openai(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, ModelClientError> {
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }
        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.3,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Self::map_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| ModelClientError::EmptyReply(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelClientError::EmptyReply("no choices in reply".into()))
    }

    fn complete_anthropic(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, ModelClientError> {
        #[derive(Serialize)]
        struct MessagesRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            system: &'a str,
            messages: Vec<serde_json::Value>,
        }
        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct MessagesResponse {
            content: Vec<ContentBlock>,
        }

        let body = MessagesRequest {
            model,
            max_tokens: MAX_COMPLETION_TOKENS,
            system,
            messages: vec![json!({"role": "user", "content": prompt})],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Self::map_status(status.as_u16(), body));
        }

        let parsed: MessagesResponse = response
            .json()
            .map_err(|e| ModelClientError::EmptyReply(e.to_string()))?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ModelClientError::EmptyReply("no text block in reply".into()))
    }
}

impl ModelClient for HttpModelClient {
    fn complete(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, ModelClientError> {
        match self.provider {
            Provider::OpenAi => self.complete_openai(model, system, prompt),
            Provider::Anthropic => self.complete_anthropic(model, system, prompt),
        }
    }
}

/// Mock model client for testing. Returns scripted responses in order,
/// repeating the last one once the script runs out.
pub struct MockModelClient {
    responses: Vec<Result<String, ModelClientError>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockModelClient {
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    pub fn scripted(responses: Vec<Result<String, ModelClientError>>) -> Self {
        assert!(!responses.is_empty(), "mock needs at least one response");
        Self {
            responses,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl ModelClient for MockModelClient {
    fn complete(
        &self,
        _model: &str,
        _system: &str,
        _prompt: &str,
    ) -> Result<String, ModelClientError> {
        let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let idx = n.min(self.responses.len() - 1);
        self.responses[idx].clone()
    }
}
