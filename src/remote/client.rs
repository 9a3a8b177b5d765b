//! HTTP client for the hosted document API.
//!
//! Token refresh is transparent: a 401 triggers one refresh + replay, and
//! only a second rejection surfaces as an auth error. Rate limiting and
//! server errors are reported as transient; the extraction layer decides
//! how often to retry a page.

use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::types::{HostedDocsApi, SuggestionPage};
use super::HostedApiError;

/// Supplies and refreshes the bearer token.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Result<String, HostedApiError>;

    /// Obtain a fresh token after a rejection. Implementations that cannot
    /// refresh return an auth error.
    fn refresh(&self) -> Result<String, HostedApiError>;
}

/// Fixed token, no refresh (service accounts, tests).
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Result<String, HostedApiError> {
        Ok(self.0.clone())
    }

    fn refresh(&self) -> Result<String, HostedApiError> {
        Err(HostedApiError::Auth(
            "static token rejected and cannot be refreshed".into(),
        ))
    }
}

/// OAuth refresh-token flow against the host's token endpoint.
pub struct OAuthTokenProvider {
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    client: reqwest::blocking::Client,
    cached: Mutex<Option<String>>,
}

impl OAuthTokenProvider {
    pub fn new(
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<Self, HostedApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HostedApiError::Http(e.to_string()))?;
        Ok(Self {
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            client,
            cached: Mutex::new(None),
        })
    }
}

impl TokenProvider for OAuthTokenProvider {
    fn bearer_token(&self) -> Result<String, HostedApiError> {
        if let Some(token) = self.cached.lock().expect("token cache poisoned").clone() {
            return Ok(token);
        }
        self.refresh()
    }

    fn refresh(&self) -> Result<String, HostedApiError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .map_err(|e| HostedApiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(HostedApiError::Auth(format!(
                "token refresh rejected (status {status}): {body}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .map_err(|e| HostedApiError::Decode(e.to_string()))?;
        *self.cached.lock().expect("token cache poisoned") = Some(parsed.access_token.clone());
        Ok(parsed.access_token)
    }
}

/// Blocking client against the hosted document service.
pub struct HttpHostedClient {
    base_url: String,
    token: Box<dyn TokenProvider>,
    client: reqwest::blocking::Client,
}

impl HttpHostedClient {
    pub fn new(base_url: &str, token: Box<dyn TokenProvider>) -> Result<Self, HostedApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| HostedApiError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn map_status(status: u16, body: String) -> HostedApiError {
        match status {
            401 | 403 => HostedApiError::Auth(body),
            404 => HostedApiError::NotFound(body),
            429 => HostedApiError::RateLimited,
            s if s >= 500 => HostedApiError::Server { status: s, body },
            s => HostedApiError::Http(format!("unexpected status {s}: {body}")),
        }
    }

    /// Send a request with the current token; refresh and replay once on a
    /// 401. A second rejection is a terminal auth error.
    fn send_authorized(
        &self,
        build: impl Fn(&str) -> reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response, HostedApiError> {
        let token = self.token.bearer_token()?;
        let response = build(&token)
            .send()
            .map_err(|e| HostedApiError::Http(e.to_string()))?;

        if response.status().as_u16() == 401 {
            tracing::debug!("Hosted API rejected token, refreshing once");
            let fresh = self.token.refresh()?;
            let retried = build(&fresh)
                .send()
                .map_err(|e| HostedApiError::Http(e.to_string()))?;
            return Ok(retried);
        }
        Ok(response)
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, url: String) -> Result<T, HostedApiError> {
        let response =
            self.send_authorized(|token| self.client.get(&url).bearer_auth(token))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Self::map_status(status.as_u16(), body));
        }
        response
            .json()
            .map_err(|e| HostedApiError::Decode(e.to_string()))
    }

    fn post_json(&self, url: String, body: serde_json::Value) -> Result<(), HostedApiError> {
        let response = self
            .send_authorized(|token| self.client.post(&url).bearer_auth(token).json(&body))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Self::map_status(status.as_u16(), body));
        }
        Ok(())
    }
}

impl HostedDocsApi for HttpHostedClient {
    fn list_suggestions(
        &self,
        doc_id: &str,
        page_token: Option<&str>,
    ) -> Result<SuggestionPage, HostedApiError> {
        let mut url = format!("{}/v1/documents/{doc_id}/suggestions", self.base_url);
        if let Some(token) = page_token {
            url.push_str(&format!("?pageToken={token}"));
        }
        self.get_json(url)
    }

    fn document_text(&self, doc_id: &str) -> Result<String, HostedApiError> {
        #[derive(Deserialize)]
        struct TextResponse {
            text: String,
        }
        let url = format!("{}/v1/documents/{doc_id}/text", self.base_url);
        let parsed: TextResponse = self.get_json(url)?;
        Ok(parsed.text)
    }

    fn insert_comment(
        &self,
        doc_id: &str,
        suggestion_id: &str,
        body: &str,
    ) -> Result<(), HostedApiError> {
        let url = format!("{}/v1/documents/{doc_id}/comments", self.base_url);
        self.post_json(
            url,
            json!({"anchorSuggestionId": suggestion_id, "content": body}),
        )
    }

    fn insert_suggestion(
        &self,
        doc_id: &str,
        anchor_suggestion_id: &str,
        text: &str,
        author: &str,
    ) -> Result<(), HostedApiError> {
        let url = format!("{}/v1/documents/{doc_id}/suggestions", self.base_url);
        self.post_json(
            url,
            json!({
                "anchorSuggestionId": anchor_suggestion_id,
                "text": text,
                "author": author,
            }),
        )
    }
}
