//! In-memory API double for tests: scripted pages, recorded writes,
//! optional transient failures before a page succeeds.

use std::sync::Mutex;

use super::types::{HostedDocsApi, SuggestionPage};
use super::HostedApiError;

pub(crate) struct MockHostedApi {
    pages: Vec<SuggestionPage>,
    text: String,
    pub fail_first_fetches: Mutex<u32>,
    pub comments: Mutex<Vec<(String, String)>>,
    pub counter_suggestions: Mutex<Vec<(String, String, String)>>,
    pub fail_writes_after: Mutex<Option<usize>>,
}

impl MockHostedApi {
    pub fn new(pages: Vec<SuggestionPage>, text: &str) -> Self {
        Self {
            pages,
            text: text.to_string(),
            fail_first_fetches: Mutex::new(0),
            comments: Mutex::new(Vec::new()),
            counter_suggestions: Mutex::new(Vec::new()),
            fail_writes_after: Mutex::new(None),
        }
    }

    pub fn failing_first(mut self, failures: u32) -> Self {
        self.fail_first_fetches = Mutex::new(failures);
        self
    }
}

impl HostedDocsApi for MockHostedApi {
    fn list_suggestions(
        &self,
        _doc_id: &str,
        page_token: Option<&str>,
    ) -> Result<SuggestionPage, HostedApiError> {
        let mut remaining = self.fail_first_fetches.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(HostedApiError::RateLimited);
        }
        let index = match page_token {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| HostedApiError::Decode(format!("bad page token {token}")))?,
        };
        let mut page = self
            .pages
            .get(index)
            .cloned()
            .ok_or_else(|| HostedApiError::NotFound(format!("page {index}")))?;
        page.next_page_token = if index + 1 < self.pages.len() {
            Some((index + 1).to_string())
        } else {
            None
        };
        Ok(page)
    }

    fn document_text(&self, _doc_id: &str) -> Result<String, HostedApiError> {
        Ok(self.text.clone())
    }

    fn insert_comment(
        &self,
        _doc_id: &str,
        suggestion_id: &str,
        body: &str,
    ) -> Result<(), HostedApiError> {
        let mut writes = self.comments.lock().unwrap();
        if let Some(limit) = *self.fail_writes_after.lock().unwrap() {
            if writes.len() >= limit {
                return Err(HostedApiError::Server {
                    status: 500,
                    body: "write failed".into(),
                });
            }
        }
        writes.push((suggestion_id.to_string(), body.to_string()));
        Ok(())
    }

    fn insert_suggestion(
        &self,
        _doc_id: &str,
        anchor_suggestion_id: &str,
        text: &str,
        author: &str,
    ) -> Result<(), HostedApiError> {
        self.counter_suggestions.lock().unwrap().push((
            anchor_suggestion_id.to_string(),
            text.to_string(),
            author.to_string(),
        ));
        Ok(())
    }
}
