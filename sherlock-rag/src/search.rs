//! Web search as an extra context provider.
//!
//! Search results are never indexed. They are rendered as text and appended
//! to the user's question under a `Web search results:` heading.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One web search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title.
    pub title: String,
    /// Page URL.
    pub link: String,
    /// Short excerpt; may be empty.
    #[serde(default)]
    pub snippet: String,
}

/// A web search backend.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Return at most `limit` hits for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// Render hits as `Title/Link/Snippet` blocks separated by blank lines.
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| format!("Title: {}\nLink: {}\nSnippet: {}", hit.title, hit.link, hit.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Append rendered hits to `question`. Without hits the question is returned
/// unchanged.
pub fn with_web_context(question: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return question.to_string();
    }
    format!("{question}\n\nWeb search results:\n{}", format_hits(hits))
}

#[cfg(feature = "web-search")]
pub use google::GoogleSearchClient;

#[cfg(feature = "web-search")]
mod google {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Deserialize;
    use sherlock_model::RetryPolicy;
    use tracing::{debug, error};

    use super::{SearchHit, WebSearch};
    use crate::error::{RagError, Result};

    const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

    /// Google Programmable Search (Custom Search JSON API).
    ///
    /// Failed requests are retried according to the [`RetryPolicy`]
    /// (three attempts with 1s and 2s pauses by default).
    #[derive(Debug, Clone)]
    pub struct GoogleSearchClient {
        client: reqwest::Client,
        api_key: String,
        engine_id: String,
        endpoint: String,
        retry: RetryPolicy,
        timeout: Duration,
    }

    impl GoogleSearchClient {
        /// Create a client for the search engine `engine_id` (`cx`).
        ///
        /// # Errors
        ///
        /// Returns [`RagError::InvalidConfiguration`] if either value is blank.
        pub fn new(api_key: impl Into<String>, engine_id: impl Into<String>) -> Result<Self> {
            let api_key = api_key.into();
            let engine_id = engine_id.into();
            if api_key.trim().is_empty() || engine_id.trim().is_empty() {
                return Err(RagError::InvalidConfiguration(
                    "web search needs an API key and a search engine id".to_string(),
                ));
            }
            Ok(Self {
                client: reqwest::Client::new(),
                api_key,
                engine_id,
                endpoint: ENDPOINT.to_string(),
                retry: RetryPolicy::default(),
                timeout: Duration::from_secs(15),
            })
        }

        /// Override the retry policy.
        pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
            self.retry = retry;
            self
        }

        /// Override the endpoint, e.g. for a local stand-in.
        pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
            self.endpoint = endpoint.into();
            self
        }

        async fn search_once(&self, query: &str, limit: usize) -> std::result::Result<Vec<SearchHit>, String> {
            // The API caps `num` at 10.
            let num = limit.clamp(1, 10).to_string();
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("cx", self.engine_id.as_str()),
                    ("q", query),
                    ("num", num.as_str()),
                ])
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| format!("request failed: {e}"))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(format!("API returned {status}: {body}"));
            }

            let parsed: SearchResponse =
                response.json().await.map_err(|e| format!("failed to parse response: {e}"))?;
            Ok(parsed.items.into_iter().take(limit).collect())
        }
    }

    #[derive(Deserialize)]
    struct SearchResponse {
        #[serde(default)]
        items: Vec<SearchHit>,
    }

    #[async_trait]
    impl WebSearch for GoogleSearchClient {
        #[tracing::instrument(skip(self), err)]
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
            if limit == 0 {
                return Ok(Vec::new());
            }
            let hits = self
                .retry
                .run("web_search", |_| self.search_once(query, limit))
                .await
                .map_err(|message| {
                    error!(%message, "web search failed");
                    RagError::SearchUnavailable(message)
                })?;
            debug!(hits = hits.len(), "web search done");
            Ok(hits)
        }
    }
}
