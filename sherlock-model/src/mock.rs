//! Mock completion client for testing.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{CompletionClient, CompletionStream};
use crate::error::{ModelError, Result};
use crate::message::ChatMessage;

#[derive(Debug, Clone)]
enum Script {
    Reply(String),
    Fail(String),
}

/// A [`CompletionClient`] that replays a scripted reply or failure.
///
/// Every message list it receives is recorded so tests can inspect the
/// assembled prompts. Streamed replies are split at word boundaries.
///
/// # Example
///
/// ```rust
/// use sherlock_model::{ChatMessage, CompletionClient, MockCompletionClient};
///
/// # tokio_test_block(async {
/// let client = MockCompletionClient::new("It is a capital mistake to theorize.");
/// let reply = client.complete(&[ChatMessage::user("advice?")]).await.unwrap();
/// assert_eq!(reply, "It is a capital mistake to theorize.");
/// assert_eq!(client.requests().len(), 1);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct MockCompletionClient {
    model: String,
    script: Mutex<Script>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockCompletionClient {
    /// Create a mock that always replies with `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            model: "mock-model".to_string(),
            script: Mutex::new(Script::Reply(reply.into())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always fails with [`ModelError::Unavailable`].
    pub fn failing(message: impl Into<String>) -> Self {
        let mock = Self::new(String::new());
        mock.fail_with(message);
        mock
    }

    /// Switch to replying with `reply` from now on.
    pub fn reply_with(&self, reply: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            *script = Script::Reply(reply.into());
        }
    }

    /// Switch to failing with `message` from now on.
    pub fn fail_with(&self, message: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            *script = Script::Fail(message.into());
        }
    }

    /// All message lists received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// The most recent message list, if any.
    pub fn last_request(&self) -> Option<Vec<ChatMessage>> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }

    fn record(&self, messages: &[ChatMessage]) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let script = self
            .script
            .lock()
            .map(|s| s.clone())
            .map_err(|_| ModelError::Unavailable("mock script lock poisoned".into()))?;
        match script {
            Script::Reply(reply) => Ok(reply),
            Script::Fail(message) => Err(ModelError::Unavailable(message)),
        }
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.record(messages)
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<CompletionStream> {
        let reply = self.record(messages)?;
        let fragments: Vec<Result<String>> =
            reply.split_inclusive(' ').map(|s| Ok(s.to_string())).collect();
        Ok(Box::pin(futures::stream::iter(fragments)))
    }
}
