//! The completion client contract.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::error::Result;
use crate::message::ChatMessage;

/// A lazy, finite, non-restartable sequence of response fragments.
///
/// Fragments arrive in order; concatenating them reconstructs the full
/// response (see [`collect_stream`]).
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A hosted chat model that turns an ordered message list into a reply.
///
/// Implementations never retry on their own. Retry policy, if any, belongs
/// to the caller (see [`RetryPolicy`](crate::RetryPolicy)).
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// The model identifier sent with every request.
    fn model(&self) -> &str;

    /// Request a complete reply in one piece.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Request a reply as incremental text fragments.
    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<CompletionStream>;
}

/// Drain a [`CompletionStream`], concatenating fragments in arrival order.
///
/// Stops at the first error and returns it; fragments received before the
/// error are discarded.
pub async fn collect_stream(mut stream: CompletionStream) -> Result<String> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;

    #[tokio::test]
    async fn collect_concatenates_in_order() {
        let stream: CompletionStream = Box::pin(futures::stream::iter(vec![
            Ok("Elementary".to_string()),
            Ok(", my dear".to_string()),
            Ok(" Watson.".to_string()),
        ]));
        assert_eq!(collect_stream(stream).await.unwrap(), "Elementary, my dear Watson.");
    }

    #[tokio::test]
    async fn collect_stops_at_first_error() {
        let stream: CompletionStream = Box::pin(futures::stream::iter(vec![
            Ok("partial".to_string()),
            Err(ModelError::Stream("connection reset".into())),
            Ok("never seen".to_string()),
        ]));
        let err = collect_stream(stream).await.unwrap_err();
        assert!(matches!(err, ModelError::Stream(_)));
    }
}
