//! HTTP client for OpenAI-compatible `/chat/completions` endpoints.

use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::config::OpenAIConfig;
use crate::client::{CompletionClient, CompletionStream};
use crate::error::{ModelError, Result};
use crate::message::ChatMessage;

/// A [`CompletionClient`] speaking the OpenAI chat completions protocol.
///
/// Works against OpenAI itself and any compatible endpoint (the Falcon
/// endpoint at `api.ai71.ai` is the default). Streaming uses server-sent
/// events and ends at the `[DONE]` sentinel.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleClient {
    http: reqwest::Client,
    config: OpenAIConfig,
}

impl OpenAICompatibleClient {
    /// Create a client from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if the settings are invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Create a client for an OpenAI-compatible endpoint.
    pub fn compatible(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Self::new(OpenAIConfig::compatible(api_key, base_url, model))
    }

    /// The settings this client was built with.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn request_body<'a>(&'a self, messages: &'a [ChatMessage], stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages,
            stream,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout { seconds: self.config.timeout.as_secs_f64() }
        } else {
            ModelError::Request(e.to_string())
        }
    }
}

/// Turn a non-success response into [`ModelError::BadResponse`], preferring
/// the decoded `error.message` over the raw body.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    error!(status = status.as_u16(), "completion endpoint returned an error");
    Err(ModelError::BadResponse { status: status.as_u16(), body: detail })
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    #[tracing::instrument(skip_all, fields(model = %self.config.model, messages.count = messages.len()), err)]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .http
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&self.request_body(messages, false))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = check_response(response).await?;
        debug!("response ok");

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                ModelError::Decode(e.to_string())
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| ModelError::Decode("response contained no choices".to_string()))
    }

    #[tracing::instrument(skip_all, fields(model = %self.config.model, messages.count = messages.len()), err)]
    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<CompletionStream> {
        let send = self
            .http
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(messages, true))
            .send();

        let response = tokio::time::timeout(self.config.timeout, send)
            .await
            .map_err(|_| ModelError::Timeout { seconds: self.config.timeout.as_secs_f64() })?
            .map_err(|e| self.transport_error(e))?;
        let response = check_response(response).await?;
        debug!("stream opened");

        let idle = self.config.stream_idle_timeout;
        let mut events = Box::pin(response.bytes_stream().eventsource());

        let stream = try_stream! {
            loop {
                let next = tokio::time::timeout(idle, events.next())
                    .await
                    .map_err(|_| ModelError::Timeout { seconds: idle.as_secs_f64() })?;
                let Some(event) = next else { break };
                let event = event.map_err(|e| ModelError::Stream(e.to_string()))?;

                let data = event.data.trim();
                if data == "[DONE]" {
                    break;
                }
                if data.is_empty() {
                    continue;
                }

                let chunk: StreamChunk = serde_json::from_str(data)
                    .map_err(|e| ModelError::Decode(format!("bad stream event: {e}")))?;
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                        yield content;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}
