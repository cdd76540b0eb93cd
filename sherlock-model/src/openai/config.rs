//! Configuration for OpenAI-compatible chat completion endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// The default base URL (the Falcon chat endpoint the study app was built on).
pub const DEFAULT_BASE_URL: &str = "https://api.ai71.ai/v1";

/// The default chat model.
pub const DEFAULT_MODEL: &str = "tiiuae/falcon-180B-chat";

/// The public OpenAI endpoint.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Connection settings for an [`OpenAICompatibleClient`](super::OpenAICompatibleClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Bearer token sent with every request.
    pub api_key: String,
    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Whole-request timeout for non-streamed calls, and the limit on
    /// waiting for a streamed response to start.
    pub timeout: Duration,
    /// Longest silence tolerated between two streamed events.
    pub stream_idle_timeout: Duration,
    /// Sampling temperature, if overridden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens, if overridden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl OpenAIConfig {
    /// Settings for the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::compatible(api_key, DEFAULT_BASE_URL, DEFAULT_MODEL)
    }

    /// Settings for any OpenAI-compatible endpoint.
    pub fn compatible(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(60),
            stream_idle_timeout: Duration::from_secs(30),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set both the request timeout and the stream idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.stream_idle_timeout = timeout;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the generated-token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// The full chat completions URL.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Check that the settings can be used to build a client.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if the key, base URL or model is empty,
    /// a timeout is zero, or the temperature is outside `0.0..=2.0`.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ModelError::Config("API key must not be empty".to_string()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ModelError::Config(format!(
                "base URL '{}' must start with http:// or https://",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ModelError::Config("model must not be empty".to_string()));
        }
        if self.timeout.is_zero() || self.stream_idle_timeout.is_zero() {
            return Err(ModelError::Config("timeouts must be greater than zero".to_string()));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ModelError::Config(format!(
                    "temperature ({t}) must be between 0.0 and 2.0"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_tolerates_trailing_slash() {
        let config = OpenAIConfig::compatible("k", "https://api.ai71.ai/v1/", "m");
        assert_eq!(config.completions_url(), "https://api.ai71.ai/v1/chat/completions");
    }

    #[test]
    fn validate_rejects_bad_settings() {
        assert!(OpenAIConfig::new("").validate().is_err());
        assert!(OpenAIConfig::compatible("k", "ftp://x", "m").validate().is_err());
        assert!(OpenAIConfig::new("k").with_timeout(Duration::ZERO).validate().is_err());
        assert!(OpenAIConfig::new("k").with_temperature(3.5).validate().is_err());
        assert!(OpenAIConfig::new("k").with_temperature(0.7).validate().is_ok());
    }
}
