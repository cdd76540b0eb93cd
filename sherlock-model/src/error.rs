//! Error types for the `sherlock-model` crate.

use thiserror::Error;

/// Errors that can occur while talking to a completion endpoint.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The client was configured with invalid parameters.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The HTTP request could not be sent or the connection failed.
    #[error("Request failed: {0}")]
    Request(String),

    /// The endpoint did not answer in time.
    #[error("Request timed out after {seconds:.1}s")]
    Timeout {
        /// The timeout that elapsed, in seconds.
        seconds: f64,
    },

    /// The endpoint answered with a non-success status.
    #[error("API returned {status}: {body}")]
    BadResponse {
        /// The HTTP status code.
        status: u16,
        /// The response body, or the decoded error message when available.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The incremental stream broke off mid-way.
    #[error("Stream error: {0}")]
    Stream(String),

    /// A scripted failure from [`MockCompletionClient`](crate::MockCompletionClient).
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl ModelError {
    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type alias for [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;
