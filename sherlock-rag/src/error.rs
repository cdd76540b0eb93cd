//! Error types for the `sherlock-rag` crate.

use sherlock_model::ModelError;
use thiserror::Error;

/// Errors that can occur while ingesting documents or answering questions.
///
/// Every failure is scoped to a single request; none of them leave a
/// session unusable.
#[derive(Debug, Error)]
pub enum RagError {
    /// The uploaded file's extension is not one of `txt`, `md`, `pdf`, `docx`.
    #[error("Unsupported format: '{extension}' (expected txt, md, pdf or docx)")]
    UnsupportedFormat {
        /// The rejected extension, lower-cased, or empty if there was none.
        extension: String,
    },

    /// The file could not be parsed in its declared format.
    #[error("Corrupt document '{name}': {message}")]
    CorruptDocument {
        /// The uploaded file name.
        name: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration value or an internal consistency check was violated.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The embedding provider failed.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The web search backend failed after its final retry.
    #[error("Web search unavailable: {0}")]
    SearchUnavailable(String),

    /// The completion endpoint failed, timed out, or returned garbage.
    #[error("Completion unavailable: {0}")]
    CompletionUnavailable(#[from] ModelError),

    /// The completion arrived but is not in the shape the task asked for.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),
}

impl RagError {
    /// A short name for the stage that failed, used in user-facing messages
    /// such as `"embedding failed: ..."`.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "upload",
            Self::CorruptDocument { .. } => "extraction",
            Self::InvalidConfiguration(_) => "configuration",
            Self::EmbeddingUnavailable { .. } => "embedding",
            Self::SearchUnavailable(_) => "web search",
            Self::CompletionUnavailable(_) | Self::MalformedReply(_) => "completion",
        }
    }

    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn corrupt(name: &str, message: impl Into<String>) -> Self {
        Self::CorruptDocument { name: name.to_string(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
