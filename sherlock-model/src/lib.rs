//! # sherlock-model
//!
//! Chat completion clients for the Sherlock study companion.
//!
//! ## Overview
//!
//! The [`CompletionClient`] trait turns an ordered list of role-tagged
//! [`ChatMessage`]s into a reply, either in one piece or as a
//! [`CompletionStream`] of text fragments. Two implementations ship here:
//!
//! - [`openai::OpenAICompatibleClient`]: any OpenAI-compatible HTTP endpoint
//!   (feature `openai`, enabled by default)
//! - [`MockCompletionClient`]: scripted replies for tests
//!
//! Clients never retry on their own; wrap calls in a [`RetryPolicy`] when
//! bounded retry is wanted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sherlock_model::openai::{OpenAICompatibleClient, OpenAIConfig};
//! use sherlock_model::{ChatMessage, CompletionClient};
//!
//! # async fn example() -> sherlock_model::Result<()> {
//! let client = OpenAICompatibleClient::new(OpenAIConfig::new("api-key"))?;
//! let reply = client
//!     .complete(&[ChatMessage::system("Be concise."), ChatMessage::user("Hello")])
//!     .await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod message;
mod mock;
pub mod retry;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{CompletionClient, CompletionStream, collect_stream};
pub use error::{ModelError, Result};
pub use message::{ChatMessage, Role};
pub use mock::MockCompletionClient;
pub use retry::RetryPolicy;
