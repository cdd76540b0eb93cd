//! OpenAI-compatible chat completions over HTTP.

mod client;
mod config;

pub use client::OpenAICompatibleClient;
pub use config::{DEFAULT_BASE_URL, DEFAULT_MODEL, OPENAI_BASE_URL, OpenAIConfig};
