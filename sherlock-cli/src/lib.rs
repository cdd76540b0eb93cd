//! # sherlock-cli
//!
//! The `sherlock` command line: one-shot `ask`, `notes`, `exam`, `analyze`,
//! `mnemonic` and `mind-palace` commands plus an interactive `chat` REPL, all
//! over the same [`StudySession`](sherlock_rag::StudySession).
//!
//! Settings come from flags, the environment, or a `.env` file in the
//! working directory.

pub mod cli;
pub mod commands;
pub mod repl;
pub mod settings;

pub use cli::Cli;
pub use commands::{describe_error, format_sources, run};
