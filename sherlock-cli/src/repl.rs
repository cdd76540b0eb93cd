//! Interactive chat loop.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use sherlock_rag::{ChatMode, GroundedAnswer, RagError, StudySession};

use crate::commands::{describe_error, format_sources, print_answer, print_sources, print_stream};

const PROMPT: &str = "sherlock> ";

const HELP: &str = "\
Commands:
  /mode general|document   switch between plain chat and document answers
  /sources                 show the chunks behind the last answer
  /retry                   re-ask the last question that failed to complete
  /clear                   forget the chat history
  /export PATH             write the chat history as CSV
  /help                    show this help
  /quit                    leave
Anything else is a question.";

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    Mode(ChatMode),
    Sources,
    Retry,
    Clear,
    Export(PathBuf),
    Help,
    Quit,
    Empty,
    /// A slash command that could not be understood, with the reason.
    Invalid(String),
}

pub fn parse_line(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Ask(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name.to_ascii_lowercase().as_str(), arg) {
        ("quit" | "exit" | "q", _) => ReplCommand::Quit,
        ("help" | "?", _) => ReplCommand::Help,
        ("clear", _) => ReplCommand::Clear,
        ("sources", _) => ReplCommand::Sources,
        ("retry", _) => ReplCommand::Retry,
        ("mode", "") => ReplCommand::Invalid("usage: /mode general|document".into()),
        ("mode", mode) => match mode.parse() {
            Ok(mode) => ReplCommand::Mode(mode),
            Err(e) => ReplCommand::Invalid(format!("{e}")),
        },
        ("export", "") => ReplCommand::Invalid("usage: /export PATH".into()),
        ("export", path) => ReplCommand::Export(PathBuf::from(path)),
        (other, _) => ReplCommand::Invalid(format!("unknown command '/{other}' (try /help)")),
    }
}

/// Read questions until `/quit`, Ctrl-C or Ctrl-D. Failed questions are
/// reported and the loop goes on.
pub async fn run(session: &mut StudySession, stream: bool) -> Result<()> {
    let mut editor = DefaultEditor::new().context("failed to start line editor")?;
    // Question whose completion failed, kept for /retry.
    let mut pending: Option<String> = None;

    println!("Chatting in {} mode. Type /help for commands.", session.mode());
    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let _ = editor.add_history_entry(line.as_str());

        match parse_line(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Invalid(reason) => println!("{reason}"),
            ReplCommand::Clear => {
                session.clear_history();
                println!("History cleared.");
            }
            ReplCommand::Mode(mode) => {
                session.set_mode(mode);
                if mode == ChatMode::Document && session.index().is_empty() {
                    println!("Switched to document mode, but nothing is indexed; answers stay general.");
                } else {
                    println!("Switched to {mode} mode.");
                }
            }
            ReplCommand::Sources => {
                if session.last_sources().is_empty() {
                    println!("No sources yet.");
                } else {
                    println!("{}", format_sources(session.last_sources()));
                }
            }
            ReplCommand::Export(path) => match export(session, &path) {
                Ok(()) => println!("Wrote {} turn(s) to {}.", session.history().len(), path.display()),
                Err(e) => println!("{}", describe_error(&e)),
            },
            ReplCommand::Retry => match pending.take() {
                None => println!("Nothing to retry."),
                Some(question) => {
                    let sources = session.last_sources().to_vec();
                    let result = if sources.is_empty() {
                        session.ask(&question).await
                    } else {
                        session.retry_completion(&question, &sources).await
                    };
                    pending = settle(result, question);
                }
            },
            ReplCommand::Ask(question) => {
                if stream {
                    pending = ask_streaming(session, question).await;
                } else {
                    let result = session.ask(&question).await;
                    pending = settle(result, question);
                }
            }
        }
    }
    Ok(())
}

/// Print the outcome; hand the question back if only the completion failed.
fn settle(result: sherlock_rag::Result<GroundedAnswer>, question: String) -> Option<String> {
    match result {
        Ok(answer) => {
            print_answer(&answer);
            None
        }
        Err(e) => failed(e, question),
    }
}

async fn ask_streaming(session: &mut StudySession, question: String) -> Option<String> {
    let grounded = match session.ask_stream(&question).await {
        Ok(grounded) => grounded,
        Err(e) => return failed(e, question),
    };
    match print_stream(grounded.stream).await {
        Ok(answer) => {
            session.record_exchange(&question, &answer);
            print_sources(&grounded.sources);
            None
        }
        Err(e) => {
            println!("{}", describe_error(&e));
            let retryable = matches!(e.downcast_ref::<RagError>(), Some(RagError::CompletionUnavailable(_)));
            retryable.then_some(question)
        }
    }
}

fn failed(err: RagError, question: String) -> Option<String> {
    let retryable = matches!(err, RagError::CompletionUnavailable(_));
    println!("{}", describe_error(&anyhow::Error::from(err)));
    if retryable {
        println!("Type /retry to ask again.");
        Some(question)
    } else {
        None
    }
}

fn export(session: &StudySession, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    session.export_history_csv(file).with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_questions() {
        assert_eq!(parse_line("  Who wrote it?  "), ReplCommand::Ask("Who wrote it?".into()));
        assert_eq!(parse_line("   "), ReplCommand::Empty);
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_line("/quit"), ReplCommand::Quit);
        assert_eq!(parse_line("/EXIT"), ReplCommand::Quit);
        assert_eq!(parse_line("/clear"), ReplCommand::Clear);
        assert_eq!(parse_line("/sources"), ReplCommand::Sources);
        assert_eq!(parse_line("/retry"), ReplCommand::Retry);
        assert_eq!(parse_line("/help"), ReplCommand::Help);
    }

    #[test]
    fn mode_takes_a_chat_mode() {
        assert_eq!(parse_line("/mode document"), ReplCommand::Mode(ChatMode::Document));
        assert_eq!(parse_line("/mode  General "), ReplCommand::Mode(ChatMode::General));
        assert!(matches!(parse_line("/mode"), ReplCommand::Invalid(_)));
        assert!(matches!(parse_line("/mode loud"), ReplCommand::Invalid(_)));
    }

    #[test]
    fn export_keeps_spaces_in_path() {
        assert_eq!(parse_line("/export my chats/today.csv"), ReplCommand::Export(PathBuf::from("my chats/today.csv")));
        assert!(matches!(parse_line("/export"), ReplCommand::Invalid(_)));
    }

    #[test]
    fn unknown_commands_are_invalid() {
        match parse_line("/summon watson") {
            ReplCommand::Invalid(reason) => assert!(reason.contains("/summon")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn only_completion_failures_are_retryable() {
        let timeout = RagError::from(sherlock_model::ModelError::Timeout { seconds: 1.0 });
        assert_eq!(failed(timeout, "q".into()), Some("q".to_string()));

        let embedding = RagError::EmbeddingUnavailable { provider: "openai".into(), message: "401".into() };
        assert_eq!(failed(embedding, "q".into()), None);
    }
}
