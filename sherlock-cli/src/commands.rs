//! One-shot commands and shared output helpers.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use futures::StreamExt;
use sherlock_model::ModelError;
use sherlock_rag::{
    AnswerStream, GroundedAnswer, MindPalace, MnemonicCard, PromptTemplate, QuizQuestion, RagError, SearchResult,
    StudySession, Task,
};
use tracing::warn;

use crate::cli::{Cli, Command};
use crate::repl;
use crate::settings::SessionParts;

/// Characters of each source chunk shown under an answer.
pub const PREVIEW_CHARS: usize = 200;

/// Mind palace requests sent before a malformed reply is reported.
const PALACE_ATTEMPTS: usize = 3;

/// Run the parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let Cli { model, rag, search, command, .. } = cli;
    match command {
        Command::Ask { documents, question, persona, stream, web } => {
            let parts = SessionParts::from_args(&model, &rag, &search, web)?;
            let mut session = parts.start(PromptTemplate::answer(persona), &documents.files).await?;
            if stream {
                let grounded = session.ask_stream(&question).await?;
                let answer = print_stream(grounded.stream).await?;
                session.record_exchange(&question, &answer);
                print_sources(&grounded.sources);
            } else {
                print_answer(&session.ask(&question).await?);
            }
        }
        Command::Notes { documents, topic, style, length, persona } => {
            let template = PromptTemplate::new(persona, Task::Notes { style, length })?;
            one_shot(SessionParts::from_args(&model, &rag, &search, false)?, template, &documents.files, &topic)
                .await?;
        }
        Command::Exam { documents, topic, difficulty, count, answers, persona } => {
            let task = Task::ExamQuestions { difficulty, count, include_answers: answers };
            let template = PromptTemplate::new(persona, task)?;
            one_shot(SessionParts::from_args(&model, &rag, &search, false)?, template, &documents.files, &topic)
                .await?;
        }
        Command::Analyze { documents, topic, persona } => {
            let template = PromptTemplate::new(persona, Task::Analysis)?;
            one_shot(SessionParts::from_args(&model, &rag, &search, false)?, template, &documents.files, &topic)
                .await?;
        }
        Command::Mnemonic { documents, topic, preferences, quiz, export, persona } => {
            let template = PromptTemplate::new(persona.clone(), Task::Mnemonic { preferences })?;
            let parts = SessionParts::from_args(&model, &rag, &search, false)?;
            let mut session = parts.start(template, &documents.files).await?;
            let answer = session.ask(&topic).await?;
            print_answer(&answer);

            let mut card = MnemonicCard::new(topic, answer.answer);
            if quiz {
                let question = quiz_on(&mut session, persona, &card.mnemonic).await?;
                println!("\nQuiz: {}\nAnswer: {}", question.question, question.answer);
                card = card.with_quiz(question);
            }
            if let Some(path) = export {
                std::fs::write(&path, render_card(&card, &path))
                    .with_context(|| format!("cannot write {}", path.display()))?;
                eprintln!("Wrote {}.", path.display());
            }
        }
        Command::MindPalace { documents, topic, learning_style, preferences, tour, json, persona } => {
            let template = PromptTemplate::new(persona, Task::MindPalace { learning_style, preferences })?;
            let parts = SessionParts::from_args(&model, &rag, &search, false)?;
            let mut session = parts.start(template, &documents.files).await?;
            let (palace, sources) = build_palace(&mut session, &topic).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&palace)?);
            } else if tour {
                println!("{}", palace.tour());
            } else {
                println!("{}", palace.to_markdown());
            }
            print_sources(&sources);
        }
        Command::Chat { documents, persona, stream, web } => {
            let parts = SessionParts::from_args(&model, &rag, &search, web)?;
            let mut session = parts.start(PromptTemplate::answer(persona), &documents.files).await?;
            repl::run(&mut session, stream).await?;
        }
    }
    Ok(())
}

async fn one_shot(
    parts: SessionParts,
    template: PromptTemplate,
    files: &[std::path::PathBuf],
    topic: &str,
) -> Result<()> {
    let mut session: StudySession = parts.start(template, files).await?;
    print_answer(&session.ask(topic).await?);
    Ok(())
}

/// Ask for a quiz question on `mnemonic`, without retrieval.
async fn quiz_on(session: &mut StudySession, persona: sherlock_rag::Persona, mnemonic: &str) -> Result<QuizQuestion> {
    session.set_template(PromptTemplate::new(persona, Task::MnemonicQuiz)?);
    Ok(QuizQuestion::parse(&session.ask_plain(mnemonic).await?))
}

/// Markdown for `.md` and `.markdown` paths, plain text otherwise.
fn render_card(card: &MnemonicCard, path: &Path) -> String {
    let markdown = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"));
    if markdown { card.to_markdown() } else { card.to_text() }
}

/// Ask for the palace, asking again while the reply is not a palace.
async fn build_palace(session: &mut StudySession, topic: &str) -> Result<(MindPalace, Vec<SearchResult>)> {
    let mut attempt = 1;
    loop {
        let answer = session.ask(topic).await?;
        match MindPalace::from_reply(&answer.answer) {
            Ok(palace) => return Ok((palace, answer.sources)),
            Err(e) if attempt < PALACE_ATTEMPTS => {
                warn!(attempt, error = %e, "mind palace reply unusable, asking again");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Print fragments as they arrive and return the whole answer.
pub async fn print_stream(mut stream: AnswerStream) -> Result<String> {
    let mut stdout = io::stdout();
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        write!(stdout, "{fragment}")?;
        stdout.flush()?;
        answer.push_str(&fragment);
    }
    writeln!(stdout)?;
    Ok(answer)
}

pub fn print_answer(answer: &GroundedAnswer) {
    println!("{}", answer.answer);
    print_sources(&answer.sources);
}

pub fn print_sources(sources: &[SearchResult]) {
    if !sources.is_empty() {
        println!("\n{}", format_sources(sources));
    }
}

/// A numbered "Sources" list: source name, chunk ordinal and score, then the
/// first [`PREVIEW_CHARS`] characters of the chunk.
pub fn format_sources(sources: &[SearchResult]) -> String {
    let mut out = String::from("Sources:");
    for (i, source) in sources.iter().enumerate() {
        let chunk = &source.chunk;
        let preview = chunk.preview(PREVIEW_CHARS).replace('\n', " ");
        let ellipsis = if chunk.char_len() > PREVIEW_CHARS { "..." } else { "" };
        out.push_str(&format!(
            "\n[{}] {} (chunk {}, score {:.2})\n    {preview}{ellipsis}",
            i + 1,
            chunk.source,
            chunk.ordinal,
            source.score
        ));
    }
    out
}

/// One line for the user: `<stage> failed: <message>` for pipeline errors,
/// the full error chain otherwise.
pub fn describe_error(err: &anyhow::Error) -> String {
    if let Some(rag) = err.downcast_ref::<RagError>() {
        return format!("{} failed: {rag}", rag.stage());
    }
    if let Some(model) = err.downcast_ref::<ModelError>() {
        return format!("completion failed: {model}");
    }
    format!("error: {err:#}")
}
