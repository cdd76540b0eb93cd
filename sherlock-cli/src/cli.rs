//! Command-line arguments.
//!
//! Every setting can also come from the environment (or a `.env` file,
//! loaded before parsing).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use sherlock_model::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use sherlock_rag::{ChunkingStrategy, Difficulty, LearningStyle, NoteLength, NoteStyle, Persona};
use sherlock_telemetry::LogFormat;

/// Ask questions about your study documents.
#[derive(Parser, Debug, Clone)]
#[command(name = "sherlock", version, about, long_about = None)]
pub struct Cli {
    /// Log line format (logs go to stderr)
    #[arg(long, global = true, default_value = "pretty", env = "SHERLOCK_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub rag: RagArgs,

    #[command(flatten)]
    pub search: SearchArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Completion endpoint settings.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// API key for the completion endpoint
    #[arg(long, global = true, env = "SHERLOCK_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[arg(long, global = true, env = "SHERLOCK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Chat model name
    #[arg(long, global = true, env = "SHERLOCK_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "SHERLOCK_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Sampling temperature (0 to 2)
    #[arg(long, global = true, env = "SHERLOCK_TEMPERATURE")]
    pub temperature: Option<f32>,

    /// Upper bound on generated tokens
    #[arg(long, global = true, env = "SHERLOCK_MAX_TOKENS")]
    pub max_tokens: Option<u32>,
}

/// Where chunk embeddings come from.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Feature hashing; offline, no model download
    #[default]
    Hashing,
    /// An OpenAI-compatible embeddings endpoint
    Openai,
    /// A local ONNX model (needs the `local-embeddings` feature)
    Local,
}

/// How documents are split into chunks.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkingArg {
    /// Fixed character windows
    #[default]
    Fixed,
    /// Paragraph, line and word boundaries first
    Recursive,
}

impl From<ChunkingArg> for ChunkingStrategy {
    fn from(arg: ChunkingArg) -> Self {
        match arg {
            ChunkingArg::Fixed => ChunkingStrategy::Fixed,
            ChunkingArg::Recursive => ChunkingStrategy::Recursive,
        }
    }
}

/// Ingestion and retrieval settings.
#[derive(Args, Debug, Clone)]
pub struct RagArgs {
    /// Embedding backend
    #[arg(long, global = true, value_enum, env = "SHERLOCK_EMBEDDINGS", default_value_t = EmbeddingBackend::Hashing)]
    pub embeddings: EmbeddingBackend,

    /// API key for `--embeddings openai`
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub embeddings_api_key: Option<String>,

    /// Base URL for `--embeddings openai`
    #[arg(long, global = true, env = "SHERLOCK_EMBEDDINGS_BASE_URL")]
    pub embeddings_base_url: Option<String>,

    /// Chunk size in characters
    #[arg(long, global = true, env = "SHERLOCK_CHUNK_SIZE", default_value_t = 1000)]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[arg(long, global = true, env = "SHERLOCK_CHUNK_OVERLAP", default_value_t = 200)]
    pub chunk_overlap: usize,

    /// Chunking strategy
    #[arg(long, global = true, value_enum, env = "SHERLOCK_CHUNKING", default_value_t = ChunkingArg::Fixed)]
    pub chunking: ChunkingArg,

    /// Chunks retrieved per question
    #[arg(long, global = true, env = "SHERLOCK_TOP_K", default_value_t = 3)]
    pub top_k: usize,
}

/// Web search settings, used with `--web`.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Google Custom Search API key
    #[arg(long, global = true, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// Google Custom Search engine id
    #[arg(long, global = true, env = "GOOGLE_CSE_ID")]
    pub google_cse_id: Option<String>,

    /// Search hits appended to each question
    #[arg(long, global = true, default_value_t = 3)]
    pub web_results: usize,
}

/// Documents to ground answers on.
#[derive(Args, Debug, Clone, Default)]
pub struct DocumentArgs {
    /// A txt, md, pdf or docx file (repeatable)
    #[arg(long = "file", short = 'f', value_name = "PATH")]
    pub files: Vec<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Answer one question
    Ask {
        #[command(flatten)]
        documents: DocumentArgs,
        /// The question
        #[arg(long, short)]
        question: String,
        /// default, sherlock, yoda, shakespeare, or a custom instruction
        #[arg(long, short, default_value = "default")]
        persona: Persona,
        /// Print the answer as it arrives
        #[arg(long)]
        stream: bool,
        /// Append web search results to the question
        #[arg(long)]
        web: bool,
    },
    /// Write study notes on a topic
    Notes {
        #[command(flatten)]
        documents: DocumentArgs,
        /// The topic
        #[arg(long, short)]
        topic: String,
        /// concise, detailed, academic or casual
        #[arg(long, default_value = "concise")]
        style: NoteStyle,
        /// short, medium or long
        #[arg(long, default_value = "medium")]
        length: NoteLength,
        #[arg(long, short, default_value = "default")]
        persona: Persona,
    },
    /// Write exam questions on a topic
    Exam {
        #[command(flatten)]
        documents: DocumentArgs,
        /// The topic
        #[arg(long, short)]
        topic: String,
        /// super-easy, easy, beginner, intermediate, higher-intermediate, master or advanced
        #[arg(long, default_value = "intermediate")]
        difficulty: Difficulty,
        /// Number of questions
        #[arg(long, short = 'n', default_value_t = 5)]
        count: u32,
        /// Follow each question with its answer
        #[arg(long)]
        answers: bool,
        #[arg(long, short, default_value = "default")]
        persona: Persona,
    },
    /// Suggest how to learn a topic from first principles
    Analyze {
        #[command(flatten)]
        documents: DocumentArgs,
        /// The topic
        #[arg(long, short)]
        topic: String,
        #[arg(long, short, default_value = "default")]
        persona: Persona,
    },
    /// Invent a mnemonic for a topic
    Mnemonic {
        #[command(flatten)]
        documents: DocumentArgs,
        /// The topic
        #[arg(long, short)]
        topic: String,
        /// Your interests, woven into the mnemonic
        #[arg(long, default_value = "")]
        preferences: String,
        /// Follow up with a quiz question on the mnemonic
        #[arg(long)]
        quiz: bool,
        /// Also write the mnemonic to a file (Markdown for .md, plain text otherwise)
        #[arg(long, value_name = "PATH")]
        export: Option<PathBuf>,
        #[arg(long, short, default_value = "default")]
        persona: Persona,
    },
    /// Lay out a mind palace for a topic
    MindPalace {
        #[command(flatten)]
        documents: DocumentArgs,
        /// The topic
        #[arg(long, short)]
        topic: String,
        /// visual, auditory, kinesthetic or reading-writing
        #[arg(long, default_value = "visual")]
        learning_style: LearningStyle,
        /// Favourite places, hobbies, films: anything that resonates
        #[arg(long, default_value = "")]
        preferences: String,
        /// Print a guided walk through the palace instead of the room list
        #[arg(long)]
        tour: bool,
        /// Print the palace as JSON
        #[arg(long, conflicts_with = "tour")]
        json: bool,
        #[arg(long, short, default_value = "default")]
        persona: Persona,
    },
    /// Interactive chat
    Chat {
        #[command(flatten)]
        documents: DocumentArgs,
        #[arg(long, short, default_value = "default")]
        persona: Persona,
        /// Print answers as they arrive
        #[arg(long)]
        stream: bool,
        /// Append web search results to every question
        #[arg(long)]
        web: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_parses_files_and_persona() {
        let cli = Cli::try_parse_from([
            "sherlock", "--api-key", "k", "ask", "-f", "a.pdf", "--file", "b.md", "-q", "Why?", "--persona", "Yoda",
            "--stream",
        ])
        .unwrap();
        match cli.command {
            Command::Ask { documents, question, persona, stream, web } => {
                assert_eq!(documents.files, [PathBuf::from("a.pdf"), PathBuf::from("b.md")]);
                assert_eq!(question, "Why?");
                assert_eq!(persona, Persona::Yoda);
                assert!(stream);
                assert!(!web);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.model.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn defaults_match_the_library() {
        let cli = Cli::try_parse_from(["sherlock", "chat"]).unwrap();
        assert_eq!(cli.rag.chunk_size, 1000);
        assert_eq!(cli.rag.chunk_overlap, 200);
        assert_eq!(cli.rag.top_k, 3);
        assert_eq!(cli.rag.embeddings, EmbeddingBackend::Hashing);
        assert_eq!(cli.model.base_url, DEFAULT_BASE_URL);
        assert_eq!(cli.model.model, DEFAULT_MODEL);
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }

    #[test]
    fn exam_options_parse_loosely() {
        let cli = Cli::try_parse_from([
            "sherlock", "exam", "-t", "optics", "--difficulty", "higher-intermediate", "-n", "3", "--answers",
        ])
        .unwrap();
        match cli.command {
            Command::Exam { difficulty, count, answers, .. } => {
                assert_eq!(difficulty, Difficulty::HigherIntermediate);
                assert_eq!(count, 3);
                assert!(answers);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sherlock", "notes", "-t", "tides", "--chunk-size", "400", "--chunking", "recursive", "--log-format", "json",
        ])
        .unwrap();
        assert_eq!(cli.rag.chunk_size, 400);
        assert_eq!(cli.rag.chunking, ChunkingArg::Recursive);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn mnemonic_options_parse() {
        let cli = Cli::try_parse_from([
            "sherlock", "mnemonic", "-t", "planets", "--preferences", "football", "--quiz", "--export", "planets.md",
        ])
        .unwrap();
        match cli.command {
            Command::Mnemonic { topic, preferences, quiz, export, persona, .. } => {
                assert_eq!(topic, "planets");
                assert_eq!(preferences, "football");
                assert!(quiz);
                assert_eq!(export, Some(PathBuf::from("planets.md")));
                assert_eq!(persona, Persona::Default);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn mind_palace_options_parse() {
        let cli = Cli::try_parse_from(["sherlock", "mind-palace", "-t", "enzymes", "--learning-style", "Reading/Writing"])
            .unwrap();
        match cli.command {
            Command::MindPalace { learning_style, preferences, tour, json, .. } => {
                assert_eq!(learning_style, LearningStyle::ReadingWriting);
                assert_eq!(preferences, "");
                assert!(!tour && !json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["sherlock", "mind-palace", "-t", "x", "--tour", "--json"]).is_err());
    }

    #[test]
    fn unknown_note_style_is_rejected() {
        assert!(Cli::try_parse_from(["sherlock", "notes", "-t", "x", "--style", "florid"]).is_err());
    }

    #[test]
    fn ask_requires_a_question() {
        assert!(Cli::try_parse_from(["sherlock", "ask", "-f", "a.txt"]).is_err());
    }
}
