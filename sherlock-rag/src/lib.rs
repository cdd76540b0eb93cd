//! # sherlock-rag
//!
//! Retrieval-augmented question answering over uploaded study documents.
//!
//! ## Overview
//!
//! An upload batch flows through four stages before it can be queried:
//!
//! 1. [`extract`] turns an [`Upload`] (`txt`, `md`, `pdf` or `docx`) into a
//!    plain-text [`Document`]
//! 2. a [`Chunker`] splits each document into overlapping [`Chunk`]s
//! 3. an [`EmbeddingProvider`] maps every chunk to a vector
//! 4. a [`SimilarityIndex`] holds the (chunk, vector) pairs for cosine search
//!
//! A [`RetrievalAssembler`] then answers questions against an index: it
//! embeds the question, retrieves the top-k chunks, renders them into a
//! [`PromptTemplate`] and hands the messages to a
//! [`CompletionClient`](sherlock_model::CompletionClient).
//!
//! [`StudySession`] ties it together for one user: it owns the current
//! index, the chat mode and the chat history.
//!
//! Besides plain answers, a [`Task`] can ask for notes, exam questions, a
//! topic analysis, a mnemonic or a mind palace. [`recall`] reads the last two
//! kinds of reply.
//!
//! ## Features
//!
//! - `openai` (default): [`openai::OpenAIEmbeddingProvider`]
//! - `local-embeddings`: [`local::LocalEmbeddingProvider`] (fastembed, runs offline)
//! - `web-search`: [`GoogleSearchClient`] as an extra context provider
//!
//! [`HashingEmbedder`] is always available and needs no network.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sherlock_model::openai::{OpenAICompatibleClient, OpenAIConfig};
//! use sherlock_rag::{ChatMode, HashingEmbedder, RagConfig, StudySession, Upload};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenAICompatibleClient::new(OpenAIConfig::new("api-key"))?;
//! let mut session = StudySession::builder()
//!     .config(RagConfig::builder().chunk_size(500).chunk_overlap(50).build()?)
//!     .embedder(Arc::new(HashingEmbedder::default()))
//!     .client(Arc::new(client))
//!     .mode(ChatMode::Document)
//!     .build()?;
//!
//! session.ingest(vec![Upload::from_path("lecture.pdf")?]).await?;
//! let answer = session.ask("What is the main argument?").await?;
//! println!("{}", answer.answer);
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod hashing;
pub mod index;
pub mod prompt;
pub mod recall;
pub mod search;
pub mod session;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "local-embeddings")]
pub mod local;

pub use assembler::{AnswerStream, GroundedAnswer, GroundedStream, QueryStage, RetrievalAssembler};
pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, chunker_for};
pub use config::{ChunkingStrategy, RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, DocumentFormat, SearchResult, Upload};
pub use embedding::{EmbeddingProvider, embed_chunks};
pub use error::{RagError, Result};
pub use extract::extract;
pub use hashing::{DEFAULT_HASHING_DIMENSIONS, HashingEmbedder};
pub use index::{SimilarityIndex, cosine_similarity};
pub use prompt::{Difficulty, LearningStyle, NoteLength, NoteStyle, Persona, PromptTemplate, Task};
pub use recall::{MindPalace, MnemonicCard, PalaceElement, PalaceRoom, QuizQuestion};
pub use search::{SearchHit, WebSearch, format_hits, with_web_context};
pub use session::{ChatMode, ChatTurn, IngestReport, IngestedDocument, StudySession, StudySessionBuilder};

#[cfg(feature = "web-search")]
pub use search::GoogleSearchClient;
