//! Per-user study session.
//!
//! A [`StudySession`] owns everything one user's conversation needs: the
//! similarity index built from their latest upload batch, the prompt
//! template, the chat mode and the chat history. Nothing is shared between
//! sessions except the embedder and completion client handles.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sherlock_model::MockCompletionClient;
//! use sherlock_rag::{ChatMode, HashingEmbedder, StudySession, Upload};
//!
//! # tokio_test_block(async {
//! let mut session = StudySession::builder()
//!     .embedder(Arc::new(HashingEmbedder::default()))
//!     .client(Arc::new(MockCompletionClient::new("Baker Street.")))
//!     .mode(ChatMode::Document)
//!     .build()
//!     .unwrap();
//!
//! let upload = Upload::new("notes.txt", "Holmes lives at 221B Baker Street.").unwrap();
//! session.ingest(vec![upload]).await.unwrap();
//!
//! let answer = session.ask("Where does Holmes live?").await.unwrap();
//! assert_eq!(answer.answer, "Baker Street.");
//! assert_eq!(answer.sources.len(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sherlock_model::{CompletionClient, Role};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assembler::{AnswerStream, GroundedAnswer, GroundedStream, RetrievalAssembler};
use crate::chunking::{Chunker, chunker_for};
use crate::config::RagConfig;
use crate::document::{SearchResult, Upload};
use crate::embedding::{EmbeddingProvider, embed_chunks};
use crate::error::{RagError, Result};
use crate::extract::extract;
use crate::index::SimilarityIndex;
use crate::prompt::{Persona, PromptTemplate};
use crate::search::{WebSearch, with_web_context};

/// Default number of web search hits appended to a question.
pub const DEFAULT_WEB_RESULTS: usize = 3;

/// Whether questions are answered from the uploaded documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Plain chat with the model; the index is ignored.
    #[default]
    General,
    /// Retrieval-augmented answers from the current index.
    Document,
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::General => "general",
            Self::Document => "document",
        })
    }
}

impl FromStr for ChatMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Self::General),
            "document" | "documents" | "doc" => Ok(Self::Document),
            other => Err(RagError::InvalidConfiguration(format!(
                "unknown chat mode '{other}' (expected general or document)"
            ))),
        }
    }
}

/// One message in the session's chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// `User` or `Assistant`.
    pub role: Role,
    /// The message as shown to the user (without web context).
    pub content: String,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    fn now(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), timestamp: Utc::now() }
    }
}

/// Per-document outcome of a successful ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestedDocument {
    /// Document identifier.
    pub id: String,
    /// Uploaded file name.
    pub name: String,
    /// Extracted text length in characters.
    pub chars: usize,
    /// Number of chunks produced.
    pub chunks: usize,
}

/// What a successful [`StudySession::ingest`] indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// One entry per upload, in upload order.
    pub documents: Vec<IngestedDocument>,
    /// Embedding dimension of the new index.
    pub dimensions: usize,
}

impl IngestReport {
    /// Chunks across all documents.
    pub fn total_chunks(&self) -> usize {
        self.documents.iter().map(|d| d.chunks).sum()
    }
}

/// A single user's conversation over their uploaded documents.
///
/// Construct one via [`StudySession::builder()`]. All operations run to
/// completion on the caller's task; the index is replaced wholesale by
/// [`ingest`](Self::ingest) and never modified in place.
pub struct StudySession {
    id: Uuid,
    config: RagConfig,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    client: Arc<dyn CompletionClient>,
    assembler: RetrievalAssembler,
    mode: ChatMode,
    index: Arc<SimilarityIndex>,
    history: Vec<ChatTurn>,
    last_sources: Vec<SearchResult>,
    web_search: Option<Arc<dyn WebSearch>>,
    web_results: usize,
}

impl StudySession {
    /// Create a new [`StudySessionBuilder`].
    pub fn builder() -> StudySessionBuilder {
        StudySessionBuilder::default()
    }

    /// The session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The validated configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The current chat mode.
    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    /// Switch between general and document chat.
    pub fn set_mode(&mut self, mode: ChatMode) {
        debug!(session.id = %self.id, from = %self.mode, to = %mode, "chat mode changed");
        self.mode = mode;
    }

    /// The prompt template used by both paths.
    pub fn template(&self) -> &PromptTemplate {
        self.assembler.template()
    }

    /// Replace the prompt template.
    pub fn set_template(&mut self, template: PromptTemplate) {
        self.assembler = self.assembler.clone().with_template(template);
    }

    /// Replace the persona, keeping the current task.
    pub fn set_persona(&mut self, persona: Persona) -> Result<()> {
        let template = PromptTemplate::new(persona, self.template().task().clone())?;
        self.set_template(template);
        Ok(())
    }

    /// Append web search results to every question from now on.
    pub fn set_web_search(&mut self, search: Option<Arc<dyn WebSearch>>) {
        self.web_search = search;
    }

    /// The current index. Empty until the first successful ingest.
    pub fn index(&self) -> Arc<SimilarityIndex> {
        Arc::clone(&self.index)
    }

    /// The chunks retrieved for the most recent document question, kept even
    /// if its completion failed.
    pub fn last_sources(&self) -> &[SearchResult] {
        &self.last_sources
    }

    /// The chat history, oldest first.
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Forget the chat history. The index is kept.
    pub fn clear_history(&mut self) {
        info!(session.id = %self.id, turns = self.history.len(), "chat history cleared");
        self.history.clear();
    }

    /// Extract, chunk and embed a batch of uploads, then replace the index.
    ///
    /// The batch is all-or-nothing: if any upload fails at any stage the
    /// error is returned and the previous index stays in place unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] for an empty batch,
    /// [`RagError::UnsupportedFormat`] or [`RagError::CorruptDocument`] if an
    /// upload cannot be read, and [`RagError::EmbeddingUnavailable`] if the
    /// embedder fails.
    #[tracing::instrument(skip_all, fields(session.id = %self.id, uploads = uploads.len()))]
    pub async fn ingest(&mut self, uploads: Vec<Upload>) -> Result<IngestReport> {
        if uploads.is_empty() {
            return Err(RagError::InvalidConfiguration("no documents were uploaded".to_string()));
        }

        let mut report = IngestReport::default();
        let mut chunks = Vec::new();
        for upload in &uploads {
            let document = extract(upload)?;
            if document.text.trim().is_empty() {
                warn!(document.name = %document.name, "document has no extractable text");
            }
            let document_chunks = self.chunker.chunk(&document);
            debug!(document.name = %document.name, chunks = document_chunks.len(), "chunked document");
            report.documents.push(IngestedDocument {
                id: document.id.clone(),
                name: document.name.clone(),
                chars: document.text.chars().count(),
                chunks: document_chunks.len(),
            });
            chunks.extend(document_chunks);
        }

        let vectors = embed_chunks(self.embedder.as_ref(), &chunks).await?;
        let index = SimilarityIndex::build(chunks, vectors)?;
        report.dimensions = index.dimensions();

        self.index = Arc::new(index);
        self.last_sources.clear();
        info!(
            documents = report.documents.len(),
            chunks = report.total_chunks(),
            provider = self.embedder.name(),
            "indexed upload batch"
        );
        Ok(report)
    }

    /// Whether [`ask`](Self::ask) would take the retrieval path.
    pub fn uses_retrieval(&self) -> bool {
        self.mode == ChatMode::Document && !self.index.is_empty()
    }

    /// Answer a question and record the exchange.
    ///
    /// In [`ChatMode::Document`] with a non-empty index the answer is
    /// grounded on retrieved chunks; otherwise the question goes straight to
    /// the model and the answer has no sources.
    #[tracing::instrument(skip_all, fields(session.id = %self.id, mode = %self.mode))]
    pub async fn ask(&mut self, question: &str) -> Result<GroundedAnswer> {
        if !self.uses_retrieval() {
            let answer = self.ask_plain(question).await?;
            return Ok(GroundedAnswer { answer, sources: Vec::new() });
        }

        let prompt = self.with_web(question).await;
        self.last_sources.clear();
        let answer =
            self.assembler.answer_keeping(&self.index, question, &prompt, &mut self.last_sources).await?;
        self.record_exchange(question, &answer.answer);
        Ok(answer)
    }

    /// Send the question to the model with only the persona instruction.
    pub async fn ask_plain(&mut self, question: &str) -> Result<String> {
        let prompt = self.with_web(question).await;
        let messages = self.template().render_plain(&prompt);
        let answer = self.client.complete(&messages).await?;
        self.record_exchange(question, &answer);
        Ok(answer)
    }

    /// Streaming variant of [`ask`](Self::ask).
    ///
    /// Nothing is recorded; once the stream is drained, pass the full answer
    /// to [`record_exchange`](Self::record_exchange).
    #[tracing::instrument(skip_all, fields(session.id = %self.id, mode = %self.mode))]
    pub async fn ask_stream(&mut self, question: &str) -> Result<GroundedStream> {
        let prompt = self.with_web(question).await;
        if !self.uses_retrieval() {
            let messages = self.template().render_plain(&prompt);
            let stream = self.client.complete_stream(&messages).await?;
            let stream: AnswerStream = Box::pin(stream.map(|fragment| fragment.map_err(RagError::from)));
            return Ok(GroundedStream { stream, sources: Vec::new() });
        }

        self.last_sources.clear();
        self.assembler.answer_stream_keeping(&self.index, question, &prompt, &mut self.last_sources).await
    }

    /// Re-run only the completion step with previously retrieved sources,
    /// typically [`last_sources`](Self::last_sources) after a timeout.
    pub async fn retry_completion(
        &mut self,
        question: &str,
        sources: &[SearchResult],
    ) -> Result<GroundedAnswer> {
        debug!(session.id = %self.id, sources = sources.len(), "retrying completion");
        let prompt = self.with_web(question).await;
        let answer = self.assembler.complete(&prompt, sources).await?;
        self.record_exchange(question, &answer.answer);
        Ok(answer)
    }

    /// Append a user question and the assistant's answer to the history.
    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.history.push(ChatTurn::now(Role::User, question));
        self.history.push(ChatTurn::now(Role::Assistant, answer));
    }

    /// Write the history as CSV with a `role,content,timestamp` header.
    /// Timestamps are RFC 3339 in UTC.
    pub fn export_history_csv<W: io::Write>(&self, writer: W) -> io::Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["role", "content", "timestamp"])?;
        for turn in &self.history {
            let timestamp = turn.timestamp.to_rfc3339();
            csv.write_record([turn.role.as_str(), turn.content.as_str(), timestamp.as_str()])?;
        }
        csv.flush()?;
        debug!(session.id = %self.id, turns = self.history.len(), "exported chat history");
        Ok(())
    }

    /// `question` with web results appended, or unchanged if search is off
    /// or fails.
    async fn with_web(&self, question: &str) -> String {
        let Some(search) = &self.web_search else {
            return question.to_string();
        };
        match search.search(question, self.web_results).await {
            Ok(hits) => with_web_context(question, &hits),
            Err(e) => {
                warn!(session.id = %self.id, error = %e, "web search failed, answering without it");
                question.to_string()
            }
        }
    }
}

impl fmt::Debug for StudySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudySession")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("mode", &self.mode)
            .field("embedder", &self.embedder.name())
            .field("model", &self.client.model())
            .field("index_chunks", &self.index.len())
            .field("history", &self.history.len())
            .field("web_search", &self.web_search.is_some())
            .finish()
    }
}

/// Builder for constructing a [`StudySession`].
///
/// The embedder and completion client are required; everything else has a
/// default.
#[derive(Default)]
pub struct StudySessionBuilder {
    config: Option<RagConfig>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    client: Option<Arc<dyn CompletionClient>>,
    template: Option<PromptTemplate>,
    mode: ChatMode,
    web_search: Option<Arc<dyn WebSearch>>,
    web_results: Option<usize>,
}

impl StudySessionBuilder {
    /// Set the chunking and retrieval configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the completion client.
    pub fn client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the prompt template. Defaults to answering as the default persona.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Answer questions as `persona`.
    pub fn persona(mut self, persona: Persona) -> Self {
        self.template = Some(PromptTemplate::answer(persona));
        self
    }

    /// Set the initial chat mode.
    pub fn mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    /// Append up to `limit` web search hits to each question.
    pub fn web_search(mut self, search: Arc<dyn WebSearch>, limit: usize) -> Self {
        self.web_search = Some(search);
        self.web_results = Some(limit);
        self
    }

    /// Build the session.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if the embedder or client
    /// is missing or the configuration is invalid.
    pub fn build(self) -> Result<StudySession> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::InvalidConfiguration("embedder is required".to_string()))?;
        let client = self
            .client
            .ok_or_else(|| RagError::InvalidConfiguration("completion client is required".to_string()))?;
        let chunker = chunker_for(&config)?;
        let assembler = RetrievalAssembler::new(
            Arc::clone(&embedder),
            Arc::clone(&client),
            self.template.unwrap_or_default(),
            config.top_k,
        )?;

        let session = StudySession {
            id: Uuid::new_v4(),
            config,
            chunker,
            embedder,
            client,
            assembler,
            mode: self.mode,
            index: Arc::new(SimilarityIndex::empty()),
            history: Vec::new(),
            last_sources: Vec::new(),
            web_search: self.web_search,
            web_results: self.web_results.unwrap_or(DEFAULT_WEB_RESULTS),
        };
        info!(session.id = %session.id, mode = %session.mode, model = session.client.model(), "session started");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sherlock_model::MockCompletionClient;

    use super::*;
    use crate::hashing::HashingEmbedder;
    use crate::search::SearchHit;

    fn session(client: Arc<MockCompletionClient>, mode: ChatMode) -> StudySession {
        StudySession::builder()
            .config(RagConfig::builder().chunk_size(200).chunk_overlap(0).build().unwrap())
            .embedder(Arc::new(HashingEmbedder::default()))
            .client(client)
            .mode(mode)
            .build()
            .unwrap()
    }

    struct FixedSearch {
        fail: bool,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WebSearch for FixedSearch {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(RagError::SearchUnavailable("quota exceeded".into()));
            }
            Ok(vec![SearchHit {
                title: "Reichenbach Falls".into(),
                link: "https://example.org/falls".into(),
                snippet: "A waterfall in Switzerland.".into(),
            }])
        }
    }

    #[test]
    fn builder_requires_client_and_embedder() {
        let err = StudySession::builder().embedder(Arc::new(HashingEmbedder::default())).build().unwrap_err();
        assert!(err.to_string().contains("completion client"));
        let err = StudySession::builder().client(Arc::new(MockCompletionClient::new("x"))).build().unwrap_err();
        assert!(err.to_string().contains("embedder"));
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let config = RagConfig { chunk_overlap: 1000, ..RagConfig::default() };
        let err = StudySession::builder()
            .config(config)
            .embedder(Arc::new(HashingEmbedder::default()))
            .client(Arc::new(MockCompletionClient::new("x")))
            .build()
            .unwrap_err();
        assert_eq!(err.stage(), "configuration");
    }

    #[test]
    fn chat_mode_parses_loosely() {
        assert_eq!(" Document ".parse::<ChatMode>().unwrap(), ChatMode::Document);
        assert_eq!("general".parse::<ChatMode>().unwrap(), ChatMode::General);
        assert!("both".parse::<ChatMode>().is_err());
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let mut session = session(Arc::new(MockCompletionClient::new("x")), ChatMode::Document);
        let err = session.ingest(Vec::new()).await.unwrap_err();
        assert_eq!(err.stage(), "configuration");
    }

    #[tokio::test]
    async fn ingest_reports_per_document_counts() {
        let mut session = session(Arc::new(MockCompletionClient::new("x")), ChatMode::Document);
        let report = session
            .ingest(vec![
                Upload::new("a.txt", "x".repeat(450)).unwrap(),
                Upload::new("b.md", "# Title").unwrap(),
                Upload::new("blank.txt", "").unwrap(),
            ])
            .await
            .unwrap();
        let counts: Vec<_> = report.documents.iter().map(|d| (d.name.as_str(), d.chunks)).collect();
        assert_eq!(counts, [("a.txt", 3), ("b.md", 1), ("blank.txt", 0)]);
        assert_eq!(report.total_chunks(), 4);
        assert_eq!(report.dimensions, 384);
        assert_eq!(session.index().len(), 4);
    }

    #[tokio::test]
    async fn general_mode_ignores_index() {
        let client = Arc::new(MockCompletionClient::new("Elementary."));
        let mut session = session(client.clone(), ChatMode::General);
        session.ingest(vec![Upload::new("a.txt", "The hound was luminous.").unwrap()]).await.unwrap();

        let answer = session.ask("What glowed?").await.unwrap();
        assert!(answer.sources.is_empty());
        let request = client.last_request().unwrap();
        assert_eq!(request.len(), 2);
        assert_eq!(request[1].content, "What glowed?");
    }

    #[tokio::test]
    async fn document_mode_without_index_falls_back_to_plain() {
        let client = Arc::new(MockCompletionClient::new("No documents yet."));
        let mut session = session(client.clone(), ChatMode::Document);
        assert!(!session.uses_retrieval());
        let answer = session.ask("Anything?").await.unwrap();
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn exchanges_are_recorded_in_order() {
        let client = Arc::new(MockCompletionClient::new("Quite so."));
        let mut session = session(client, ChatMode::General);
        session.ask("First?").await.unwrap();
        session.ask_plain("Second?").await.unwrap();

        let roles: Vec<_> = session.history().iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(session.history()[2].content, "Second?");

        session.clear_history();
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn failed_question_is_not_recorded() {
        let client = Arc::new(MockCompletionClient::failing("offline"));
        let mut session = session(client, ChatMode::General);
        let err = session.ask("Hello?").await.unwrap_err();
        assert_eq!(err.stage(), "completion");
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn web_results_reach_the_prompt_but_not_the_history() {
        let client = Arc::new(MockCompletionClient::new("In Switzerland."));
        let mut session = session(client.clone(), ChatMode::General);
        let search = Arc::new(FixedSearch { fail: false, queries: Mutex::new(Vec::new()) });
        let handle: Arc<dyn WebSearch> = search.clone();
        session.set_web_search(Some(handle));

        session.ask("Where are the falls?").await.unwrap();
        let prompt = &client.last_request().unwrap()[1].content;
        assert!(prompt.starts_with("Where are the falls?\n\nWeb search results:\nTitle: Reichenbach Falls"));
        assert_eq!(session.history()[0].content, "Where are the falls?");
        assert_eq!(search.queries.lock().unwrap().as_slice(), ["Where are the falls?"]);
    }

    #[tokio::test]
    async fn failed_web_search_degrades_to_plain_question() {
        let (events, _guard) = sherlock_telemetry::memory::capture();
        let client = Arc::new(MockCompletionClient::new("Somewhere."));
        let mut session = session(client.clone(), ChatMode::General);
        session.set_web_search(Some(Arc::new(FixedSearch { fail: true, queries: Mutex::new(Vec::new()) })));

        session.ask("Where are the falls?").await.unwrap();
        assert_eq!(client.last_request().unwrap()[1].content, "Where are the falls?");
        assert!(events.contains(tracing::Level::WARN, "web search failed"));
    }

    #[tokio::test]
    async fn query_stages_share_one_request_id() {
        let (events, _guard) = sherlock_telemetry::memory::capture();
        let client = Arc::new(MockCompletionClient::new("Elementary."));
        let mut session = session(client, ChatMode::Document);
        session.ingest(vec![Upload::new("a.txt", "The hound was luminous.").unwrap()]).await.unwrap();
        session.ask("What glowed?").await.unwrap();

        let stages: Vec<_> = events.all().into_iter().filter(|e| e.message == "query stage").collect();
        let walked: Vec<_> = stages.iter().map(|e| e.fields["to"].as_str().unwrap_or_default().to_string()).collect();
        assert_eq!(walked, ["embedding_query", "retrieving", "prompt_assembled", "completed"]);
        let request_id = &stages[0].fields["request.id"];
        assert!(stages.iter().all(|e| &e.fields["request.id"] == request_id));
        assert_eq!(stages[0].fields["session.id"], session.id().to_string());
        assert!(events.contains(tracing::Level::INFO, "indexed upload batch"));
    }

    #[tokio::test]
    async fn streamed_answer_is_recorded_by_caller() {
        let client = Arc::new(MockCompletionClient::new("You have been in Afghanistan."));
        let mut session = session(client, ChatMode::Document);
        session.ingest(vec![Upload::new("study.txt", "Watson served in Afghanistan.").unwrap()]).await.unwrap();

        let grounded = session.ask_stream("Where did Watson serve?").await.unwrap();
        assert_eq!(grounded.sources.len(), 1);
        let fragments: Vec<String> = grounded.stream.map(|f| f.unwrap()).collect().await;
        let answer = fragments.concat();
        assert_eq!(answer, "You have been in Afghanistan.");
        assert!(session.history().is_empty());

        session.record_exchange("Where did Watson serve?", &answer);
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn persona_change_keeps_task() {
        let mut session = session(Arc::new(MockCompletionClient::new("x")), ChatMode::General);
        session.set_persona(Persona::Yoda).unwrap();
        assert_eq!(session.template().persona(), &Persona::Yoda);
        assert_eq!(session.template().task(), &crate::prompt::Task::Answer);
    }

    #[tokio::test]
    async fn history_exports_as_csv() {
        let mut session = session(Arc::new(MockCompletionClient::new("x")), ChatMode::General);
        session.record_exchange("Who is \"the woman\"?", "Irene Adler, of dubious\nand questionable memory.");

        let mut out = Vec::new();
        session.export_history_csv(&mut out).unwrap();
        let mut reader = csv::Reader::from_reader(out.as_slice());
        assert_eq!(reader.headers().unwrap(), vec!["role", "content", "timestamp"]);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "user");
        assert_eq!(&rows[0][1], "Who is \"the woman\"?");
        assert_eq!(&rows[1][1], "Irene Adler, of dubious\nand questionable memory.");
        assert!(DateTime::parse_from_rfc3339(&rows[1][2]).is_ok());
    }
}
