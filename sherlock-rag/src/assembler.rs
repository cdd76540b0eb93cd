//! Retrieval-augmented query assembly.
//!
//! The [`RetrievalAssembler`] turns a question into a grounded answer:
//!
//! ```text
//! Idle → EmbeddingQuery → Retrieving → PromptAssembled → Completed
//!            │                               │
//!            └───────────── Failed ◄─────────┘
//! ```
//!
//! Every request gets its own id, and every stage transition is logged at
//! debug level under that id. The steps are also exposed one by one so a
//! caller can keep the retrieved sources and retry only the completion.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sherlock_model::{ChatMessage, CompletionClient};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::SimilarityIndex;
use crate::prompt::PromptTemplate;

/// Where a request is in the retrieval-augmented walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    /// Not started.
    Idle,
    /// Embedding the question.
    EmbeddingQuery,
    /// Searching the index.
    Retrieving,
    /// Messages built, waiting on the completion endpoint.
    PromptAssembled,
    /// The completion response is available.
    Completed,
    /// A stage failed. Terminal.
    Failed,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::EmbeddingQuery => "embedding_query",
            Self::Retrieving => "retrieving",
            Self::PromptAssembled => "prompt_assembled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// One request's walk through [`QueryStage`]s.
#[derive(Clone, Copy)]
struct Run {
    request_id: Uuid,
    stage: QueryStage,
}

impl Run {
    fn start() -> Self {
        Self { request_id: Uuid::new_v4(), stage: QueryStage::Idle }
    }

    fn advance(&mut self, next: QueryStage) {
        debug!(request.id = %self.request_id, from = %self.stage, to = %next, "query stage");
        self.stage = next;
    }

    fn fail(&mut self, err: RagError) -> RagError {
        error!(request.id = %self.request_id, stage = %self.stage, error = %err, "query failed");
        self.advance(QueryStage::Failed);
        err
    }
}

/// A completion together with the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundedAnswer {
    /// The completion response, verbatim.
    pub answer: String,
    /// The retrieved chunks, best first.
    pub sources: Vec<SearchResult>,
}

/// An incremental answer. Errors mid-stream surface as
/// [`RagError::CompletionUnavailable`]; the first one also moves the request
/// to [`QueryStage::Failed`].
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A streamed completion together with the chunks it was grounded on.
pub struct GroundedStream {
    /// Answer fragments in arrival order.
    pub stream: AnswerStream,
    /// The retrieved chunks, best first.
    pub sources: Vec<SearchResult>,
}

impl fmt::Debug for GroundedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroundedStream").field("sources", &self.sources).finish_non_exhaustive()
    }
}

/// Embeds a question, retrieves the best chunks, and asks the model.
#[derive(Clone)]
pub struct RetrievalAssembler {
    embedder: Arc<dyn EmbeddingProvider>,
    client: Arc<dyn CompletionClient>,
    template: PromptTemplate,
    top_k: usize,
}

impl RetrievalAssembler {
    /// Create an assembler retrieving `top_k` chunks per question.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `top_k == 0`.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        client: Arc<dyn CompletionClient>,
        template: PromptTemplate,
        top_k: usize,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(RagError::InvalidConfiguration("top_k must be greater than zero".to_string()));
        }
        Ok(Self { embedder, client, template, top_k })
    }

    /// Replace the prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// The prompt template.
    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Chunks retrieved per question.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Embed `query` and return the `top_k` closest chunks, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingUnavailable`] if the embedder fails.
    /// Retrieval itself never fails.
    pub async fn retrieve(&self, index: &SimilarityIndex, query: &str) -> Result<Vec<SearchResult>> {
        let mut run = Run::start();
        self.retrieve_in(&mut run, index, query).await
    }

    /// Build the message list for `query` grounded on `sources`.
    pub fn assemble(&self, query: &str, sources: &[SearchResult]) -> Vec<ChatMessage> {
        self.template.render(query, sources)
    }

    /// Ask the model to answer `query` from already retrieved `sources`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CompletionUnavailable`] if the endpoint fails;
    /// `sources` stay with the caller for a retry.
    pub async fn complete(&self, query: &str, sources: &[SearchResult]) -> Result<GroundedAnswer> {
        let mut run = Run::start();
        self.complete_in(&mut run, query, sources).await
    }

    /// Streaming variant of [`complete`](Self::complete).
    pub async fn complete_stream(&self, query: &str, sources: &[SearchResult]) -> Result<GroundedStream> {
        let mut run = Run::start();
        self.complete_stream_in(&mut run, query, sources).await
    }

    /// The whole walk: retrieve, assemble, complete.
    #[tracing::instrument(skip_all, fields(top_k = self.top_k, index.chunks = index.len()))]
    pub async fn answer(&self, index: &SimilarityIndex, query: &str) -> Result<GroundedAnswer> {
        let mut run = Run::start();
        let sources = self.retrieve_in(&mut run, index, query).await?;
        self.complete_in(&mut run, query, &sources).await
    }

    /// Streaming variant of [`answer`](Self::answer).
    #[tracing::instrument(skip_all, fields(top_k = self.top_k, index.chunks = index.len()))]
    pub async fn answer_stream(&self, index: &SimilarityIndex, query: &str) -> Result<GroundedStream> {
        let mut run = Run::start();
        let sources = self.retrieve_in(&mut run, index, query).await?;
        self.complete_stream_in(&mut run, query, &sources).await
    }

    /// [`answer`](Self::answer) with the retrieval query and the prompt
    /// input kept apart. `sources` holds the retrieved chunks even if the
    /// completion then fails.
    pub(crate) async fn answer_keeping(
        &self,
        index: &SimilarityIndex,
        query: &str,
        prompt: &str,
        sources: &mut Vec<SearchResult>,
    ) -> Result<GroundedAnswer> {
        let mut run = Run::start();
        *sources = self.retrieve_in(&mut run, index, query).await?;
        self.complete_in(&mut run, prompt, sources).await
    }

    /// Streaming variant of [`answer_keeping`](Self::answer_keeping).
    pub(crate) async fn answer_stream_keeping(
        &self,
        index: &SimilarityIndex,
        query: &str,
        prompt: &str,
        sources: &mut Vec<SearchResult>,
    ) -> Result<GroundedStream> {
        let mut run = Run::start();
        *sources = self.retrieve_in(&mut run, index, query).await?;
        self.complete_stream_in(&mut run, prompt, sources).await
    }

    async fn retrieve_in(
        &self,
        run: &mut Run,
        index: &SimilarityIndex,
        query: &str,
    ) -> Result<Vec<SearchResult>> {
        run.advance(QueryStage::EmbeddingQuery);
        let vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(e) => return Err(run.fail(e)),
        };

        run.advance(QueryStage::Retrieving);
        let sources = index.query(&vector, self.top_k);
        debug!(request.id = %run.request_id, hits = sources.len(), "retrieved chunks");
        Ok(sources)
    }

    async fn complete_in(&self, run: &mut Run, query: &str, sources: &[SearchResult]) -> Result<GroundedAnswer> {
        let messages = self.assemble(query, sources);
        run.advance(QueryStage::PromptAssembled);

        match self.client.complete(&messages).await {
            Ok(answer) => {
                run.advance(QueryStage::Completed);
                info!(
                    request.id = %run.request_id,
                    model = self.client.model(),
                    sources = sources.len(),
                    answer_chars = answer.chars().count(),
                    "answered"
                );
                Ok(GroundedAnswer { answer, sources: sources.to_vec() })
            }
            Err(e) => Err(run.fail(e.into())),
        }
    }

    async fn complete_stream_in(
        &self,
        run: &mut Run,
        query: &str,
        sources: &[SearchResult],
    ) -> Result<GroundedStream> {
        let messages = self.assemble(query, sources);
        run.advance(QueryStage::PromptAssembled);

        match self.client.complete_stream(&messages).await {
            Ok(stream) => {
                run.advance(QueryStage::Completed);
                info!(
                    request.id = %run.request_id,
                    model = self.client.model(),
                    sources = sources.len(),
                    "streaming answer"
                );
                Ok(GroundedStream { stream: watch_stream(*run, stream), sources: sources.to_vec() })
            }
            Err(e) => Err(run.fail(e.into())),
        }
    }
}

/// Log the first mid-stream error as a failure of `run`.
fn watch_stream(mut run: Run, stream: sherlock_model::CompletionStream) -> AnswerStream {
    Box::pin(stream.map(move |fragment| match fragment {
        Ok(text) => Ok(text),
        Err(e) if run.stage == QueryStage::Failed => Err(e.into()),
        Err(e) => Err(run.fail(e.into())),
    }))
}

impl fmt::Debug for RetrievalAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalAssembler")
            .field("embedder", &self.embedder.name())
            .field("model", &self.client.model())
            .field("template", &self.template)
            .field("top_k", &self.top_k)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use sherlock_model::{CompletionStream, MockCompletionClient, ModelError, Role};

    use super::*;
    use crate::document::Document;
    use crate::prompt::Persona;
    use crate::{Chunker, FixedSizeChunker, HashingEmbedder, embed_chunks};

    struct Offline;

    #[async_trait]
    impl EmbeddingProvider for Offline {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::EmbeddingUnavailable { provider: "offline".into(), message: "no network".into() })
        }

        fn dimensions(&self) -> usize {
            8
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    async fn index_of(texts: &[&str]) -> SimilarityIndex {
        let chunker = FixedSizeChunker::new(200, 0).unwrap();
        let chunks: Vec<_> =
            texts.iter().flat_map(|t| chunker.chunk(&Document::new("deduction.txt", *t))).collect();
        let vectors = embed_chunks(&HashingEmbedder::default(), &chunks).await.unwrap();
        SimilarityIndex::build(chunks, vectors).unwrap()
    }

    #[tokio::test]
    async fn answer_grounds_prompt_on_retrieved_chunks() {
        let index = index_of(&["Violins are played by the detective.", "Tobacco is kept in a slipper."]).await;
        let client = Arc::new(MockCompletionClient::new("In a Persian slipper."));
        let assembler = RetrievalAssembler::new(
            Arc::new(HashingEmbedder::default()),
            client.clone(),
            PromptTemplate::answer(Persona::Sherlock),
            1,
        )
        .unwrap();

        let grounded = assembler.answer(&index, "Where is the tobacco kept?").await.unwrap();
        assert_eq!(grounded.answer, "In a Persian slipper.");
        assert_eq!(grounded.sources.len(), 1);
        assert!(grounded.sources[0].chunk.text.contains("Tobacco"));

        let request = client.last_request().unwrap();
        assert_eq!(request[0].role, Role::System);
        assert!(request[1].content.contains("Tobacco is kept in a slipper."));
        assert!(request[1].content.contains("Question: Where is the tobacco kept?"));
    }

    #[tokio::test]
    async fn embedding_failure_skips_completion() {
        let client = Arc::new(MockCompletionClient::new("unused"));
        let assembler =
            RetrievalAssembler::new(Arc::new(Offline), client.clone(), PromptTemplate::default(), 3).unwrap();
        let err = assembler.answer(&SimilarityIndex::empty(), "anything").await.unwrap_err();
        assert_eq!(err.stage(), "embedding");
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn completion_failure_leaves_sources_for_retry() {
        let index = index_of(&["The dog did nothing in the night-time."]).await;
        let client = Arc::new(MockCompletionClient::failing("503 from upstream"));
        let assembler = RetrievalAssembler::new(
            Arc::new(HashingEmbedder::default()),
            client.clone(),
            PromptTemplate::default(),
            2,
        )
        .unwrap();

        let sources = assembler.retrieve(&index, "What did the dog do?").await.unwrap();
        let err = assembler.complete("What did the dog do?", &sources).await.unwrap_err();
        assert!(matches!(err, RagError::CompletionUnavailable(_)));

        client.reply_with("That was the curious incident.");
        let retried = assembler.complete("What did the dog do?", &sources).await.unwrap();
        assert_eq!(retried.answer, "That was the curious incident.");
        assert_eq!(retried.sources, sources);
    }

    #[tokio::test]
    async fn streamed_answer_reassembles() {
        let index = index_of(&["Elementary."]).await;
        let assembler = RetrievalAssembler::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(MockCompletionClient::new("It is quite elementary.")),
            PromptTemplate::default(),
            3,
        )
        .unwrap();

        let grounded = assembler.answer_stream(&index, "elementary?").await.unwrap();
        assert_eq!(grounded.sources.len(), 1);
        let fragments: Vec<String> =
            grounded.stream.map(|f| f.unwrap()).collect::<Vec<_>>().await;
        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), "It is quite elementary.");
    }

    /// Streams one fragment, then breaks.
    struct Interrupted;

    #[async_trait]
    impl CompletionClient for Interrupted {
        fn model(&self) -> &str {
            "interrupted"
        }

        async fn complete(&self, _messages: &[ChatMessage]) -> sherlock_model::Result<String> {
            Err(ModelError::Unavailable("unused".into()))
        }

        async fn complete_stream(&self, _messages: &[ChatMessage]) -> sherlock_model::Result<CompletionStream> {
            Ok(Box::pin(futures::stream::iter(vec![
                Ok("Data! Data! ".to_string()),
                Err(ModelError::Stream("connection reset".into())),
                Err(ModelError::Stream("connection reset".into())),
            ])))
        }
    }

    #[tokio::test]
    async fn mid_stream_failure_is_logged_once_under_the_request() {
        let (events, _guard) = sherlock_telemetry::memory::capture();
        let index = index_of(&["I cannot make bricks without clay."]).await;
        let assembler = RetrievalAssembler::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(Interrupted),
            PromptTemplate::default(),
            1,
        )
        .unwrap();

        let grounded = assembler.answer_stream(&index, "bricks?").await.unwrap();
        let fragments: Vec<Result<String>> = grounded.stream.collect().await;
        assert_eq!(fragments[0].as_deref().unwrap(), "Data! Data! ");
        assert!(matches!(fragments[1], Err(RagError::CompletionUnavailable(_))));
        assert!(matches!(fragments[2], Err(RagError::CompletionUnavailable(_))));

        let all = events.all();
        let request_id = &all.iter().find(|e| e.message == "streaming answer").unwrap().fields["request.id"];
        let failures: Vec<_> = all.iter().filter(|e| e.message == "query failed").collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(&failures[0].fields["request.id"], request_id);
        assert!(all.iter().any(|e| {
            e.message == "query stage" && e.fields["to"] == "failed" && &e.fields["request.id"] == request_id
        }));
    }

    #[test]
    fn zero_top_k_rejected() {
        let result = RetrievalAssembler::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(MockCompletionClient::new("")),
            PromptTemplate::default(),
            0,
        );
        assert!(matches!(result, Err(RagError::InvalidConfiguration(_))));
    }
}
