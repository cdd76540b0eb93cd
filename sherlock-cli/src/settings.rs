//! Turning parsed arguments into clients and sessions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use sherlock_model::CompletionClient;
use sherlock_model::openai::{OpenAICompatibleClient, OpenAIConfig};
use sherlock_rag::openai::OpenAIEmbeddingProvider;
use sherlock_rag::{
    ChatMode, EmbeddingProvider, HashingEmbedder, PromptTemplate, RagConfig, StudySession, Upload, WebSearch,
};
use tracing::info;

use crate::cli::{EmbeddingBackend, ModelArgs, RagArgs, SearchArgs};

/// Build the completion client.
pub fn completion_client(args: &ModelArgs) -> Result<Arc<dyn CompletionClient>> {
    let Some(api_key) = args.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
        bail!("no API key: pass --api-key or set SHERLOCK_API_KEY");
    };
    let mut config = OpenAIConfig::compatible(api_key, &args.base_url, &args.model)
        .with_timeout(Duration::from_secs(args.timeout_secs));
    if let Some(temperature) = args.temperature {
        config = config.with_temperature(temperature);
    }
    if let Some(max_tokens) = args.max_tokens {
        config = config.with_max_tokens(max_tokens);
    }
    Ok(Arc::new(OpenAICompatibleClient::new(config)?))
}

/// Build the embedding provider.
pub fn embedder(args: &RagArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(match args.embeddings {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::default()),
        EmbeddingBackend::Openai => {
            let api_key = args.embeddings_api_key.clone().unwrap_or_default();
            let mut provider = OpenAIEmbeddingProvider::new(api_key)
                .context("--embeddings openai needs --embeddings-api-key or OPENAI_API_KEY")?;
            if let Some(base_url) = &args.embeddings_base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
        EmbeddingBackend::Local => local_embedder()?,
    })
}

#[cfg(feature = "local-embeddings")]
fn local_embedder() -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(sherlock_rag::local::LocalEmbeddingProvider::new()))
}

#[cfg(not(feature = "local-embeddings"))]
fn local_embedder() -> Result<Arc<dyn EmbeddingProvider>> {
    bail!("this build has no local embeddings; rebuild with --features local-embeddings")
}

/// Build the validated chunking and retrieval configuration.
pub fn rag_config(args: &RagArgs) -> Result<RagConfig> {
    Ok(RagConfig::builder()
        .chunk_size(args.chunk_size)
        .chunk_overlap(args.chunk_overlap)
        .top_k(args.top_k)
        .chunking(args.chunking.into())
        .build()?)
}

/// Build the web search provider for `--web`.
#[cfg(feature = "web-search")]
pub fn web_search(args: &SearchArgs) -> Result<Arc<dyn WebSearch>> {
    let (Some(key), Some(cx)) = (&args.google_api_key, &args.google_cse_id) else {
        bail!("--web needs --google-api-key and --google-cse-id (or GOOGLE_API_KEY and GOOGLE_CSE_ID)");
    };
    Ok(Arc::new(sherlock_rag::GoogleSearchClient::new(key, cx)?))
}

#[cfg(not(feature = "web-search"))]
pub fn web_search(_args: &SearchArgs) -> Result<Arc<dyn WebSearch>> {
    bail!("this build has no web search; rebuild with --features web-search")
}

/// Read every file as an upload. Stops at the first unreadable or
/// unsupported file.
pub fn uploads(files: &[PathBuf]) -> Result<Vec<Upload>> {
    files
        .iter()
        .map(|path| Upload::from_path(path).map_err(anyhow::Error::from))
        .collect()
}

/// Everything needed to start a session.
pub struct SessionParts {
    pub config: RagConfig,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub client: Arc<dyn CompletionClient>,
    pub web_search: Option<Arc<dyn WebSearch>>,
    pub web_results: usize,
}

impl SessionParts {
    /// Assemble the parts from the global arguments.
    pub fn from_args(model: &ModelArgs, rag: &RagArgs, search: &SearchArgs, web: bool) -> Result<Self> {
        Ok(Self {
            config: rag_config(rag)?,
            embedder: embedder(rag)?,
            client: completion_client(model)?,
            web_search: if web { Some(web_search(search)?) } else { None },
            web_results: search.web_results,
        })
    }

    /// Start a session and ingest `files`. With files the session starts in
    /// document mode, otherwise in general mode.
    pub async fn start(self, template: PromptTemplate, files: &[PathBuf]) -> Result<StudySession> {
        let mode = if files.is_empty() { ChatMode::General } else { ChatMode::Document };
        let mut builder = StudySession::builder()
            .config(self.config)
            .embedder(self.embedder)
            .client(self.client)
            .template(template)
            .mode(mode);
        if let Some(search) = self.web_search {
            builder = builder.web_search(search, self.web_results);
        }
        let mut session = builder.build()?;

        if !files.is_empty() {
            let report = session.ingest(uploads(files)?).await?;
            for document in &report.documents {
                info!(document = %document.name, chunks = document.chunks, chars = document.chars, "indexed");
            }
            eprintln!(
                "Indexed {} document(s) into {} chunk(s).",
                report.documents.len(),
                report.total_chunks()
            );
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["sherlock"];
        full.extend_from_slice(args);
        full.push("chat");
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn missing_api_key_is_reported() {
        let cli = parse(&["--api-key", "  "]);
        let err = completion_client(&cli.model).err().unwrap();
        assert!(err.to_string().contains("SHERLOCK_API_KEY"));
    }

    #[test]
    fn client_uses_model_settings() {
        let cli = parse(&["--api-key", "k", "--model", "falcon-mini", "--base-url", "http://localhost:9/v1"]);
        let client = completion_client(&cli.model).unwrap();
        assert_eq!(client.model(), "falcon-mini");
    }

    #[test]
    fn bad_temperature_is_rejected() {
        let cli = parse(&["--api-key", "k", "--temperature", "3.5"]);
        assert!(completion_client(&cli.model).is_err());
    }

    #[test]
    fn overlap_must_be_below_chunk_size() {
        let cli = parse(&["--chunk-size", "100", "--chunk-overlap", "100"]);
        let err = rag_config(&cli.rag).unwrap_err();
        assert!(err.downcast_ref::<sherlock_rag::RagError>().is_some());
    }

    #[test]
    fn openai_embeddings_need_a_key() {
        let mut cli = parse(&["--embeddings", "openai"]);
        cli.rag.embeddings_api_key = None;
        assert!(embedder(&cli.rag).is_err());
    }

    #[test]
    fn hashing_is_the_default_embedder() {
        let cli = parse(&[]);
        assert_eq!(embedder(&cli.rag).unwrap().name(), "hashing");
    }

    #[test]
    fn unsupported_file_stops_upload() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("notes.txt");
        std::fs::write(&good, "Some notes.").unwrap();
        let bad = dir.path().join("grades.csv");
        std::fs::write(&bad, "a,b").unwrap();

        assert_eq!(uploads(std::slice::from_ref(&good)).unwrap().len(), 1);
        let err = uploads(&[good, bad]).unwrap_err();
        let rag = err.downcast_ref::<sherlock_rag::RagError>().unwrap();
        assert_eq!(rag.stage(), "upload");
    }
}
