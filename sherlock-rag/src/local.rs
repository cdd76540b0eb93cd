//! Local sentence-transformer embeddings via `fastembed`.
//!
//! This module is only available when the `local-embeddings` feature is
//! enabled. The model (all-MiniLM-L6-v2) is loaded once per process on first
//! use and shared by every [`LocalEmbeddingProvider`]; it is never unloaded.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "local";

/// Dimensionality of all-MiniLM-L6-v2.
pub const LOCAL_DIMENSIONS: usize = 384;

static MODEL: OnceCell<Arc<TextEmbedding>> = OnceCell::const_new();

async fn shared_model() -> Result<Arc<TextEmbedding>> {
    MODEL
        .get_or_try_init(|| async {
            info!(model = "all-MiniLM-L6-v2", "loading local embedding model");
            let loaded = tokio::task::spawn_blocking(|| {
                let mut options = InitOptions::default();
                options.model_name = EmbeddingModel::AllMiniLML6V2;
                options.show_download_progress = false;
                TextEmbedding::try_new(options)
            })
            .await
            .map_err(|e| RagError::embedding(PROVIDER, format!("model loader panicked: {e}")))?;

            match loaded {
                Ok(model) => Ok(Arc::new(model)),
                Err(e) => {
                    error!(error = %e, "failed to load local embedding model");
                    Err(RagError::embedding(PROVIDER, format!("failed to load model: {e}")))
                }
            }
        })
        .await
        .cloned()
}

/// An [`EmbeddingProvider`] running all-MiniLM-L6-v2 in-process.
///
/// Construction is free; the model is loaded by the first embedding call of
/// any instance. Inference runs on the blocking thread pool.
#[derive(Debug, Clone, Default)]
pub struct LocalEmbeddingProvider;

impl LocalEmbeddingProvider {
    /// Create a provider handle.
    pub fn new() -> Self {
        Self
    }

    /// Load the shared model now instead of on first use.
    pub async fn warm_up(&self) -> Result<()> {
        shared_model().await.map(|_| ())
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(PROVIDER, "model returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = shared_model().await?;
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();

        tokio::task::spawn_blocking(move || model.embed(owned, None))
            .await
            .map_err(|e| RagError::embedding(PROVIDER, format!("inference task panicked: {e}")))?
            .map_err(|e| RagError::embedding(PROVIDER, format!("inference failed: {e}")))
    }

    fn dimensions(&self) -> usize {
        LOCAL_DIMENSIONS
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
