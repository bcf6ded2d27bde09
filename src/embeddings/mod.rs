//! Text embedding providers.
//!
//! The search core only sees [`EmbeddingProvider`]; which backend is used is a
//! configuration choice:
//!
//! - `fastembed`: local ONNX model (default `bge-base-en-v1.5`, 768 dims)
//! - `gemini`: Google `embedding-001` over HTTPS

mod gemini;
mod local;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingBackend, EmbeddingConfig};

pub use self::gemini::GeminiEmbedProvider;
pub use self::local::FastEmbedProvider;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(&'static str),
}

/// Turns text into a fixed-length vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Human readable identifier of the model in use.
    fn name(&self) -> &str;

    /// Output dimensionality, when known up front.
    fn dimensions(&self) -> Option<usize>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Build the provider selected in the configuration.
pub fn from_config(
    config: &EmbeddingConfig,
    base_path: &Path,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider {
        EmbeddingBackend::Fastembed => Ok(Arc::new(FastEmbedProvider::new(
            &config.model,
            base_path.to_path_buf(),
        )?)),
        EmbeddingBackend::Gemini => {
            let api_key = std::env::var(gemini::API_KEY_ENV)
                .ok()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .ok_or(EmbeddingError::MissingCredentials(gemini::API_KEY_ENV))?;

            Ok(Arc::new(GeminiEmbedProvider::new(
                &config.gemini_model,
                &api_key,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}
