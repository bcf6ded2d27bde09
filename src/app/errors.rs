use crate::{analysis::AnalysisError, embeddings::EmbeddingError, search::SearchError};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("song not found")]
    NotFound,

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("embedding provider unavailable: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("song analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("song store unavailable: {0:#}")]
    Store(anyhow::Error),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
