use serde::Serialize;

use crate::{eid::Eid, search::MatchResult, songs::SongRecord};

use super::errors::AppError;

/// Operations the HTTP and CLI surfaces need.
pub trait AppBackend: Send + Sync {
    /// Ranked search with semantic, substring and recency fallbacks.
    fn search(&self, query: &str) -> Result<Vec<MatchResult>, AppError>;

    /// Store, analyse and embed a new song.
    fn upload(&self, upload: SongUpload) -> Result<UploadReport, AppError>;

    /// Newest songs; `None` means one page.
    fn recent(&self, limit: Option<usize>) -> Result<Vec<SongRecord>, AppError>;

    fn get(&self, id: &Eid) -> Result<SongRecord, AppError>;

    /// Stored audio bytes and their mime type.
    fn audio(&self, id: &Eid) -> Result<SongAudio, AppError>;

    fn total(&self) -> Result<usize, AppError>;
}

#[derive(Clone, Default)]
pub struct SongUpload {
    pub filename: String,
    pub data: Vec<u8>,
    /// Content type declared by the client, if any.
    pub content_type: Option<String>,
}

impl std::fmt::Debug for SongUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SongUpload {{ filename: {:?}, data: [{} bytes], content_type: {:?} }}",
            self.filename,
            self.data.len(),
            self.content_type
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub song: SongRecord,
    /// Raw analysis payload as returned upstream.
    pub details: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct SongAudio {
    pub data: Vec<u8>,
    pub mime_type: String,
}
