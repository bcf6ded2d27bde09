//! Semantic song search.
//!
//! - `ranker`: exhaustive cosine similarity ranking over stored embeddings
//! - `orchestrator`: query embedding, threshold, substring and recency fallbacks
//!
//! Ranking is a full scan, O(N·D) per query over N songs of dimension D. There
//! is no index structure; this only holds up while the catalogue stays small.

mod orchestrator;
mod ranker;

use serde::{Deserialize, Serialize};

use crate::{eid::Eid, embeddings::EmbeddingError, songs::SongRecord};

pub use orchestrator::SongSearch;
pub use ranker::{cosine_similarity, rank, Ranked};

/// Semantic hits must score strictly above this.
pub const SEMANTIC_THRESHOLD: f32 = 0.5;

/// Synthetic score given to substring fallback hits.
pub const SUBSTRING_SCORE: f32 = 0.6;

/// Placeholder score given to "recent" fallback results.
pub const RECENT_SCORE: f32 = 0.5;

/// Default cap on results for every search path.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Cosine similarity against the query embedding.
    Semantic,
    /// Case-insensitive text containment; the score is synthetic.
    Substring,
    /// Newest songs, returned when nothing matched; the score is a placeholder.
    Recent,
}

/// Denormalized song metadata returned with search hits and listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongView {
    pub filename: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub moods: Vec<String>,
    pub themes: Vec<String>,
    pub language: String,
    pub explicit: bool,
    pub audio_url: String,
    pub source_url: String,
}

impl From<&SongRecord> for SongView {
    fn from(song: &SongRecord) -> Self {
        SongView {
            filename: song.filename.clone(),
            summary: song.summary.clone(),
            keywords: song.keywords.clone(),
            moods: song.moods.clone(),
            themes: song.themes.clone(),
            language: song.language.clone(),
            explicit: song.explicit,
            audio_url: song.audio_url(),
            source_url: song.source_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub song_id: Eid,
    pub similarity: f32,
    pub match_kind: MatchKind,
    pub song_data: SongView,
}

impl MatchResult {
    pub fn new(song: &SongRecord, similarity: f32, match_kind: MatchKind) -> Self {
        MatchResult {
            song_id: song.id.clone(),
            similarity,
            match_kind,
            song_data: song.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(#[from] EmbeddingError),

    #[error("song store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),

    /// Per-record problem; logged and skipped, never returned from a search.
    #[error("song {id} has a malformed embedding: {reason}")]
    MalformedEmbedding { id: Eid, reason: String },
}
