//! Search fallback policy.
//!
//! 1. empty query: go straight to recent songs
//! 2. semantic: embed the query, rank every stored embedding, keep score > 0.5
//! 3. substring: case-insensitive containment over summary and tag lists
//! 4. recent: newest songs
//!
//! Every path is capped at the page size and tags its results with a [`MatchKind`].

use std::sync::Arc;

use super::{
    rank, MatchKind, MatchResult, Ranked, SearchError, RECENT_SCORE, SEMANTIC_THRESHOLD,
    SUBSTRING_SCORE,
};
use crate::{
    embeddings::EmbeddingProvider,
    songs::{SongRecord, SongStore, StoredEmbedding},
};

pub struct SongSearch {
    store: Arc<dyn SongStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    page_size: usize,
}

impl SongSearch {
    pub fn new(
        store: Arc<dyn SongStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn search(&self, query: &str) -> Result<Vec<MatchResult>, SearchError> {
        let query = query.trim();

        if query.is_empty() {
            log::debug!("empty query, returning recent songs");
            return self.recent();
        }

        let results = self.semantic(query)?;
        if !results.is_empty() {
            log::info!("query {query:?}: {} semantic matches", results.len());
            return Ok(results);
        }

        let results = self.substring(query)?;
        if !results.is_empty() {
            log::info!("query {query:?}: {} substring matches", results.len());
            return Ok(results);
        }

        log::info!("query {query:?}: no matches, returning recent songs");
        self.recent()
    }

    fn semantic(&self, query: &str) -> Result<Vec<MatchResult>, SearchError> {
        let query_embedding = self.embedder.embed(query)?;

        let songs = self
            .store
            .fetch_all_with_embeddings()
            .map_err(SearchError::StoreUnavailable)?;

        let candidates = songs.iter().filter_map(|song| match &song.embedding {
            StoredEmbedding::Vector(values) => Some((song, values.as_slice())),
            StoredEmbedding::Absent => None,
            StoredEmbedding::Malformed { reason, .. } => {
                let err = SearchError::MalformedEmbedding {
                    id: song.id.clone(),
                    reason: reason.clone(),
                };
                log::warn!("skipping song: {err}");
                None
            }
        });

        let ranked = rank(&query_embedding, candidates);

        Ok(semantic_hits(ranked, self.page_size)
            .into_iter()
            .map(|hit| MatchResult::new(hit.id, hit.score, MatchKind::Semantic))
            .collect())
    }

    fn substring(&self, query: &str) -> Result<Vec<MatchResult>, SearchError> {
        let songs = self
            .store
            .fetch_by_substring(query)
            .map_err(SearchError::StoreUnavailable)?;

        Ok(songs
            .iter()
            .take(self.page_size)
            .map(|song| MatchResult::new(song, SUBSTRING_SCORE, MatchKind::Substring))
            .collect())
    }

    fn recent(&self) -> Result<Vec<MatchResult>, SearchError> {
        let songs = self
            .store
            .fetch_recent(self.page_size)
            .map_err(SearchError::StoreUnavailable)?;

        Ok(songs
            .iter()
            .take(self.page_size)
            .map(|song| MatchResult::new(song, RECENT_SCORE, MatchKind::Recent))
            .collect())
    }

    /// Newest songs as plain records.
    pub fn recent_songs(&self, limit: usize) -> Result<Vec<SongRecord>, SearchError> {
        self.store
            .fetch_recent(limit)
            .map_err(SearchError::StoreUnavailable)
    }
}

/// Keep ranked candidates strictly above the semantic threshold, up to `limit`.
fn semantic_hits<K>(ranked: Vec<Ranked<K>>, limit: usize) -> Vec<Ranked<K>> {
    ranked
        .into_iter()
        .filter(|hit| hit.score > SEMANTIC_THRESHOLD)
        .take(limit)
        .collect()
}
