use crate::{
    analysis::{self, FileHost, SongAnalyzer},
    config::Config,
    eid::Eid,
    embeddings::EmbeddingProvider,
    search::{MatchResult, SongSearch},
    songs::{SongCreate, SongRecord, SongStore},
    storage::StorageManager,
};

use std::{path::Path, sync::Arc};

use super::{backend::*, errors::AppError};

/// Upper bound for listing requests.
const MAX_LISTING_LIMIT: usize = 500;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Everything a request needs, constructed once at startup and shared.
pub struct AppLocal {
    pub song_mgr: Arc<dyn SongStore>,
    pub storage_mgr: Arc<dyn StorageManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    file_host: Arc<dyn FileHost>,
    analyzer: Arc<dyn SongAnalyzer>,
    search: SongSearch,
    config: Config,
}

impl AppLocal {
    pub fn new(
        config: Config,
        song_mgr: Arc<dyn SongStore>,
        storage_mgr: Arc<dyn StorageManager>,
        embedder: Arc<dyn EmbeddingProvider>,
        file_host: Arc<dyn FileHost>,
        analyzer: Arc<dyn SongAnalyzer>,
    ) -> Self {
        let search = SongSearch::new(
            song_mgr.clone(),
            embedder.clone(),
            config.search.page_size,
        );

        Self {
            song_mgr,
            storage_mgr,
            embedder,
            file_host,
            analyzer,
            search,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reject anything that is empty, too large or not audio.
    fn validate_upload(&self, upload: &SongUpload) -> Result<(), AppError> {
        if upload.data.is_empty() {
            return Err(AppError::InvalidUpload("no file uploaded".to_string()));
        }

        let max = self.config.server.max_upload_bytes;
        if upload.data.len() > max {
            return Err(AppError::InvalidUpload(format!(
                "file is {} bytes, the limit is {max} bytes",
                upload.data.len()
            )));
        }

        let declared_audio = upload
            .content_type
            .as_deref()
            .map(|ct| ct.trim().to_lowercase().starts_with("audio/"))
            .unwrap_or(false);

        let is_audio = match infer::get(&upload.data) {
            Some(kind) if kind.matcher_type() == infer::MatcherType::Audio => true,
            // mp4 audio sniffs as video, trust the client there
            Some(kind) if kind.matcher_type() == infer::MatcherType::Video => declared_audio,
            Some(_) => false,
            None => declared_audio,
        };

        if !is_audio {
            return Err(AppError::InvalidUpload(
                "only audio files are allowed".to_string(),
            ));
        }

        Ok(())
    }

    /// Analyse the published file, embed the result and insert the record.
    fn ingest(
        &self,
        upload: &SongUpload,
        storage_path: &str,
    ) -> Result<UploadReport, AppError> {
        let source_url = self.file_host.publish(&upload.filename, &upload.data)?;

        let details = self.analyzer.analyze(&source_url)?;
        let analysis = analysis::normalize_analysis(&details);

        let embedding = match analysis::embedding_text(&analysis) {
            Some(text) => Some(self.embedder.embed(&text)?),
            None => {
                log::warn!(
                    "analysis of {} has no text to embed, storing without embedding",
                    upload.filename
                );
                None
            }
        };

        let song = self
            .song_mgr
            .insert(SongCreate {
                filename: upload.filename.clone(),
                source_url,
                storage_path: storage_path.to_string(),
                language: analysis.language,
                language_code: analysis.language_code,
                summary: analysis.summary,
                explicit: analysis.explicit,
                keywords: analysis.keywords,
                moods: analysis.moods,
                themes: analysis.themes,
                flags: analysis.flags,
                embedding,
            })
            .map_err(AppError::Store)?;

        Ok(UploadReport { song, details })
    }
}

/// Flat, filesystem-safe version of a client supplied file name.
pub fn storage_file_name(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    let cleaned = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    let cleaned = cleaned.trim_start_matches('.');
    let cleaned = if cleaned.is_empty() { "upload" } else { cleaned };

    format!("{}-{}", Eid::new(), cleaned)
}

impl AppBackend for AppLocal {
    fn search(&self, query: &str) -> Result<Vec<MatchResult>, AppError> {
        Ok(self.search.search(query)?)
    }

    fn upload(&self, upload: SongUpload) -> Result<UploadReport, AppError> {
        log::debug!("upload: {upload:?}");
        self.validate_upload(&upload)?;

        let storage_path = storage_file_name(&upload.filename);
        self.storage_mgr.write(&storage_path, &upload.data)?;
        log::info!("file stored locally as {storage_path}");

        match self.ingest(&upload, &storage_path) {
            Ok(report) => {
                log::info!("song {} stored ({})", report.song.id, report.song.filename);
                Ok(report)
            }
            Err(err) => {
                log::error!("processing {} failed: {err}", upload.filename);
                if let Err(cleanup_err) = self.storage_mgr.delete(&storage_path) {
                    log::warn!("couldnt remove {storage_path}: {cleanup_err}");
                }
                Err(err)
            }
        }
    }

    fn recent(&self, limit: Option<usize>) -> Result<Vec<SongRecord>, AppError> {
        let limit = limit
            .unwrap_or(self.search.page_size())
            .clamp(1, MAX_LISTING_LIMIT);

        Ok(self.search.recent_songs(limit)?)
    }

    fn get(&self, id: &Eid) -> Result<SongRecord, AppError> {
        self.song_mgr
            .get(id)
            .map_err(AppError::Store)?
            .ok_or(AppError::NotFound)
    }

    fn audio(&self, id: &Eid) -> Result<SongAudio, AppError> {
        let song = self.get(id)?;

        if !self.storage_mgr.exists(&song.storage_path) {
            log::warn!("audio for song {} is missing ({})", song.id, song.storage_path);
            return Err(AppError::NotFound);
        }

        let data = self.storage_mgr.read(&song.storage_path)?;
        let mime_type = infer::get(&data)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        Ok(SongAudio { data, mime_type })
    }

    fn total(&self) -> Result<usize, AppError> {
        self.song_mgr.total().map_err(AppError::Store)
    }
}
