//! In-memory collaborators shared by the app, search and web tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, RwLock,
    },
};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::{
    analysis::{AnalysisError, FileHost, SongAnalyzer},
    app::AppLocal,
    config::Config,
    eid::Eid,
    embeddings::{EmbeddingError, EmbeddingProvider},
    songs::{self, BackendCsv, SongCreate, SongRecord, SongStore, StoredEmbedding},
    storage,
};

/// Embeds known texts to fixed vectors and everything else to `fallback`.
pub struct FakeEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    fallback: Vec<f32>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            fallback,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn with(self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.lock().unwrap().insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EmbeddingProvider for FakeEmbedder {
    fn name(&self) -> &str {
        "fake"
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.fallback.len())
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::EmbeddingFailed("provider is down".to_string()));
        }

        Ok(self
            .vectors
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Store backed by a plain vector, able to hold records `BackendCsv` never writes.
#[derive(Default)]
pub struct MemoryStore {
    songs: RwLock<Vec<SongRecord>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn push(&self, song: SongRecord) {
        self.songs.write().unwrap().push(song);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn songs(&self) -> anyhow::Result<Vec<SongRecord>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.songs.read().unwrap().clone())
    }
}

impl SongStore for MemoryStore {
    fn insert(&self, song: SongCreate) -> anyhow::Result<SongRecord> {
        self.songs()?;

        let record = SongRecord {
            id: Eid::new(),
            filename: song.filename,
            source_url: song.source_url,
            storage_path: song.storage_path,
            language: song.language,
            language_code: song.language_code,
            summary: song.summary,
            explicit: song.explicit,
            keywords: song.keywords,
            moods: song.moods,
            themes: song.themes,
            flags: song.flags,
            embedding: song.embedding.into(),
            created_at: Utc::now(),
        };
        self.push(record.clone());
        Ok(record)
    }

    fn get(&self, id: &Eid) -> anyhow::Result<Option<SongRecord>> {
        Ok(self.songs()?.into_iter().find(|s| &s.id == id))
    }

    fn fetch_all_with_embeddings(&self) -> anyhow::Result<Vec<SongRecord>> {
        self.songs()
    }

    fn fetch_recent(&self, limit: usize) -> anyhow::Result<Vec<SongRecord>> {
        let mut songs = self.songs()?;
        songs::sort_newest_first(&mut songs);
        songs.truncate(limit);
        Ok(songs)
    }

    fn fetch_by_substring(&self, term: &str) -> anyhow::Result<Vec<SongRecord>> {
        let needle = term.to_lowercase();
        let mut songs = self
            .songs()?
            .into_iter()
            .filter(|song| song.contains_lowercase(&needle))
            .collect::<Vec<_>>();
        songs::sort_newest_first(&mut songs);
        Ok(songs)
    }

    fn total(&self) -> anyhow::Result<usize> {
        Ok(self.songs()?.len())
    }
}

/// A record created `age_minutes` ago.
pub fn song(id: &str, summary: &str, embedding: StoredEmbedding, age_minutes: i64) -> SongRecord {
    SongRecord {
        id: Eid::from(id),
        filename: format!("{id}.mp3"),
        source_url: format!("https://files.catbox.moe/{id}.mp3"),
        storage_path: format!("{id}.mp3"),
        language: "English".to_string(),
        language_code: "en".to_string(),
        summary: summary.to_string(),
        explicit: false,
        keywords: vec![],
        moods: vec![],
        themes: vec![],
        flags: songs::Flags::new(),
        embedding,
        created_at: created_ago(age_minutes),
    }
}

pub fn created_ago(age_minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(age_minutes)
}

pub fn vector(values: &[f32]) -> StoredEmbedding {
    StoredEmbedding::Vector(values.to_vec())
}

pub struct FakeHost {
    pub calls: AtomicUsize,
    pub failing: bool,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: false,
        }
    }
}

impl FileHost for FakeHost {
    fn publish(&self, filename: &str, _data: &[u8]) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing {
            return Err(AnalysisError::Status {
                service: "catbox",
                status: 500,
                body: "internal error".to_string(),
            });
        }

        Ok(format!("https://files.catbox.moe/{filename}"))
    }
}

/// Returns a canned payload, or fails when there is none.
pub struct FakeAnalyzer {
    pub payload: Option<Value>,
}

impl FakeAnalyzer {
    pub fn returning(payload: Value) -> Self {
        Self {
            payload: Some(payload),
        }
    }

    pub fn failing() -> Self {
        Self { payload: None }
    }
}

impl SongAnalyzer for FakeAnalyzer {
    fn analyze(&self, _source_url: &str) -> Result<Value, AnalysisError> {
        self.payload.clone().ok_or(AnalysisError::Timeout {
            service: "sonoteller",
            secs: 120,
        })
    }
}

pub fn rain_analysis() -> Value {
    json!({
        "language": "English",
        "language-iso": "en",
        "summary": "A quiet song about rain",
        "explicit": false,
        "keywords": {"1": "rain", "2": "window"},
        "ddex moods": ["Melancholic"],
        "ddex themes": ["Solitude"],
        "flags": {"violence": false}
    })
}

/// Text the upload flow embeds for [`rain_analysis`].
pub const RAIN_EMBEDDING_TEXT: &str = "A quiet song about rain rain window Melancholic Solitude";

/// Minimal ID3 tagged mp3 header, sniffed as audio/mpeg.
pub fn mp3_bytes() -> Vec<u8> {
    let mut data = b"ID3\x03\x00\x00\x00\x00\x00\x00".to_vec();
    data.extend(std::iter::repeat(0u8).take(256));
    data
}

pub struct TestApp {
    pub app: Arc<AppLocal>,
    pub store: Arc<BackendCsv>,
    pub audio: Arc<storage::BackendLocal>,
    pub embedder: Arc<FakeEmbedder>,
    pub host: Arc<FakeHost>,
    pub tmp: tempfile::TempDir,
}

/// Creates an isolated AppLocal on a unique temp directory.
pub fn create_app(
    config: Config,
    embedder: FakeEmbedder,
    host: FakeHost,
    analyzer: FakeAnalyzer,
) -> TestApp {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");

    let store = Arc::new(
        BackendCsv::load(tmp.path().join("songs.csv")).expect("failed to create song csv"),
    );
    let audio = Arc::new(
        storage::BackendLocal::new(tmp.path().join("audio")).expect("failed to create storage"),
    );
    let embedder = Arc::new(embedder);
    let host = Arc::new(host);

    let app = Arc::new(AppLocal::new(
        config,
        store.clone(),
        audio.clone(),
        embedder.clone(),
        host.clone(),
        Arc::new(analyzer),
    ));

    TestApp {
        app,
        store,
        audio,
        embedder,
        host,
        tmp,
    }
}

pub struct StoreApp {
    pub app: Arc<AppLocal>,
    pub audio: Arc<storage::BackendLocal>,
    pub tmp: tempfile::TempDir,
}

/// Working collaborators over `store`, for exercising store failures.
pub fn app_on_store(store: Arc<dyn SongStore>) -> StoreApp {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let audio = Arc::new(
        storage::BackendLocal::new(tmp.path().join("audio")).expect("failed to create storage"),
    );

    let app = Arc::new(AppLocal::new(
        Config::default(),
        store,
        audio.clone(),
        Arc::new(FakeEmbedder::new(vec![1.0, 0.0])),
        Arc::new(FakeHost::new()),
        Arc::new(FakeAnalyzer::returning(rain_analysis())),
    ));

    StoreApp { app, audio, tmp }
}

/// App with a working analyzer and an embedder that knows the rain song.
pub fn default_app() -> TestApp {
    create_app(
        Config::default(),
        FakeEmbedder::new(vec![0.0, 0.0, 1.0, 0.0])
            .with(RAIN_EMBEDDING_TEXT, vec![1.0, 0.0, 0.0, 0.0])
            .with("rainy day", vec![0.9, 0.1, 0.0, 0.0]),
        FakeHost::new(),
        FakeAnalyzer::returning(rain_analysis()),
    )
}
