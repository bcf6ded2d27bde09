use crate::eid::Eid;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Instant,
};

/// Default for language fields the analysis did not fill in.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Free-form content flags reported by the analysis, persisted as a JSON object.
pub type Flags = serde_json::Map<String, serde_json::Value>;

/// Embedding as found in the record store.
///
/// Only `Vector` takes part in ranking. `Malformed` keeps the raw persisted text
/// so that rewriting the store never loses it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StoredEmbedding {
    #[default]
    Absent,
    Vector(Vec<f32>),
    Malformed { raw: String, reason: String },
}

impl StoredEmbedding {
    /// Parse the persisted form (a JSON array of numbers, empty for absent).
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return StoredEmbedding::Absent;
        }

        let malformed = |reason: String| StoredEmbedding::Malformed {
            raw: raw.to_string(),
            reason,
        };

        match serde_json::from_str::<Vec<f32>>(trimmed) {
            Ok(values) if values.is_empty() => malformed("empty vector".to_string()),
            Ok(values) if values.iter().any(|v| !v.is_finite()) => {
                malformed("non-finite component".to_string())
            }
            Ok(values) => StoredEmbedding::Vector(values),
            Err(err) => malformed(err.to_string()),
        }
    }

    /// Persisted form, inverse of [`StoredEmbedding::parse`].
    pub fn to_persisted(&self) -> anyhow::Result<String> {
        Ok(match self {
            StoredEmbedding::Absent => String::new(),
            StoredEmbedding::Vector(values) => serde_json::to_string(values)?,
            StoredEmbedding::Malformed { raw, .. } => raw.clone(),
        })
    }

    #[cfg(test)]
    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            StoredEmbedding::Vector(values) => Some(values),
            _ => None,
        }
    }
}

impl From<Option<Vec<f32>>> for StoredEmbedding {
    fn from(value: Option<Vec<f32>>) -> Self {
        match value {
            Some(values) => StoredEmbedding::Vector(values),
            None => StoredEmbedding::Absent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    pub id: Eid,

    pub filename: String,
    pub source_url: String,
    pub storage_path: String,

    pub language: String,
    pub language_code: String,
    pub summary: String,
    pub explicit: bool,

    pub keywords: Vec<String>,
    pub moods: Vec<String>,
    pub themes: Vec<String>,
    pub flags: Flags,

    #[serde(skip)]
    pub embedding: StoredEmbedding,

    pub created_at: DateTime<Utc>,
}

impl PartialEq for SongRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl SongRecord {
    /// Reference clients use to stream the audio.
    pub fn audio_url(&self) -> String {
        format!("/songs/{}/audio", self.id)
    }

    /// Case-insensitive containment over the summary and the serialized tag lists.
    ///
    /// `needle` must already be lowercased.
    pub fn contains_lowercase(&self, needle: &str) -> bool {
        if self.summary.to_lowercase().contains(needle) {
            return true;
        }

        [&self.keywords, &self.moods, &self.themes]
            .into_iter()
            .any(|list| serialize_list(list).to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SongCreate {
    pub filename: String,
    pub source_url: String,
    pub storage_path: String,

    pub language: String,
    pub language_code: String,
    pub summary: String,
    pub explicit: bool,

    pub keywords: Vec<String>,
    pub moods: Vec<String>,
    pub themes: Vec<String>,
    #[serde(default)]
    pub flags: Flags,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Record store. Records are append-only: there is no update and no delete.
pub trait SongStore: Send + Sync {
    /// Atomically add a complete record; assigns `id` and `created_at`.
    fn insert(&self, song: SongCreate) -> anyhow::Result<SongRecord>;
    fn get(&self, id: &Eid) -> anyhow::Result<Option<SongRecord>>;
    /// Every record with its embedding, in insertion order.
    fn fetch_all_with_embeddings(&self) -> anyhow::Result<Vec<SongRecord>>;
    /// Newest first.
    fn fetch_recent(&self, limit: usize) -> anyhow::Result<Vec<SongRecord>>;
    /// Case-insensitive containment match, newest first.
    fn fetch_by_substring(&self, term: &str) -> anyhow::Result<Vec<SongRecord>>;
    fn total(&self) -> anyhow::Result<usize>;
}

/// Order records (given in insertion order) newest first.
/// Records sharing a timestamp keep "later inserted comes first".
pub fn sort_newest_first(records: &mut Vec<SongRecord>) {
    records.reverse();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn serialize_list(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_default()
}

/// Empty or unreadable cells become an empty object.
fn parse_flags(raw: &str) -> Flags {
    let raw = raw.trim();
    if raw.is_empty() {
        return Flags::new();
    }

    serde_json::from_str::<Flags>(raw).unwrap_or_else(|err| {
        log::warn!("ignoring unreadable flags {raw:?}: {err}");
        Flags::new()
    })
}

fn parse_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return vec![];
    }

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) => list,
        Err(_) => vec![raw.to_string()],
    }
}

#[derive(Debug, Clone)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<SongRecord>>>,
    path: PathBuf,
}

const CSV_HEADERS: [&str; 14] = [
    "id",
    "created_at",
    "filename",
    "source_url",
    "storage_path",
    "language",
    "language_code",
    "summary",
    "explicit",
    "keywords",
    "moods",
    "themes",
    "flags",
    "embedding",
];

impl BackendCsv {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new song database at {}", path.display());
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut songs = vec![];
        for (line, record) in csv_reader.records().enumerate() {
            let record = record?;
            let song = Self::parse_record(&record)
                .with_context(|| format!("malformed song row #{}", line + 1))?;

            if let StoredEmbedding::Malformed { reason, .. } = &song.embedding {
                log::warn!("song {} has a malformed embedding: {reason}", song.id);
            }

            songs.push(song);
        }

        log::debug!(
            "took {}ms to read {} songs",
            now.elapsed().as_micros() as f64 / 1000.0,
            songs.len()
        );

        Ok(BackendCsv {
            list: Arc::new(RwLock::new(songs)),
            path: path.to_path_buf(),
        })
    }

    fn parse_record(record: &csv::StringRecord) -> anyhow::Result<SongRecord> {
        let field = |idx: usize| {
            record
                .get(idx)
                .ok_or_else(|| anyhow!("couldnt get column {}", CSV_HEADERS[idx]))
        };

        let created_at = DateTime::parse_from_rfc3339(field(1)?)
            .context("invalid created_at")?
            .with_timezone(&Utc);

        let non_empty_or_unknown = |value: &str| {
            if value.is_empty() {
                UNKNOWN_LANGUAGE.to_string()
            } else {
                value.to_string()
            }
        };

        Ok(SongRecord {
            id: Eid::from(field(0)?),
            created_at,
            filename: field(2)?.to_string(),
            source_url: field(3)?.to_string(),
            storage_path: field(4)?.to_string(),
            language: non_empty_or_unknown(field(5)?),
            language_code: non_empty_or_unknown(field(6)?),
            summary: field(7)?.to_string(),
            explicit: field(8)?.trim().eq_ignore_ascii_case("true"),
            keywords: parse_list(field(9)?),
            moods: parse_list(field(10)?),
            themes: parse_list(field(11)?),
            flags: parse_flags(field(12)?),
            embedding: StoredEmbedding::parse(field(13)?),
        })
    }

    fn save(&self, songs: &[SongRecord]) -> anyhow::Result<()> {
        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push("-tmp");
        let temp_path = PathBuf::from(temp_path);

        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(CSV_HEADERS)?;
        for song in songs {
            let created_at = song.created_at.to_rfc3339();
            let keywords = serialize_list(&song.keywords);
            let moods = serialize_list(&song.moods);
            let themes = serialize_list(&song.themes);
            let flags = serde_json::to_string(&song.flags)?;
            let embedding = song.embedding.to_persisted()?;

            csv_wrt.write_record([
                song.id.as_str(),
                created_at.as_str(),
                song.filename.as_str(),
                song.source_url.as_str(),
                song.storage_path.as_str(),
                song.language.as_str(),
                song.language_code.as_str(),
                song.summary.as_str(),
                if song.explicit { "true" } else { "false" },
                keywords.as_str(),
                moods.as_str(),
                themes.as_str(),
                flags.as_str(),
                embedding.as_str(),
            ])?;
        }
        csv_wrt.flush()?;
        drop(csv_wrt);

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn read_list(&self) -> anyhow::Result<std::sync::RwLockReadGuard<'_, Vec<SongRecord>>> {
        self.list
            .read()
            .map_err(|_| anyhow!("song list lock poisoned"))
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SongStore for BackendCsv {
    fn insert(&self, song: SongCreate) -> anyhow::Result<SongRecord> {
        let mut songs = self
            .list
            .write()
            .map_err(|_| anyhow!("song list lock poisoned"))?;

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

        songs.push(record.clone());

        // readers only ever see the list with or without the complete record
        if let Err(err) = self.save(&songs) {
            songs.pop();
            return Err(err.context("failed to persist song"));
        }

        Ok(record)
    }

    fn get(&self, id: &Eid) -> anyhow::Result<Option<SongRecord>> {
        Ok(self.read_list()?.iter().find(|s| &s.id == id).cloned())
    }

    fn fetch_all_with_embeddings(&self) -> anyhow::Result<Vec<SongRecord>> {
        Ok(self.read_list()?.clone())
    }

    fn fetch_recent(&self, limit: usize) -> anyhow::Result<Vec<SongRecord>> {
        let mut songs = self.read_list()?.clone();
        sort_newest_first(&mut songs);
        songs.truncate(limit);
        Ok(songs)
    }

    fn fetch_by_substring(&self, term: &str) -> anyhow::Result<Vec<SongRecord>> {
        let needle = term.to_lowercase();
        let mut songs = self
            .read_list()?
            .iter()
            .filter(|song| song.contains_lowercase(&needle))
            .cloned()
            .collect::<Vec<_>>();
        sort_newest_first(&mut songs);
        Ok(songs)
    }

    fn total(&self) -> anyhow::Result<usize> {
        Ok(self.read_list()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedding_vector() {
        let parsed = StoredEmbedding::parse("[0.5, -1, 2.25]");
        assert_eq!(parsed, StoredEmbedding::Vector(vec![0.5, -1.0, 2.25]));
        assert_eq!(parsed.as_vector(), Some(&[0.5, -1.0, 2.25][..]));
    }

    #[test]
    fn test_parse_embedding_absent() {
        assert_eq!(StoredEmbedding::parse(""), StoredEmbedding::Absent);
        assert_eq!(StoredEmbedding::parse("  "), StoredEmbedding::Absent);
        assert_eq!(StoredEmbedding::parse("null"), StoredEmbedding::Absent);
    }

    #[test]
    fn test_parse_embedding_malformed() {
        for raw in ["[0.1, \"x\"]", "{\"values\": []}", "[]", "[1e39]", "0.1,0.2"] {
            let parsed = StoredEmbedding::parse(raw);
            assert!(
                matches!(parsed, StoredEmbedding::Malformed { .. }),
                "{raw} should be malformed, got {parsed:?}"
            );
            assert_eq!(parsed.as_vector(), None);
            assert_eq!(parsed.to_persisted().unwrap(), raw);
        }
    }

    #[test]
    fn test_parse_flags() {
        assert!(parse_flags("").is_empty());
        assert!(parse_flags("not json").is_empty());
        assert!(parse_flags("[1, 2]").is_empty());

        let flags = parse_flags(r#"{"violence": true, "drugs": false}"#);
        assert_eq!(flags.get("violence"), Some(&serde_json::Value::Bool(true)));
        assert_eq!(flags.len(), 2);
    }

    #[test]
    fn test_parse_list_accepts_scalars() {
        assert_eq!(parse_list(""), Vec::<String>::new());
        assert_eq!(parse_list("[\"love\",\"loss\"]"), vec!["love", "loss"]);
        assert_eq!(parse_list("love"), vec!["love"]);
    }

    #[test]
    fn test_contains_lowercase_checks_every_text_field() {
        let song = SongRecord {
            id: Eid::from("1"),
            filename: "Track.mp3".into(),
            source_url: String::new(),
            storage_path: String::new(),
            language: UNKNOWN_LANGUAGE.into(),
            language_code: UNKNOWN_LANGUAGE.into(),
            summary: "A Song About Rain".into(),
            explicit: false,
            keywords: vec!["Storm".into()],
            moods: vec!["Melancholic".into()],
            themes: vec!["Heartbreak".into()],
            flags: Flags::new(),
            embedding: StoredEmbedding::Absent,
            created_at: Utc::now(),
        };

        assert!(song.contains_lowercase("about rain"));
        assert!(song.contains_lowercase("storm"));
        assert!(song.contains_lowercase("melanch"));
        assert!(song.contains_lowercase("heartbreak"));
        assert!(!song.contains_lowercase("track"));
    }
}
