use crate::{
    search::DEFAULT_PAGE_SIZE,
    storage::{self, StorageManager},
};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";

/// Default embedding model (768 dimensions)
const DEFAULT_EMBEDDING_MODEL: &str = "bge-base-en-v1.5";
const DEFAULT_GEMINI_MODEL: &str = "embedding-001";
const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 30;

const DEFAULT_SONOTELLER_URL: &str = "https://sonoteller-ai1.p.rapidapi.com/lyrics_ddex";
const DEFAULT_SONOTELLER_HOST: &str = "sonoteller-ai1.p.rapidapi.com";
const DEFAULT_FILE_HOST_URL: &str = "https://catbox.moe/user/api.php";
const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 120;

const DEFAULT_LISTEN: &str = "0.0.0.0:3000";
/// 15MB upload limit
const DEFAULT_MAX_UPLOAD_BYTES: usize = 15 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Fastembed,
    Gemini,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingBackend,

    /// fastembed model name (e.g., "bge-base-en-v1.5")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Timeout for remote embedding requests in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::default(),
            model: default_embedding_model(),
            gemini_model: default_gemini_model(),
            timeout_secs: DEFAULT_EMBEDDING_TIMEOUT_SECS,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    DEFAULT_EMBEDDING_TIMEOUT_SECS
}

/// Upstream services used while ingesting an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_sonoteller_url")]
    pub sonoteller_url: String,

    #[serde(default = "default_sonoteller_host")]
    pub sonoteller_host: String,

    /// Where uploads are published to obtain a public url for analysis
    #[serde(default = "default_file_host_url")]
    pub file_host_url: String,

    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sonoteller_url: default_sonoteller_url(),
            sonoteller_host: default_sonoteller_host(),
            file_host_url: default_file_host_url(),
            timeout_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
        }
    }
}

fn default_sonoteller_url() -> String {
    DEFAULT_SONOTELLER_URL.to_string()
}

fn default_sonoteller_host() -> String {
    DEFAULT_SONOTELLER_HOST.to_string()
}

fn default_file_host_url() -> String {
    DEFAULT_FILE_HOST_URL.to_string()
}

fn default_analysis_timeout_secs() -> u64 {
    DEFAULT_ANALYSIS_TIMEOUT_SECS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum number of results on every search path
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.search.page_size == 0 {
            bail!("search.page_size must be greater than 0");
        }

        if self.embeddings.model.trim().is_empty() {
            bail!("embeddings.model must not be empty");
        }

        if self.embeddings.timeout_secs == 0 {
            bail!("embeddings.timeout_secs must be greater than 0");
        }

        if self.analysis.timeout_secs == 0 {
            bail!("analysis.timeout_secs must be greater than 0");
        }

        for (name, value) in [
            ("analysis.sonoteller_url", &self.analysis.sonoteller_url),
            ("analysis.file_host_url", &self.analysis.file_host_url),
        ] {
            url::Url::parse(value).with_context(|| format!("{name} is not a valid url"))?;
        }

        if self.server.max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be greater than 0");
        }

        Ok(())
    }

    pub fn load_with(base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base_path = base_path.as_ref();
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(
                CONFIG_FILE,
                serde_yml::to_string(&Self::default())?.as_bytes(),
            )?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    #[cfg(test)]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
