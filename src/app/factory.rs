use crate::{
    analysis::{AnalysisError, CatboxHost, SongAnalyzer, SonotellerAnalyzer},
    app::local::AppLocal,
    config::Config,
    embeddings,
    songs::BackendCsv,
    storage,
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::{path::PathBuf, sync::Arc};

const BASE_PATH_ENV: &str = "SOUNDWAVE_BASE_PATH";

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Create a local application instance
    pub fn create_local_app(paths: &AppPaths) -> Result<AppLocal> {
        let config = Config::load_with(&paths.base_path)?;

        let song_mgr = Arc::new(BackendCsv::load(&paths.songs_path)?);
        let storage_mgr = Arc::new(
            storage::BackendLocal::new(&paths.audio_path)
                .context("Failed to create audio directory")?,
        );

        let embedder = embeddings::from_config(&config.embeddings, &paths.base_path)
            .context("Failed to initialize embedding provider")?;
        match embedder.dimensions() {
            Some(dims) => log::info!("embedding provider: {} ({dims} dims)", embedder.name()),
            None => log::info!("embedding provider: {}", embedder.name()),
        }

        let file_host = Arc::new(CatboxHost::new(&config.analysis)?);
        let analyzer = Self::create_analyzer(&config)?;

        Ok(AppLocal::new(
            config,
            song_mgr,
            storage_mgr,
            embedder,
            file_host,
            analyzer,
        ))
    }

    /// Search works without analysis credentials, so a missing key only
    /// disables uploads.
    fn create_analyzer(config: &Config) -> Result<Arc<dyn SongAnalyzer>> {
        match SonotellerAnalyzer::from_env(&config.analysis) {
            Ok(analyzer) => Ok(Arc::new(analyzer)),
            Err(AnalysisError::MissingCredentials(var)) => {
                log::warn!("{var} is not set, uploads will fail until it is");
                Ok(Arc::new(UnconfiguredAnalyzer(var)))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Get application paths with validation
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;
        let songs_path = base_path.join("songs.csv");
        let audio_path = base_path.join("audio");

        // Ensure base directory exists
        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths {
            base_path,
            songs_path,
            audio_path,
        })
    }

    /// Get the base path for the application
    fn get_base_path() -> Result<PathBuf> {
        if let Some(base_path) = std::env::var_os(BASE_PATH_ENV) {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;

        Ok(home.join(".local/share/soundwave"))
    }
}

struct UnconfiguredAnalyzer(&'static str);

impl SongAnalyzer for UnconfiguredAnalyzer {
    fn analyze(&self, _source_url: &str) -> Result<serde_json::Value, AnalysisError> {
        Err(AnalysisError::MissingCredentials(self.0))
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
    pub songs_path: PathBuf,
    pub audio_path: PathBuf,
}
