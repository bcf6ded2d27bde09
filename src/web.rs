use crate::{
    app::{AppBackend, AppError, AppLocal, SongUpload},
    eid::Eid,
    search::{MatchResult, SearchError, SongView},
    songs::{Flags, SongRecord},
};
use axum::{
    extract::{rejection::QueryRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

/// Multipart field carrying the audio file.
const UPLOAD_FIELD: &str = "songFile";

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct SharedState {
    app: Arc<dyn AppBackend>,
}

pub fn router(app: Arc<dyn AppBackend>, max_upload_bytes: usize) -> Router {
    let shared_state = Arc::new(SharedState { app });

    Router::new()
        .route("/search", get(search))
        .route("/upload", post(upload))
        .route("/songs", get(list_songs))
        .route("/songs/:id", get(get_song))
        .route("/songs/:id/audio", get(get_audio))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
        ))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn start_app(app: AppLocal, listen: &str) -> anyhow::Result<()> {
    let max_upload_bytes = app.config().server.max_upload_bytes;
    let app = router(Arc::new(app), max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("listening on {listen}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

pub fn start_daemon(app: AppLocal, listen: &str) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(app, listen).await })
}

#[derive(Debug)]
struct HttpError(AppError);

impl HttpError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InvalidUpload(_) | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Search(SearchError::EmbeddingUnavailable(_)) => StatusCode::BAD_GATEWAY,
            AppError::Search(SearchError::StoreUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Search(SearchError::MalformedEmbedding { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Embedding(_) | AppError::Analysis(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::IO(_) | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();

        if status.is_server_error() {
            log::error!("{:?}", self.0);
        }

        (
            status,
            Json(json!({"success": false, "error": self.0.to_string()})),
        )
            .into_response()
    }
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, HttpError> {
    match query {
        Ok(Query(params)) => Ok(params),
        Err(rejection) => Err(AppError::InvalidRequest(rejection.body_text()).into()),
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Song as exposed in listings: identity plus the search view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongEntry {
    pub id: Eid,
    #[serde(flatten)]
    pub view: SongView,
    pub language_code: String,
    pub flags: Flags,
    pub created_at: DateTime<Utc>,
}

impl From<&SongRecord> for SongEntry {
    fn from(song: &SongRecord) -> Self {
        SongEntry {
            id: song.id.clone(),
            view: song.into(),
            language_code: song.language_code.clone(),
            flags: song.flags.clone(),
            created_at: song.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub results: Vec<MatchResult>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    query: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, HttpError> {
    let params = query_params(query)?;
    log::debug!("search: {params:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let results = app.search(&params.q)?;
        Ok(Json(SearchResponse {
            success: true,
            results,
        }))
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub song_id: Eid,
    pub details: serde_json::Value,
}

async fn upload(
    State(state): State<Arc<SharedState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, HttpError> {
    let mut song_upload: Option<SongUpload> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                let msg = format!("malformed multipart body: {err}");
                return Err(AppError::InvalidUpload(msg).into());
            }
        };

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|ct| ct.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|err| AppError::InvalidUpload(format!("failed to read file: {err}")))?;

        song_upload = Some(SongUpload {
            filename,
            data: data.to_vec(),
            content_type,
        });
    }

    let song_upload =
        song_upload.ok_or_else(|| AppError::InvalidUpload("no file uploaded".to_string()))?;

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let report = app.upload(song_upload)?;
        Ok(Json(UploadResponse {
            success: true,
            message: "Song processed and stored successfully".to_string(),
            song_id: report.song.id,
            details: report.details,
        }))
    })
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SongsResponse {
    pub success: bool,
    pub total: usize,
    pub songs: Vec<SongEntry>,
}

async fn list_songs(
    State(state): State<Arc<SharedState>>,
    query: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<SongsResponse>, HttpError> {
    let params = query_params(query)?;
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let songs = app.recent(params.limit)?;
        Ok(Json(SongsResponse {
            success: true,
            total: app.total()?,
            songs: songs.iter().map(SongEntry::from).collect(),
        }))
    })
}

#[derive(Debug, Serialize)]
pub struct SongResponse {
    pub success: bool,
    pub song: SongEntry,
}

async fn get_song(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<Eid>,
) -> Result<Json<SongResponse>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let song = app.get(&id)?;
        Ok(Json(SongResponse {
            success: true,
            song: (&song).into(),
        }))
    })
}

async fn get_audio(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<Eid>,
) -> Result<axum::response::Response, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let audio = app.audio(&id)?;
        Ok(([(header::CONTENT_TYPE, audio.mime_type)], audio.data).into_response())
    })
}
