// Axum request handlers over the job runner and artifact handoff.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::engine::DownloadKind;
use crate::error::{ErrorCode, JobError};
use crate::job::{Artifact, ArtifactHandoff, FetchOutcome, JobRunner};
use crate::system::{check_cookies_file, check_ffmpeg, system_status, SystemStatus};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<JobRunner>,
    pub handoff: Arc<ArtifactHandoff>,
    pub config: Arc<ServerConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/download", post(download_handler))
        .route("/api/search", post(search_handler))
        .route("/api/status/{download_id}", get(status_handler))
        .route("/api/download-file/{download_id}", get(download_file_handler))
        .route("/api/check-ffmpeg", get(check_ffmpeg_handler))
        .route("/api/check-cookies", get(check_cookies_handler))
        .route("/api/system-status", get(system_status_handler))
        .with_state(state)
}

pub struct FetchServer {
    addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FetchServer {
    /// Bind `addr` and serve in a background task. Port 0 picks a free port.
    pub async fn start(state: AppState, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = router(state);

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("http server error: {}", e);
            }
        });

        info!("listening on http://{}", addr);
        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL for a path on this server, e.g. `url("/api/status/x")`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop accepting connections and wait for in-flight responses to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<ErrorCode>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: Option<ErrorCode>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: Some(code),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            code: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: None,
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::WorkDir(_) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
                code: Some(err.code()),
            },
            _ => Self::bad_request(err.to_string(), err.code()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text(), ErrorCode::InvalidRequest)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            code: self.code,
        });
        (self.status, body).into_response()
    }
}

/// Clients send quality either as `"192"` or `192`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DownloadBody {
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub quality: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    pub query: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub quality: Option<String>,
}

fn parse_kind(value: Option<&str>, default: DownloadKind) -> Result<DownloadKind, ApiError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => DownloadKind::parse(v).ok_or_else(|| {
            ApiError::bad_request(
                format!("Unknown download type '{}': expected video, audio or best", v),
                ErrorCode::InvalidRequest,
            )
        }),
    }
}

/// POST /api/download: start a direct download from a platform URL.
async fn download_handler(
    State(state): State<AppState>,
    body: Result<Json<DownloadBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let kind = parse_kind(body.kind.as_deref(), DownloadKind::Best)?;
    let quality = body.quality.unwrap_or_default();

    let submission = state
        .runner
        .submit_direct_download(&body.url, kind, &quality)
        .await
        .map_err(|e| {
            debug!("download rejected: {}", e);
            ApiError::from(e)
        })?;
    Ok(Json(submission).into_response())
}

/// POST /api/search: search and download the first hit.
async fn search_handler(
    State(state): State<AppState>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let kind = parse_kind(body.kind.as_deref(), DownloadKind::Video)?;
    let quality = body.quality.unwrap_or_default();

    let submission = state
        .runner
        .submit_search_download(&body.query, kind, &quality)
        .await
        .map_err(|e| {
            debug!("search rejected: {}", e);
            ApiError::from(e)
        })?;
    Ok(Json(submission).into_response())
}

/// GET /api/status/{download_id}
async fn status_handler(
    State(state): State<AppState>,
    Path(download_id): Path<String>,
) -> Response {
    match state.runner.store().get(&download_id) {
        Some(record) => Json(record).into_response(),
        None => Json(serde_json::json!({ "status": "not_found" })).into_response(),
    }
}

/// GET /api/download-file/{download_id}: stream the file once, then the job
/// is cleaned up.
async fn download_file_handler(
    State(state): State<AppState>,
    Path(download_id): Path<String>,
) -> Result<Response, ApiError> {
    match state.handoff.fetch(&download_id).await {
        FetchOutcome::Ready(artifact) => artifact_response(artifact),
        FetchOutcome::NotReady => Err(ApiError::not_found("File not ready")),
        FetchOutcome::NotFound => {
            warn!("download-file for {}: nothing to serve", download_id);
            Err(ApiError::not_found("File not found"))
        }
    }
}

fn artifact_response(artifact: Artifact) -> Result<Response, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(artifact.content_type),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&artifact.size.to_string())
            .map_err(|_| ApiError::internal("invalid content length"))?,
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&artifact.filename))
            .map_err(|_| ApiError::internal("invalid download filename"))?,
    );

    let body = Body::from_stream(ReaderStream::new(artifact.file));
    Ok((StatusCode::OK, headers, body).into_response())
}

/// `attachment` with an ASCII fallback name plus the exact name as `filename*`.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FfmpegStatus {
    ffmpeg_available: bool,
}

/// GET /api/check-ffmpeg
async fn check_ffmpeg_handler(State(state): State<AppState>) -> Json<FfmpegStatus> {
    Json(FfmpegStatus {
        ffmpeg_available: check_ffmpeg(&state.config.ffmpeg_bin).await,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CookiesStatus {
    cookies_available: bool,
    cookies_file: String,
    message: &'static str,
}

/// GET /api/check-cookies
async fn check_cookies_handler(State(state): State<AppState>) -> Json<CookiesStatus> {
    let cookies_available = check_cookies_file(&state.config.cookies_file).await;
    Json(CookiesStatus {
        cookies_available,
        cookies_file: state.config.cookies_file.to_string_lossy().to_string(),
        message: if cookies_available {
            "Cookies loaded successfully"
        } else {
            "No cookies file found or empty"
        },
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemStatusBody {
    #[serde(flatten)]
    status: SystemStatus,
    active_jobs: usize,
}

/// GET /api/system-status
async fn system_status_handler(State(state): State<AppState>) -> Json<SystemStatusBody> {
    Json(SystemStatusBody {
        status: system_status(&state.config).await,
        active_jobs: state.runner.in_flight().len(),
    })
}
