use std::convert::Infallible;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::Local;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::stream::follow_log;
use crate::errors::RunError;
use crate::run::{RunRequest, Supervisor};
use crate::util::is_truthy;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub supervisor: Supervisor,
    pub poll_interval: Duration,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RunPayload {
    pub input_mode: Option<String>,
    pub json_path: Option<String>,
    pub target_tone: Option<String>,
    pub email_enabled: Option<Value>,
    pub email_to: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RunError::SourceNotFound(_)
            | RunError::MissingParameter(_)
            | RunError::InvalidInputMode(_) => ApiError::BadRequest(err.to_string()),
            RunError::SpawnFailed(_) | RunError::Other(_) => ApiError::Internal(format!("{:#}", err)),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/run", post(run_local))
        .route("/run-upload", post(run_upload))
        .route("/runs", get(list_runs))
        .route("/stream/{run_id}", get(stream_run))
        .route("/status/{run_id}", get(run_status))
        .route("/download/{run_id}", get(download_archive))
        .route("/download-last/{run_id}", get(download_last))
        .route("/stop/{run_id}", post(stop_run))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// `email_enabled` arrives as a JSON bool, number or truthy string.
fn flag_enabled(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => is_truthy(s),
        _ => false,
    }
}

fn recipient(enabled: bool, to: Option<&str>) -> Option<String> {
    let to = to.map(str::trim).unwrap_or("");
    (enabled && !to.is_empty()).then(|| to.to_string())
}

/// Reduce an uploaded file name to a bare file name.
fn upload_file_name(raw: Option<&str>) -> String {
    raw.and_then(|name| FsPath::new(name).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty() && name != "..")
        .unwrap_or_else(|| "upload.json".to_string())
}

/// A fresh directory name for one uploaded source. Concurrent uploads of the
/// same file name must not share a directory.
fn upload_dir_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "uploaded_{}_{}",
        Local::now().format("%Y%m%d_%H%M%S_%6f"),
        &suffix[..6]
    )
}

async fn send_file(path: Option<PathBuf>, missing: &str) -> Result<Response, ApiError> {
    let path = path
        .filter(|p| p.is_file())
        .ok_or_else(|| ApiError::NotFound(missing.to_string()))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok((
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", name.replace('"', "")),
            ),
        ],
        bytes,
    )
        .into_response())
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn run_local(
    State(state): State<SharedState>,
    Json(req): Json<RunPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(mode) = req.input_mode.as_deref()
        && !mode.trim().eq_ignore_ascii_case("local")
    {
        return Err(RunError::InvalidInputMode(mode.to_string()).into());
    }
    let json_path = req.json_path.unwrap_or_default();
    if json_path.trim().is_empty() {
        return Err(RunError::MissingParameter("json_path").into());
    }

    let run_id = state.supervisor.start(RunRequest {
        source: PathBuf::from(json_path.trim()),
        tone: req.target_tone.unwrap_or_default(),
        notify_to: recipient(
            flag_enabled(req.email_enabled.as_ref()),
            req.email_to.as_deref(),
        ),
    })?;
    Ok(Json(serde_json::json!({"run_id": run_id})))
}

async fn run_upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut tone = String::new();
    let mut email_enabled = String::new();
    let mut email_to = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file_json" => {
                let file_name = upload_file_name(field.file_name());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                upload = Some((file_name, bytes.to_vec()));
            }
            "target_tone" | "email_enabled" | "email_to" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                match name.as_str() {
                    "target_tone" => tone = text,
                    "email_enabled" => email_enabled = text,
                    _ => email_to = text,
                }
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing required parameter: file_json".into()))?;
    if tone.trim().is_empty() {
        return Err(RunError::MissingParameter("target_tone").into());
    }

    let dir = state.supervisor.outputs_dir().join(upload_dir_name());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to create {}: {}", dir.display(), e)))?;
    let dest = dir.join(file_name);
    tokio::fs::write(&dest, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save upload: {}", e)))?;
    tracing::info!(path = %dest.display(), size = bytes.len(), "stored uploaded source");

    let run_id = state.supervisor.start(RunRequest {
        source: dest,
        tone,
        notify_to: recipient(is_truthy(&email_enabled), Some(&email_to)),
    })?;
    Ok(Json(serde_json::json!({"run_id": run_id})))
}

async fn list_runs(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.supervisor.registry().list())
}

async fn stream_run(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let lines = follow_log(
        state.supervisor.registry().clone(),
        &run_id,
        state.poll_interval,
    )?;
    let events = lines.map(|chunk| Ok(Event::default().data(chunk.replace('\r', ""))));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn run_status(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.supervisor.registry().snapshot(&run_id)?;
    Ok(Json(snapshot))
}

async fn download_archive(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<Response, ApiError> {
    let path = state
        .supervisor
        .registry()
        .archive_path(&run_id)
        .unwrap_or(None);
    send_file(path, "No archive for this run").await
}

async fn download_last(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<Response, ApiError> {
    let path = state
        .supervisor
        .registry()
        .last_file_path(&run_id)
        .unwrap_or(None);
    send_file(path, "No output file for this run").await
}

async fn stop_run(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.supervisor.registry().request_stop(&run_id)?;
    tracing::info!(run_id = %run_id, "stop requested");
    Ok(Json(serde_json::json!({"ok": true})))
}
