//! File manager routes over `uploads/`, `uploads/exports/` and `company_info/`.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, info, warn};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::ServerError;
use crate::schemas::files::{
    DeleteResponse, FileListResponse, ListQuery, TranscribeForm, TranscribeResponse, UploadForm, UploadResponse,
};
use crate::services::files::{
    DirStats, FileDir, FileInfo, FileManager, FileStats, TextFile, extension_of, validate_upload_name,
};
use crate::services::transcribe::{AUDIO_EXTENSIONS, is_audio_extension};
use crate::state::AppState;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(list_files, upload_file, view_file, download_file, delete_file, file_stats, transcribe),
    components(schemas(
        FileDir,
        FileInfo,
        FileListResponse,
        UploadForm,
        UploadResponse,
        TextFile,
        DeleteResponse,
        DirStats,
        FileStats,
        TranscribeForm,
        TranscribeResponse
    ))
)]
pub struct FilesApi;

/// Register file routes. Request bodies may be as large as one upload.
pub fn router(max_upload_bytes: u64) -> Router<Arc<AppState>> {
    let body_limit = usize::try_from(max_upload_bytes.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX);
    Router::new()
        .route("/files/list", get(list_files))
        .route("/files/upload", post(upload_file))
        .route("/files/view/{dir}/{file}", get(view_file))
        .route("/files/download/{dir}/{file}", get(download_file))
        .route("/files/delete/{dir}/{file}", delete(delete_file))
        .route("/files/stats", get(file_stats))
        .route("/files/transcribe", post(transcribe))
        .layer(DefaultBodyLimit::max(body_limit))
}

fn parse_dir(raw: &str) -> Result<FileDir, ServerError> {
    FileDir::from_str(raw).map_err(|_| ServerError::BadRequest(format!("Unknown directory '{raw}'")))
}

/// Read a multipart field into memory, failing as soon as it outgrows the upload limit.
async fn read_limited(mut field: Field<'_>, files: &FileManager) -> Result<Vec<u8>, ServerError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        bytes.extend_from_slice(&chunk);
        files.check_size(bytes.len() as u64)?;
    }
    Ok(bytes)
}

#[utoipa::path(
    get,
    path = "/files/list",
    tag = "files",
    security(("bearer" = [])),
    params(ListQuery),
    responses(
        (status = 200, description = "Files of one or all directories", body = FileListResponse),
    )
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<FileListResponse>, ServerError> {
    let files = state.files.list(query.directory).await?;
    Ok(Json(FileListResponse { files }))
}

/// Upload a document into `uploads` (default) or `company_info`.
///
/// The extension is checked before any byte is written; files over the
/// upload limit are rejected with 413.
#[utoipa::path(
    post,
    path = "/files/upload",
    tag = "files",
    security(("bearer" = [])),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing file or extension not allowed"),
        (status = 413, description = "File too large"),
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let mut directory = FileDir::Uploads;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "directory" => {
                let raw = field.text().await?;
                if !raw.trim().is_empty() {
                    directory = parse_dir(raw.trim())?;
                }
            }
            "file" => {
                let raw_name = field.file_name().unwrap_or_default().to_owned();
                // Reject before reading the body.
                validate_upload_name(&raw_name)?;
                let bytes = read_limited(field, &state.files).await?;
                upload = Some((raw_name, bytes));
            }
            other => debug!(field = %other, "ignoring multipart field"),
        }
    }

    let Some((raw_name, bytes)) = upload else {
        return Err(ServerError::BadRequest("No file provided".into()));
    };
    let info = state.files.save_upload(directory, &raw_name, &bytes).await?;
    if directory == FileDir::CompanyInfo {
        state.context.invalidate();
    }

    Ok(Json(UploadResponse {
        success: true,
        path: format!("{}/{}", directory, info.name),
        message: format!("File '{}' uploaded to {}", info.name, directory),
        filename: info.name,
        size: info.size,
        directory,
    }))
}

/// Preview a text file (up to 1 MiB).
#[utoipa::path(
    get,
    path = "/files/view/{dir}/{file}",
    tag = "files",
    security(("bearer" = [])),
    params(
        ("dir" = FileDir, Path, description = "uploads, company_info or exports"),
        ("file" = String, Path, description = "File name"),
    ),
    responses(
        (status = 200, description = "File content", body = TextFile),
        (status = 404, description = "File not found"),
        (status = 415, description = "Not a previewable text file"),
    )
)]
pub async fn view_file(
    State(state): State<Arc<AppState>>,
    Path((dir, file)): Path<(String, String)>,
) -> Result<Json<TextFile>, ServerError> {
    let dir = parse_dir(&dir)?;
    Ok(Json(state.files.read_text(dir, &file).await?))
}

#[utoipa::path(
    get,
    path = "/files/download/{dir}/{file}",
    tag = "files",
    security(("bearer" = [])),
    params(
        ("dir" = FileDir, Path, description = "uploads, company_info or exports"),
        ("file" = String, Path, description = "File name"),
    ),
    responses(
        (status = 200, description = "File bytes", content_type = "application/octet-stream"),
        (status = 404, description = "File not found"),
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path((dir, file)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ServerError> {
    let dir = parse_dir(&dir)?;
    let path = state.files.resolve(dir, &file)?;
    let ascii_name: String = file
        .chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"') || c == ' ' { c } else { '_' })
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{ascii_name}\""))
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let mut response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    response.headers_mut().insert(header::CONTENT_DISPOSITION, disposition);
    debug!(directory = %dir, file = %file, status = %response.status(), "file download");
    Ok(response.map(Body::new))
}

#[utoipa::path(
    delete,
    path = "/files/delete/{dir}/{file}",
    tag = "files",
    security(("bearer" = [])),
    params(
        ("dir" = FileDir, Path, description = "uploads, company_info or exports"),
        ("file" = String, Path, description = "File name"),
    ),
    responses(
        (status = 200, description = "File deleted", body = DeleteResponse),
        (status = 404, description = "File not found"),
    )
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path((dir, file)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>, ServerError> {
    let dir = parse_dir(&dir)?;
    state.files.delete(dir, &file).await?;
    if dir == FileDir::CompanyInfo {
        state.context.invalidate();
    }
    Ok(Json(DeleteResponse { success: true, message: format!("File '{file}' deleted from {dir}") }))
}

#[utoipa::path(
    get,
    path = "/files/stats",
    tag = "files",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "File counts and sizes per directory", body = FileStats),
    )
)]
pub async fn file_stats(State(state): State<Arc<AppState>>) -> Result<Json<FileStats>, ServerError> {
    Ok(Json(state.files.stats().await?))
}

/// Transcribe an audio recording through the configured Whisper service.
///
/// The upload is parked under `uploads/temp` for the duration of the call.
#[utoipa::path(
    post,
    path = "/files/transcribe",
    tag = "files",
    security(("bearer" = [])),
    request_body(content = TranscribeForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Recognized text", body = TranscribeResponse),
        (status = 400, description = "Missing file or not an audio file"),
        (status = 413, description = "File too large"),
        (status = 503, description = "Transcription service not configured or unreachable"),
    )
)]
pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ServerError> {
    if !state.whisper.is_configured() {
        return Err(ServerError::ServiceUnavailable(
            "Transcription service is not configured (set WHISPER_URL)".into(),
        ));
    }

    let mut language: Option<String> = None;
    let mut audio: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "language" => language = Some(field.text().await?),
            "file" => {
                let file_name = field.file_name().unwrap_or("recording.webm").to_owned();
                let ext = extension_of(&file_name);
                if !is_audio_extension(&ext) {
                    return Err(ServerError::BadRequest(format!(
                        "Unsupported audio format '{ext}'. Allowed: {}",
                        AUDIO_EXTENSIONS.join(", ")
                    )));
                }
                let bytes = read_limited(field, &state.files).await?;
                audio = Some((file_name, bytes));
            }
            other => debug!(field = %other, "ignoring multipart field"),
        }
    }
    let Some((name, bytes)) = audio else {
        return Err(ServerError::BadRequest("No audio file provided".into()));
    };
    if bytes.is_empty() {
        return Err(ServerError::BadRequest("Audio file is empty".into()));
    }

    let temp_dir = state.files.temp_dir();
    tokio::fs::create_dir_all(&temp_dir).await?;
    let temp_path = temp_dir.join(format!("{}{}", Uuid::new_v4(), extension_of(&name)));
    tokio::fs::write(&temp_path, &bytes).await?;

    let result = state.whisper.transcribe_file(&temp_path, &name, language.as_deref()).await;
    if let Err(e) = tokio::fs::remove_file(&temp_path).await {
        warn!(path = %temp_path.display(), error = %e, "failed to remove temporary audio file");
    }
    let text = result?;
    info!(size = bytes.len(), chars = text.chars().count(), "audio transcribed");
    Ok(Json(TranscribeResponse { success: true, text }))
}
