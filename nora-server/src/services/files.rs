//! File manager over `uploads/`, `uploads/exports/` and `company_info/`.
//!
//! All names coming from clients go through [`FileManager::resolve`] or
//! [`validate_upload_name`]; nothing outside the three managed directories
//! is ever read or written.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use tokio::fs;
use tracing::info;
use utoipa::ToSchema;

use crate::error::ServerError;

/// Extensions accepted by `/files/upload`.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".json", ".csv", ".xml", ".yaml", ".yml", ".doc", ".docx", ".pdf", ".rtf", ".xls",
    ".xlsx", ".html", ".htm", ".py", ".js", ".ts", ".java", ".cpp", ".c", ".h", ".css",
];

/// Extensions read as plain text (preview and company context).
pub const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".json", ".csv", ".xml", ".yaml", ".yml", ".html", ".htm", ".log", ".py", ".js",
    ".ts", ".java", ".cpp", ".c", ".h", ".css",
];

/// Largest file `/files/view` will return inline.
pub const MAX_VIEW_BYTES: u64 = 1024 * 1024;

pub const EXPORTS_SUBDIR: &str = "exports";
pub const TEMP_SUBDIR: &str = "temp";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileDir {
    Uploads,
    CompanyInfo,
    Exports,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileInfo {
    pub name: String,
    pub directory: FileDir,
    pub size: u64,
    pub extension: String,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DirStats {
    pub directory: FileDir,
    pub count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileStats {
    pub directories: Vec<DirStats>,
    pub total_files: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TextFile {
    pub filename: String,
    pub directory: FileDir,
    pub size: u64,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct FileManager {
    uploads: PathBuf,
    company_info: PathBuf,
    max_upload_bytes: u64,
}

impl FileManager {
    pub fn new(uploads: impl Into<PathBuf>, company_info: impl Into<PathBuf>, max_upload_bytes: u64) -> Self {
        Self { uploads: uploads.into(), company_info: company_info.into(), max_upload_bytes }
    }

    pub fn dir_path(&self, dir: FileDir) -> PathBuf {
        match dir {
            FileDir::Uploads => self.uploads.clone(),
            FileDir::CompanyInfo => self.company_info.clone(),
            FileDir::Exports => self.uploads.join(EXPORTS_SUBDIR),
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.uploads.join(TEMP_SUBDIR)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Create every managed directory.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in FileDir::iter() {
            fs::create_dir_all(self.dir_path(dir)).await?;
        }
        fs::create_dir_all(self.temp_dir()).await
    }

    /// Map a client-supplied name onto an existing file in `dir`.
    pub fn resolve(&self, dir: FileDir, name: &str) -> Result<PathBuf, ServerError> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || is_hidden(name)
        {
            return Err(ServerError::BadRequest(format!("Invalid file name '{name}'")));
        }
        let path = self.dir_path(dir).join(name);
        if !path.is_file() {
            return Err(ServerError::NotFound(format!("File '{name}' not found in {dir}")));
        }
        Ok(path)
    }

    /// Regular, non-hidden files directly inside `dir`, sorted by name.
    pub async fn list_dir(&self, dir: FileDir) -> Result<Vec<FileInfo>, ServerError> {
        let mut files = Vec::new();
        let mut entries = match fs::read_dir(self.dir_path(dir)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            files.push(FileInfo {
                extension: extension_of(&name),
                name,
                directory: dir,
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// One directory, or all of them when `dir` is `None`.
    pub async fn list(&self, dir: Option<FileDir>) -> Result<Vec<FileInfo>, ServerError> {
        let mut all = Vec::new();
        for d in FileDir::iter().filter(|d| dir.is_none_or(|want| want == *d)) {
            all.extend(self.list_dir(d).await?);
        }
        Ok(all)
    }

    pub async fn stats(&self) -> Result<FileStats, ServerError> {
        let mut directories = Vec::new();
        for dir in FileDir::iter() {
            let files = self.list_dir(dir).await?;
            directories.push(DirStats {
                directory: dir,
                count: files.len(),
                total_bytes: files.iter().map(|f| f.size).sum(),
            });
        }
        Ok(FileStats {
            total_files: directories.iter().map(|d| d.count).sum(),
            total_bytes: directories.iter().map(|d| d.total_bytes).sum(),
            directories,
        })
    }

    /// Write an uploaded file. Name and size are checked before anything
    /// touches the disk.
    pub async fn save_upload(&self, dir: FileDir, raw_name: &str, bytes: &[u8]) -> Result<FileInfo, ServerError> {
        if dir == FileDir::Exports {
            return Err(ServerError::BadRequest("Uploads are not allowed into exports".into()));
        }
        let name = validate_upload_name(raw_name)?;
        self.check_size(bytes.len() as u64)?;

        let target_dir = self.dir_path(dir);
        fs::create_dir_all(&target_dir).await?;
        let path = target_dir.join(&name);
        fs::write(&path, bytes).await?;
        info!(directory = %dir, file = %name, size = bytes.len(), "file uploaded");
        Ok(FileInfo {
            extension: extension_of(&name),
            name,
            directory: dir,
            size: bytes.len() as u64,
            modified: Some(Utc::now()),
        })
    }

    pub fn check_size(&self, size: u64) -> Result<(), ServerError> {
        if size > self.max_upload_bytes {
            return Err(ServerError::PayloadTooLarge(format!(
                "File exceeds the {} MB upload limit",
                self.max_upload_bytes / (1024 * 1024)
            )));
        }
        Ok(())
    }

    pub async fn read_text(&self, dir: FileDir, name: &str) -> Result<TextFile, ServerError> {
        let path = self.resolve(dir, name)?;
        if !is_text_extension(&extension_of(name)) {
            return Err(ServerError::UnsupportedMediaType(format!("'{name}' cannot be previewed as text")));
        }
        let size = fs::metadata(&path).await?.len();
        if size > MAX_VIEW_BYTES {
            return Err(ServerError::UnsupportedMediaType(format!("'{name}' is too large to preview")));
        }
        let bytes = fs::read(&path).await?;
        Ok(TextFile {
            filename: name.to_owned(),
            directory: dir,
            size,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    pub async fn delete(&self, dir: FileDir, name: &str) -> Result<(), ServerError> {
        let path = self.resolve(dir, name)?;
        fs::remove_file(&path).await?;
        info!(directory = %dir, file = %name, "file deleted");
        Ok(())
    }
}

/// Keep only the last path component and replace anything unusual.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim();
    cleaned.chars().take(255).collect()
}

/// Sanitized name of an acceptable upload, or 400.
pub fn validate_upload_name(raw: &str) -> Result<String, ServerError> {
    let name = sanitize_filename(raw);
    if name.is_empty() {
        return Err(ServerError::BadRequest("Missing file name".into()));
    }
    let ext = extension_of(&name);
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        let shown = if ext.is_empty() { "(none)" } else { ext.as_str() };
        return Err(ServerError::BadRequest(format!(
            "File type {shown} not allowed. Allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    Ok(name)
}

/// Lower-cased extension including the dot, or `""`.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn is_text_extension(ext: &str) -> bool {
    TEXT_EXTENSIONS.contains(&ext)
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
