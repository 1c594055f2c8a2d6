use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::services::files::{FileDir, FileInfo};

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListQuery {
    /// Restrict the listing to one directory.
    pub directory: Option<FileDir>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileListResponse {
    pub files: Vec<FileInfo>,
}

/// Multipart body of `POST /files/upload`.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// `uploads` (default) or `company_info`.
    pub directory: Option<FileDir>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub directory: FileDir,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Multipart body of `POST /files/transcribe`.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct TranscribeForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TranscribeResponse {
    pub success: bool,
    pub text: String,
}
