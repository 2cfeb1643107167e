use garde::Validate;
use std::path::Path;

use super::context::ContextId;

/// A file held in memory for multipart upload.
#[derive(Debug, Clone, Validate)]
pub struct UploadFile {
    #[garde(length(min = 1, max = 255))]
    pub file_name: String,

    #[garde(skip)]
    pub content_type: String,

    #[garde(skip)]
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name).to_string();
        Self {
            file_name,
            content_type,
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping its base name for the upload.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::InvalidName(path.display().to_string()))?;

        let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Self::new(file_name, bytes))
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// The two accepted shapes of the unstructured-document input.
#[derive(Debug, Clone, Validate)]
pub enum DocumentSource {
    /// Documents uploaded as multipart file parts.
    Files(#[garde(length(min = 1), dive)] Vec<UploadFile>),
    /// A folder already present on the backend host.
    FolderPath(#[garde(custom(not_blank))] String),
}

impl DocumentSource {
    pub fn is_empty(&self) -> bool {
        match self {
            DocumentSource::Files(files) => files.is_empty(),
            DocumentSource::FolderPath(path) => path.trim().is_empty(),
        }
    }

    /// Number of uploaded documents; unknown for a folder reference.
    pub fn document_count(&self) -> Option<usize> {
        match self {
            DocumentSource::Files(files) => Some(files.len()),
            DocumentSource::FolderPath(_) => None,
        }
    }
}

fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("folder path must not be blank"));
    }
    Ok(())
}

/// Everything the submit endpoint needs, validated before any network call.
#[derive(Debug, Clone, Validate)]
pub struct Submission {
    #[garde(required, dive)]
    pub structured_source: Option<UploadFile>,

    #[garde(required, dive)]
    pub documents: Option<DocumentSource>,

    #[garde(skip)]
    pub context_id: Option<ContextId>,
}

/// Bearer credential for the backend API. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Returns `None` for an empty or whitespace-only token.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path has no usable file name: {0}")]
    InvalidName(String),
}
