//! Video upload payloads and client-side pre-validation.

use std::path::{Path, PathBuf};

use reqwest::multipart::Part;
use reqwest::Body;
use tokio_util::io::ReaderStream;

use crate::error::{ClientError, ClientResult};

/// Default upload ceiling: 100 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

const VIDEO_MEDIA_PREFIX: &str = "video/";

/// Infer a video media type from a file extension.
pub fn media_type_for(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "mp4" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "avi" => Some("video/x-msvideo"),
        _ => None,
    }
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[derive(Debug, Clone)]
enum UploadSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// A video payload ready for upload.
///
/// Size and media type are known up front so that the upload can be
/// validated before any byte is read or sent.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    source: UploadSource,
    filename: String,
    content_type: Option<String>,
    size: u64,
}

impl VideoUpload {
    /// Upload from memory. With no explicit media type it is inferred from
    /// the filename extension.
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = media_type_for(&filename).map(str::to_string);
        Self {
            size: data.len() as u64,
            source: UploadSource::Bytes(data),
            filename,
            content_type,
        }
    }

    /// Upload from a file. Only the metadata is read here.
    pub async fn from_path(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ClientError::rejected(format!("cannot read {}: {}", path.display(), e)))?;
        if !metadata.is_file() {
            return Err(ClientError::rejected(format!("{} is not a file", path.display())));
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| ClientError::rejected(format!("invalid file name: {}", path.display())))?;
        let content_type = media_type_for(&filename).map(str::to_string);

        Ok(Self {
            source: UploadSource::File(path.to_path_buf()),
            filename,
            content_type,
            size: metadata.len(),
        })
    }

    /// Override the declared media type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Build the multipart `file` part. Files are streamed, not buffered.
    pub(crate) async fn into_part(self) -> ClientResult<Part> {
        let mime = self
            .content_type
            .clone()
            .ok_or_else(|| ClientError::rejected("missing media type"))?;

        let part = match self.source {
            UploadSource::Bytes(data) => Part::bytes(data),
            UploadSource::File(path) => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    ClientError::rejected(format!("cannot open {}: {}", path.display(), e))
                })?;
                Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), self.size)
            }
        };

        part.file_name(self.filename)
            .mime_str(&mime)
            .map_err(|e| ClientError::rejected(format!("invalid media type {}: {}", mime, e)))
    }
}

/// Client-side upload checks, run before any network I/O.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Maximum payload size in bytes
    pub max_bytes: u64,
    /// Required media type prefix
    pub media_prefix: String,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            media_prefix: VIDEO_MEDIA_PREFIX.to_string(),
        }
    }
}

impl UploadLimits {
    /// Create limits from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_bytes: std::env::var("JOBSYNC_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            ..Self::default()
        }
    }

    pub fn validate(&self, upload: &VideoUpload) -> ClientResult<()> {
        match upload.content_type() {
            Some(ct) if ct.to_ascii_lowercase().starts_with(&self.media_prefix) => {}
            Some(ct) => {
                return Err(ClientError::rejected(format!(
                    "{}: media type {} is not a video",
                    upload.filename(),
                    ct
                )))
            }
            None => {
                return Err(ClientError::rejected(format!(
                    "{}: unsupported file type",
                    upload.filename()
                )))
            }
        }

        if upload.size() > self.max_bytes {
            return Err(ClientError::rejected(format!(
                "{} is {}, exceeding the {} upload limit",
                upload.filename(),
                format_bytes(upload.size()),
                format_bytes(self.max_bytes)
            )));
        }

        Ok(())
    }
}
