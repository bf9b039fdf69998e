use std::path::{Path, PathBuf};

use crate::error::UploadError;

pub const MAX_VIDEO_SIZE: u64 = 500 * 1024 * 1024;
pub const MAX_THUMBNAIL_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Video,
    Thumbnail,
}

impl FileKind {
    fn label(&self) -> &'static str {
        match self {
            FileKind::Video => "video",
            FileKind::Thumbnail => "thumbnail",
        }
    }

    pub fn max_size(&self) -> u64 {
        match self {
            FileKind::Video => MAX_VIDEO_SIZE,
            FileKind::Thumbnail => MAX_THUMBNAIL_SIZE,
        }
    }

    /// Content type for a file extension, if files of that type are accepted.
    pub fn content_type(&self, extension: &str) -> Option<&'static str> {
        let extension = extension.to_ascii_lowercase();
        match (self, extension.as_str()) {
            (FileKind::Video, "mp4") => Some("video/mp4"),
            (FileKind::Video, "webm") => Some("video/webm"),
            (FileKind::Video, "mov") => Some("video/quicktime"),
            (FileKind::Video, "mkv") => Some("video/x-matroska"),
            (FileKind::Thumbnail, "png") => Some("image/png"),
            (FileKind::Thumbnail, "jpg" | "jpeg") => Some("image/jpeg"),
            (FileKind::Thumbnail, "webp") => Some("image/webp"),
            _ => None,
        }
    }
}

/// A file picked for upload, checked against the size limit and accepted types.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub size: u64,
    pub content_type: &'static str,
}

impl SelectedFile {
    pub fn new(kind: FileKind, path: impl Into<PathBuf>, size: u64) -> Result<Self, UploadError> {
        let path = path.into();
        let display = path.display().to_string();

        let content_type = path
            .extension()
            .and_then(|extension| extension.to_str())
            .and_then(|extension| kind.content_type(extension))
            .ok_or_else(|| UploadError::UnsupportedType { kind: kind.label(), path: display.clone() })?;

        if size > kind.max_size() {
            return Err(UploadError::TooLarge {
                kind: kind.label(),
                path: display,
                size,
                limit: kind.max_size(),
            });
        }

        Ok(SelectedFile { path, size, content_type })
    }

    pub async fn open(kind: FileKind, path: &Path) -> Result<Self, UploadError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|source| UploadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::new(kind, path, metadata.len())
    }
}

/// Everything gathered for one upload before the first request is made.
#[derive(Debug, Default)]
pub struct UploadSession {
    pub title: String,
    pub description: String,
    pub(crate) visibility: Option<String>,
    pub(crate) video: Option<SelectedFile>,
    pub(crate) thumbnail: Option<SelectedFile>,
    pub(crate) duration: Option<f64>,
}

/// A session that passed validation.
#[derive(Debug)]
pub struct ReadySession<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub visibility: &'a str,
    pub video: &'a SelectedFile,
    pub thumbnail: &'a SelectedFile,
    pub duration: Option<f64>,
}

impl UploadSession {
    pub fn select_video(&mut self, file: SelectedFile) {
        self.video = Some(file);
    }

    pub fn select_thumbnail(&mut self, file: SelectedFile) {
        self.thumbnail = Some(file);
    }

    pub fn set_visibility(&mut self, visibility: &str) -> Result<(), UploadError> {
        let visibility = visibility.trim().to_ascii_lowercase();
        match visibility.as_str() {
            "" => self.visibility = None,
            "public" | "private" => self.visibility = Some(visibility),
            _ => return Err(UploadError::Visibility(visibility)),
        }
        Ok(())
    }

    /// Keeps the latest measurement; a probe that found nothing leaves the previous value alone.
    pub fn record_duration(&mut self, duration: Option<f64>) {
        if let Some(duration) = duration {
            self.duration = Some(duration);
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn validate(&self) -> Result<ReadySession<'_>, UploadError> {
        let (Some(video), Some(thumbnail)) = (&self.video, &self.thumbnail) else {
            return Err(UploadError::MissingFiles);
        };

        let title = self.title.trim();
        let description = self.description.trim();
        if title.is_empty() || description.is_empty() {
            return Err(UploadError::MissingDetails);
        }

        Ok(ReadySession {
            title,
            description,
            visibility: self.visibility.as_deref().unwrap_or("public"),
            video,
            thumbnail,
            duration: self.duration,
        })
    }
}
