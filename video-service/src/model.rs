use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(AppError::validation(format!("Unknown visibility: {other}"))),
        }
    }
}

/// Returned to the uploader so it can PUT the video bytes straight to the stream library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoUploadSlot {
    pub video_id: String,
    pub upload_url: String,
    pub access_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailUploadSlot {
    pub upload_url: String,
    pub cdn_url: String,
    pub access_key: String,
}

/// Details submitted once both uploads finished. Fields are optional so that missing values surface
/// as validation errors instead of body rejections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoDetails {
    #[serde(default)]
    pub video_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub visibility: Option<String>,
    /// Seconds, as measured by the uploader.
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedVideo {
    pub video_id: String,
}
