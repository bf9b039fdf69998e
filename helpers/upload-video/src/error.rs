use std::fmt;

use thiserror::Error;

/// The five calls of an upload, in the order they are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    VideoSlot,
    VideoBytes,
    ThumbnailSlot,
    ThumbnailBytes,
    Finalize,
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            UploadStep::VideoSlot => "requesting the video upload URL",
            UploadStep::VideoBytes => "uploading the video",
            UploadStep::ThumbnailSlot => "requesting the thumbnail upload URL",
            UploadStep::ThumbnailBytes => "uploading the thumbnail",
            UploadStep::Finalize => "saving the video details",
        };
        f.write_str(step)
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Please upload video and thumbnail")]
    MissingFiles,

    #[error("Title and description are required")]
    MissingDetails,

    #[error("{kind} {path} is {size} bytes, the limit is {limit} bytes")]
    TooLarge {
        kind: &'static str,
        path: String,
        size: u64,
        limit: u64,
    },

    #[error("Unsupported {kind} type: {path}")]
    UnsupportedType { kind: &'static str, path: String },

    #[error("Unknown visibility: {0}")]
    Visibility(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not measure video duration: {0}")]
    Probe(String),

    #[error("Failed {step}: server responded with {status}: {body}")]
    Rejected { step: UploadStep, status: u16, body: String },

    #[error("Failed {step}: {source}")]
    Transport {
        step: UploadStep,
        #[source]
        source: reqwest::Error,
    },
}

impl UploadError {
    /// The step that failed, for errors raised while talking to the network.
    pub fn step(&self) -> Option<UploadStep> {
        match self {
            UploadError::Rejected { step, .. } | UploadError::Transport { step, .. } => Some(*step),
            _ => None,
        }
    }
}
