use reqwest::{header::CONTENT_LENGTH, header::CONTENT_TYPE, Body, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::error::{UploadError, UploadStep};
use crate::session::{ReadySession, SelectedFile};

const ACCESS_KEY_HEADER: &str = "AccessKey";

#[derive(Debug, Clone, Deserialize)]
pub struct VideoUploadSlot {
    pub video_id: String,
    pub upload_url: String,
    pub access_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailUploadSlot {
    pub upload_url: String,
    pub cdn_url: String,
    pub access_key: String,
}

#[derive(Debug, Serialize)]
pub struct VideoDetails<'a> {
    pub video_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub thumbnail_url: &'a str,
    pub visibility: &'a str,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FinalizedVideo {
    pub video_id: String,
}

/// Client for the video service routes, authenticated with the caller's session token.
pub struct VideoServiceClient {
    http: reqwest::Client,
    base_url: String,
    session_token: String,
}

impl VideoServiceClient {
    pub fn new(base_url: &str, session_token: &str) -> Self {
        VideoServiceClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token: session_token.to_string(),
        }
    }

    async fn call<T, B>(&self, step: UploadStep, path: &str, body: Option<&B>) -> Result<T, UploadError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self.http
            .request(Method::POST, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.session_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| UploadError::Transport { step, source })?;
        let response = check_status(step, response).await?;

        response
            .json::<T>()
            .await
            .map_err(|source| UploadError::Transport { step, source })
    }

    pub async fn request_video_upload_slot(&self) -> Result<VideoUploadSlot, UploadError> {
        self.call::<_, ()>(UploadStep::VideoSlot, "/videos/upload-url", None).await
    }

    pub async fn request_thumbnail_upload_slot(&self, video_id: &str) -> Result<ThumbnailUploadSlot, UploadError> {
        let path = format!("/videos/{}/thumbnail-upload-url", video_id);
        self.call::<_, ()>(UploadStep::ThumbnailSlot, &path, None).await
    }

    pub async fn finalize(&self, details: &VideoDetails<'_>) -> Result<FinalizedVideo, UploadError> {
        self.call(UploadStep::Finalize, "/videos", Some(details)).await
    }

    /// Streams a file straight to the CDN upload URL.
    pub async fn put_file(
        &self,
        step: UploadStep,
        upload_url: &str,
        access_key: &str,
        file: &SelectedFile,
    ) -> Result<(), UploadError> {
        let handle = tokio::fs::File::open(&file.path).await.map_err(|source| UploadError::Io {
            path: file.path.display().to_string(),
            source,
        })?;

        tracing::info!("Uploading {} ({} bytes)", file.path.display(), file.size);
        let response = self.http
            .put(upload_url)
            .header(ACCESS_KEY_HEADER, access_key)
            .header(CONTENT_TYPE, file.content_type)
            .header(CONTENT_LENGTH, file.size)
            .body(Body::wrap_stream(ReaderStream::new(handle)))
            .send()
            .await
            .map_err(|source| UploadError::Transport { step, source })?;

        check_status(step, response).await?;
        Ok(())
    }
}

async fn check_status(step: UploadStep, response: reqwest::Response) -> Result<reqwest::Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(UploadError::Rejected { step, status: status.as_u16(), body })
}

/// Runs the five upload steps in order, stopping at the first failure. Nothing is retried or cleaned up.
pub async fn run_upload(client: &VideoServiceClient, session: &ReadySession<'_>) -> Result<FinalizedVideo, UploadError> {
    let video_slot = client.request_video_upload_slot().await?;
    tracing::info!("Got upload slot for video {}", video_slot.video_id);

    client
        .put_file(UploadStep::VideoBytes, &video_slot.upload_url, &video_slot.access_key, session.video)
        .await?;

    let thumbnail_slot = client.request_thumbnail_upload_slot(&video_slot.video_id).await?;
    client
        .put_file(UploadStep::ThumbnailBytes, &thumbnail_slot.upload_url, &thumbnail_slot.access_key, session.thumbnail)
        .await?;

    client
        .finalize(&VideoDetails {
            video_id: &video_slot.video_id,
            title: session.title,
            description: session.description,
            thumbnail_url: &thumbnail_slot.cdn_url,
            visibility: session.visibility,
            duration: session.duration,
        })
        .await
}
