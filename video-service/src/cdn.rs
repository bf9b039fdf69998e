use async_trait::async_trait;
use reqwest::{header::ACCEPT, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::BunnyConfig;
use crate::error::{AppError, AppResult};

pub const ACCESS_KEY_HEADER: &str = "AccessKey";

/// Bunny exposes the stream library and the storage zone behind different access keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BunnyApi {
    Stream,
    Storage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdnVideo {
    pub guid: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoFields<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collection_id: Option<&'a str>,
}

#[async_trait]
pub trait MediaCdn: Send + Sync {
    /// Creates an empty video resource that bytes can later be PUT into.
    async fn create_video(&self, title: &str) -> AppResult<CdnVideo>;

    async fn update_video(&self, video_id: &str, title: &str, description: &str) -> AppResult<()>;

    /// Returns `false` when the CDN did not know the video.
    async fn delete_video(&self, video_id: &str) -> AppResult<bool>;
}

impl BunnyConfig {
    pub fn videos_url(&self) -> String {
        format!("{}/{}/videos", self.stream_base_url, self.library_id)
    }

    pub fn video_url(&self, video_id: &str) -> String {
        format!("{}/{}", self.videos_url(), video_id)
    }

    pub fn thumbnail_upload_url(&self, file_name: &str) -> String {
        format!("{}/thumbnails/{}", self.storage_base_url, file_name)
    }

    pub fn thumbnail_cdn_url(&self, file_name: &str) -> String {
        format!("{}/thumbnails/{}", self.cdn_url, file_name)
    }

    /// Public player URL stored with the video record.
    pub fn embed_video_url(&self, video_id: &str) -> String {
        format!("{}/{}/{}", self.embed_url, self.library_id, video_id)
    }

    pub fn access_key(&self, api: BunnyApi) -> &str {
        match api {
            BunnyApi::Stream => &self.stream_access_key,
            BunnyApi::Storage => &self.storage_access_key,
        }
    }
}

pub struct BunnyClient {
    http: reqwest::Client,
    config: BunnyConfig,
}

impl BunnyClient {
    pub fn new(config: BunnyConfig) -> Self {
        BunnyClient {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Sends one authenticated request, turning any non-success status into [`AppError::Upstream`].
    async fn send<B>(&self, method: Method, url: &str, api: BunnyApi, body: Option<&B>) -> AppResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self.http
            .request(method.clone(), url)
            .header(ACCESS_KEY_HEADER, self.config.access_key(api))
            .header(ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!("Sending {} {} to Bunny {:?}", method, url, api);
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Bunny responded to {} {} with {}: {}", method, url, status, body);
            return Err(AppError::Upstream { status: status.as_u16(), body });
        }

        Ok(response)
    }

    pub async fn fetch_json<T, B>(&self, method: Method, url: &str, api: BunnyApi, body: Option<&B>) -> AppResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(method, url, api, body).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MediaCdn for BunnyClient {
    async fn create_video(&self, title: &str) -> AppResult<CdnVideo> {
        let fields = VideoFields {
            title,
            description: None,
            collection_id: Some(""),
        };
        self.fetch_json(Method::POST, &self.config.videos_url(), BunnyApi::Stream, Some(&fields)).await
    }

    async fn update_video(&self, video_id: &str, title: &str, description: &str) -> AppResult<()> {
        let fields = VideoFields {
            title,
            description: Some(description),
            collection_id: None,
        };
        self.send(Method::POST, &self.config.video_url(video_id), BunnyApi::Stream, Some(&fields)).await?;
        Ok(())
    }

    async fn delete_video(&self, video_id: &str) -> AppResult<bool> {
        let url = self.config.video_url(video_id);
        match self.send::<()>(Method::DELETE, &url, BunnyApi::Stream, None).await {
            Ok(_) => Ok(true),
            Err(AppError::Upstream { status: 404, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_bunny_config(base: &str) -> BunnyConfig {
    BunnyConfig {
        stream_base_url: format!("{}/library", base),
        storage_base_url: format!("{}/storage", base),
        cdn_url: "https://zone.b-cdn.net".to_string(),
        embed_url: "https://iframe.mediadelivery.net/embed".to_string(),
        library_id: "4242".to_string(),
        stream_access_key: "stream-key".to_string(),
        storage_access_key: "storage-key".to_string(),
    }
}
